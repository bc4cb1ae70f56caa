use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::crypto::constant_time_eq;
use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::models::TransactionStatus;
use crate::reconcile::reconcile_transaction;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(default)]
    pub order_id: Option<String>,
    /// Status as pushed by the gateway. Advisory only: reconciliation
    /// re-reads the authoritative detail endpoint rather than trusting
    /// the push payload.
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub transaction_id: String,
    pub status: TransactionStatus,
}

/// Gateway push callback. Converges on the same reconciliation path as
/// merchant-initiated sync, so a push can never produce divergent state.
pub async fn gateway_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    Json(body): Json<CallbackBody>,
) -> Result<Json<CallbackResponse>> {
    if !state.gateway.is_configured() {
        return Err(AppError::Internal(
            "Gateway credentials are not configured".into(),
        ));
    }

    let expected = state.gateway.callback_token();
    if !expected.is_empty()
        && !constant_time_eq(query.token.as_deref().unwrap_or(""), expected)
    {
        return Err(AppError::Unauthorized);
    }

    let order_id = body
        .order_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("order_id is required".into()))?;

    tracing::debug!(
        order_id,
        pushed_status = body.status.as_deref().unwrap_or("-"),
        "Gateway callback received"
    );

    let transaction = {
        let conn = state.db.get()?;
        queries::get_transaction_by_gateway_order_id(&conn, order_id)?
            .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?
    };

    let updated = reconcile_transaction(&state, &transaction.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?;

    Ok(Json(CallbackResponse {
        transaction_id: updated.id,
        status: updated.status,
    }))
}

use axum::{
    extract::{Extension, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::fees;
use crate::gateway;
use crate::idempotency::{self, IdempotencyOutcome};
use crate::middleware::MerchantContext;
use crate::models::{
    CreateTransaction, Transaction, TransactionStatus, SUPPORTED_PAYMENT_METHODS,
};
use crate::pagination::{PageQuery, Paginated};
use crate::rate_limit;
use crate::reconcile::reconcile_transaction;
use crate::util::generate_gateway_order_id;

const RATE_WINDOW_SECS: i64 = 60;
const CREATE_LIMIT: i64 = 60;
const LIST_LIMIT: i64 = 120;
const DETAIL_LIMIT: i64 = 120;
const SYNC_LIMIT: i64 = 60;

fn epoch_to_rfc3339(ts: Option<i64>) -> Option<String> {
    ts.and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.to_rfc3339())
}

/// Serve a stored or just-built JSON body verbatim. Replays must be
/// byte-identical to the original response, so no re-serialization happens
/// on this path.
fn raw_json_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateTransactionRequest {
    pub external_id: String,
    pub method: String,
    pub amount: i64,
    #[serde(default)]
    pub customer_name: Option<String>,
}

impl CreateTransactionRequest {
    fn validate(&self) -> Result<()> {
        if self.external_id.trim().len() < 3 {
            return Err(AppError::BadRequest(
                "external_id must be at least 3 characters".into(),
            ));
        }
        if !SUPPORTED_PAYMENT_METHODS.contains(&self.method.as_str()) {
            return Err(AppError::BadRequest(format!(
                "Unsupported payment method: {}",
                self.method
            )));
        }
        if self.amount <= 0 {
            return Err(AppError::BadRequest("amount must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionCreatedResponse {
    id: String,
    external_id: String,
    gateway_order_id: String,
    method: String,
    status: TransactionStatus,
    amount: i64,
    total_payment: i64,
    payment_number: Option<String>,
    qr_string: Option<String>,
    qr_image_url: Option<String>,
    expired_at: Option<String>,
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Extension(ctx): Extension<MerchantContext>,
    headers: HeaderMap,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<Response> {
    if !state.gateway.is_configured() {
        return Err(AppError::Internal(
            "Gateway credentials are not configured".into(),
        ));
    }

    let record = {
        let conn = state.db.get()?;
        rate_limit::enforce(
            &conn,
            &ctx.project.id,
            "transactions:create",
            CREATE_LIMIT,
            RATE_WINDOW_SECS,
        )?;

        request.validate()?;

        let idem_key = headers
            .get("Idempotency-Key")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest("Idempotency-Key header is required".into())
            })?;

        let request_hash = idempotency::hash_request(&request)?;
        match idempotency::begin(&conn, &ctx.project.id, idem_key, &request_hash)? {
            IdempotencyOutcome::New(record) => record,
            IdempotencyOutcome::Replay { status, body } => {
                let status = StatusCode::from_u16(status)
                    .map_err(|_| AppError::Internal("Stored replay status is invalid".into()))?;
                return Ok(raw_json_response(status, body));
            }
            IdempotencyOutcome::Conflict => {
                return Err(AppError::IdempotencyConflict(
                    "Idempotency key already used with a different payload".into(),
                ));
            }
            IdempotencyOutcome::InFlight => {
                return Err(AppError::IdempotencyInFlight(
                    "Request with this idempotency key is still processing".into(),
                ));
            }
        }
        // Connection returns to the pool before the remote call below.
    };

    let gateway_order_id =
        generate_gateway_order_id(&ctx.project.app_slug, Utc::now().timestamp());
    let callback_url = state.gateway_callback_url();

    // A failure here is terminal for this request: nothing local was
    // persisted, and retrying with the same key is safe once the
    // reservation lease expires. No compensating call is made against the
    // gateway, which may or may not have opened the payment.
    let detail = state
        .gateway
        .create(
            &request.method,
            request.amount,
            &gateway_order_id,
            request.customer_name.as_deref().unwrap_or("Customer"),
            Some(&callback_url),
        )
        .await?;

    let fee = fees::total_fee(&request.method, request.amount);

    let conn = state.db.get()?;
    let transaction = queries::create_transaction(
        &conn,
        &CreateTransaction {
            project_id: ctx.project.id.clone(),
            external_id: request.external_id.clone(),
            gateway_order_id,
            method: request.method.clone(),
            status: detail.status,
            amount: request.amount,
            fee,
            total_payment: request.amount,
            payment_number: detail.payment_number.clone(),
            expired_at: detail.expired_at,
            paid_at: detail.paid_at,
            gateway_status: detail.gateway_status.clone(),
            gateway_completed_at: detail.gateway_completed_at,
            gateway_raw: Some(serde_json::to_string(&detail.raw)?),
        },
    )?;

    let response = TransactionCreatedResponse {
        id: transaction.id.clone(),
        external_id: transaction.external_id.clone(),
        gateway_order_id: transaction.gateway_order_id.clone(),
        method: transaction.method.clone(),
        status: transaction.status,
        amount: transaction.amount,
        total_payment: transaction.gross_received(),
        payment_number: transaction.payment_number.clone(),
        qr_string: detail.qr_string.clone(),
        qr_image_url: detail.qr_image_url.clone(),
        expired_at: epoch_to_rfc3339(transaction.expired_at),
    };
    let body = serde_json::to_string(&response)?;

    idempotency::complete(&conn, &record.id, StatusCode::CREATED.as_u16(), &body)?;

    Ok(raw_json_response(StatusCode::CREATED, body))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListTransactionsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
}

impl ListTransactionsQuery {
    fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionListItem {
    id: String,
    external_id: String,
    method: String,
    status: TransactionStatus,
    amount: i64,
    total_payment: i64,
    created_at: Option<String>,
}

impl From<Transaction> for TransactionListItem {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id.clone(),
            external_id: t.external_id.clone(),
            method: t.method.clone(),
            status: t.status,
            amount: t.amount,
            total_payment: t.gross_received(),
            created_at: epoch_to_rfc3339(Some(t.created_at)),
        }
    }
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(ctx): Extension<MerchantContext>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<Paginated<TransactionListItem>>> {
    let conn = state.db.get()?;
    rate_limit::enforce(
        &conn,
        &ctx.project.id,
        "transactions:list",
        LIST_LIMIT,
        RATE_WINDOW_SECS,
    )?;

    let status = match &query.status {
        Some(raw) => Some(raw.parse::<TransactionStatus>().map_err(|_| {
            AppError::BadRequest(format!("Unknown status filter: {}", raw))
        })?),
        None => None,
    };

    let page = query.page_query();
    let (items, total) = queries::list_transactions_paginated(
        &conn,
        &ctx.project.id,
        status,
        page.per_page(),
        page.offset(),
    )?;

    Ok(Json(Paginated::new(
        items.into_iter().map(Into::into).collect(),
        total,
        &page,
    )))
}

#[derive(Debug, Serialize)]
pub struct TransactionDetailResponse {
    id: String,
    external_id: String,
    gateway_order_id: String,
    method: String,
    status: TransactionStatus,
    amount: i64,
    fee: i64,
    total_payment: i64,
    payment_number: Option<String>,
    qr_string: Option<String>,
    qr_image_url: Option<String>,
    expired_at: Option<String>,
    paid_at: Option<String>,
    created_at: Option<String>,
}

impl From<Transaction> for TransactionDetailResponse {
    fn from(t: Transaction) -> Self {
        // Instrument fields are re-extracted from the retained raw payload;
        // the stored column is only the last reconciled snapshot.
        let instrument = t
            .gateway_raw
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .map(|raw: serde_json::Value| gateway::extract_instrument(&raw))
            .unwrap_or_default();

        Self {
            id: t.id.clone(),
            external_id: t.external_id.clone(),
            gateway_order_id: t.gateway_order_id.clone(),
            method: t.method.clone(),
            status: t.status,
            amount: t.amount,
            fee: t.fee,
            total_payment: t.gross_received(),
            payment_number: t.payment_number.clone().or(instrument.payment_number),
            qr_string: instrument.qr_string,
            qr_image_url: instrument.qr_image_url,
            expired_at: epoch_to_rfc3339(t.expired_at),
            paid_at: epoch_to_rfc3339(t.paid_at),
            created_at: epoch_to_rfc3339(Some(t.created_at)),
        }
    }
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(ctx): Extension<MerchantContext>,
    Path(id): Path<String>,
) -> Result<Json<TransactionDetailResponse>> {
    let conn = state.db.get()?;
    rate_limit::enforce(
        &conn,
        &ctx.project.id,
        "transactions:detail",
        DETAIL_LIMIT,
        RATE_WINDOW_SECS,
    )?;

    let transaction = queries::get_transaction_for_project(&conn, &ctx.project.id, &id)?
        .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?;

    Ok(Json(transaction.into()))
}

#[derive(Debug, Serialize)]
pub struct SyncTransactionResponse {
    id: String,
    status: TransactionStatus,
    gateway_status: Option<String>,
    total_payment: i64,
    payment_number: Option<String>,
    qr_string: Option<String>,
    paid_at: Option<String>,
}

pub async fn sync_transaction(
    State(state): State<AppState>,
    Extension(ctx): Extension<MerchantContext>,
    Path(id): Path<String>,
) -> Result<Json<SyncTransactionResponse>> {
    {
        let conn = state.db.get()?;
        rate_limit::enforce(
            &conn,
            &ctx.project.id,
            "transactions:sync",
            SYNC_LIMIT,
            RATE_WINDOW_SECS,
        )?;

        queries::get_transaction_for_project(&conn, &ctx.project.id, &id)?
            .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?;
    }

    let updated = reconcile_transaction(&state, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?;

    let qr_string = updated
        .gateway_raw
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .and_then(|raw: serde_json::Value| gateway::extract_instrument(&raw).qr_string);

    Ok(Json(SyncTransactionResponse {
        id: updated.id.clone(),
        status: updated.status,
        gateway_status: updated.gateway_status.clone(),
        total_payment: updated.gross_received(),
        payment_number: updated.payment_number.clone(),
        qr_string,
        paid_at: epoch_to_rfc3339(updated.paid_at),
    }))
}

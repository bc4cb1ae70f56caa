use axum::{
    extract::{Extension, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::balance::project_balance_summary;
use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::middleware::MerchantContext;
use crate::models::{CreateWithdrawal, Withdrawal};
use crate::pagination::{PageQuery, Paginated};
use crate::rate_limit;

/// Smallest withdrawal the payout rail accepts.
const MIN_WITHDRAW: i64 = 100_000;
/// Flat payout fee per withdrawal.
const WITHDRAW_FEE: i64 = 2_500;

const CREATE_LIMIT: i64 = 30;
const LIST_LIMIT: i64 = 120;

#[derive(Debug, Deserialize)]
pub struct CreateWithdrawalRequest {
    pub amount: i64,
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn create_withdrawal(
    State(state): State<AppState>,
    Extension(ctx): Extension<MerchantContext>,
    Json(request): Json<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<Withdrawal>)> {
    let conn = state.db.get()?;
    rate_limit::enforce(&conn, &ctx.project.id, "withdrawals:create", CREATE_LIMIT, 60)?;

    let amount_gross = request.amount;
    if amount_gross < MIN_WITHDRAW {
        return Err(AppError::BadRequest(format!(
            "Minimum withdrawal is {}",
            MIN_WITHDRAW
        )));
    }
    if amount_gross <= WITHDRAW_FEE {
        return Err(AppError::BadRequest(
            "Amount does not cover the withdrawal fee".into(),
        ));
    }

    let (bank_name, account_name, account_number) = match (
        &ctx.project.payout_bank_name,
        &ctx.project.payout_account_name,
        &ctx.project.payout_account_number,
    ) {
        (Some(bank), Some(name), Some(number)) => (bank, name, number),
        _ => {
            return Err(AppError::BadRequest(
                "Payout account is not configured".into(),
            ));
        }
    };

    let summary = project_balance_summary(&conn, &ctx.project.id)?;
    if amount_gross > summary.withdrawable_balance {
        return Err(AppError::BadRequest(
            "Amount exceeds withdrawable balance".into(),
        ));
    }

    let withdrawal = queries::create_withdrawal(
        &conn,
        &CreateWithdrawal {
            project_id: ctx.project.id.clone(),
            amount_gross,
            amount_fee: WITHDRAW_FEE,
            amount_net: amount_gross - WITHDRAW_FEE,
            payout_bank_name: bank_name.clone(),
            payout_account_name: account_name.clone(),
            payout_account_number: account_number.clone(),
            note: request.note.clone(),
        },
    )?;

    Ok((StatusCode::CREATED, Json(withdrawal)))
}

pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(ctx): Extension<MerchantContext>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paginated<Withdrawal>>> {
    let conn = state.db.get()?;
    rate_limit::enforce(&conn, &ctx.project.id, "withdrawals:list", LIST_LIMIT, 60)?;

    let (items, total) = queries::list_withdrawals_paginated(
        &conn,
        &ctx.project.id,
        query.per_page(),
        query.offset(),
    )?;

    Ok(Json(Paginated::new(items, total, &query)))
}

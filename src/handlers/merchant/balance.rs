use axum::extract::{Extension, State};

use crate::balance::{project_balance_summary, BalanceSummary};
use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::middleware::MerchantContext;
use crate::rate_limit;

const BALANCE_LIMIT: i64 = 120;

pub async fn get_balance(
    State(state): State<AppState>,
    Extension(ctx): Extension<MerchantContext>,
) -> Result<Json<BalanceSummary>> {
    let conn = state.db.get()?;
    rate_limit::enforce(&conn, &ctx.project.id, "balance:read", BALANCE_LIMIT, 60)?;

    let summary = project_balance_summary(&conn, &ctx.project.id)?;
    Ok(Json(summary))
}

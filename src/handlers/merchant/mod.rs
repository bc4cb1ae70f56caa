mod balance;
mod transactions;
mod withdrawals;

pub use balance::*;
pub use transactions::*;
pub use withdrawals::*;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::db::AppState;
use crate::middleware::merchant_auth;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/transactions",
            post(create_transaction).get(list_transactions),
        )
        .route("/api/v1/transactions/{id}", get(get_transaction))
        .route("/api/v1/transactions/{id}/sync", post(sync_transaction))
        .route("/api/v1/balance", get(get_balance))
        .route(
            "/api/v1/withdrawals",
            post(create_withdrawal).get(list_withdrawals),
        )
        .route_layer(from_fn_with_state(state, merchant_auth))
}

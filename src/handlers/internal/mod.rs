mod callback;

pub use callback::*;

use axum::{routing::post, Router};

use crate::db::AppState;
use crate::rate_limit;

/// Router for gateway-facing internal endpoints.
///
/// The callback route authenticates via shared-secret token, not a merchant
/// key, so it is rate limited per peer IP rather than per tenant.
pub fn router(callback_rate_limit_rpm: u32) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/internal/gateway/callback",
            post(gateway_callback),
        )
        .layer(rate_limit::callback_layer(callback_rate_limit_rpm))
}

//! Rate limiting for merchant and public endpoints.
//!
//! Merchant routes use a storage-backed fixed-window counter keyed by
//! (project, route). The window is fixed, not sliding: a burst straddling a
//! window edge can reach up to 2x the limit. That boundary artifact is an
//! accepted simplicity/cost tradeoff of this limiter, not a bug.
//!
//! The unauthenticated gateway callback route has no tenant to key on and is
//! limited per peer IP instead, via tower_governor.
//!
//! Configure via environment variables:
//! - CALLBACK_RATE_LIMIT_RPM (default: 60)

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use chrono::Utc;
use rusqlite::Connection;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;

use crate::db::queries;
use crate::error::{AppError, Result};

/// Window state after counting one request.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: i64,
    pub remaining: i64,
    /// Epoch second at which the current window closes
    pub reset_epoch: i64,
}

impl RateLimitDecision {
    /// `x-ratelimit-*` header values for this decision.
    pub fn header_values(&self) -> [(HeaderName, String); 3] {
        [
            (
                HeaderName::from_static("x-ratelimit-limit"),
                self.limit.to_string(),
            ),
            (
                HeaderName::from_static("x-ratelimit-remaining"),
                self.remaining.to_string(),
            ),
            (
                HeaderName::from_static("x-ratelimit-reset"),
                self.reset_epoch.to_string(),
            ),
        ]
    }
}

/// Count this request against the window containing `now`.
pub fn check_at(
    conn: &Connection,
    project_id: &str,
    route_key: &str,
    limit: i64,
    window_seconds: i64,
    now: i64,
) -> Result<RateLimitDecision> {
    let window_seconds = window_seconds.max(1);
    let window_start = (now / window_seconds) * window_seconds;

    let count = queries::increment_rate_limit_window(conn, project_id, route_key, window_start)?;

    Ok(RateLimitDecision {
        allowed: count <= limit,
        limit,
        remaining: (limit - count).max(0),
        reset_epoch: window_start + window_seconds,
    })
}

/// Count this request against the current window.
pub fn check(
    conn: &Connection,
    project_id: &str,
    route_key: &str,
    limit: i64,
    window_seconds: i64,
) -> Result<RateLimitDecision> {
    check_at(
        conn,
        project_id,
        route_key,
        limit,
        window_seconds,
        Utc::now().timestamp(),
    )
}

/// Count this request and fail with a 429 (headers attached) on denial.
pub fn enforce(
    conn: &Connection,
    project_id: &str,
    route_key: &str,
    limit: i64,
    window_seconds: i64,
) -> Result<RateLimitDecision> {
    let decision = check(conn, project_id, route_key, limit, window_seconds)?;
    if !decision.allowed {
        return Err(AppError::RateLimited(decision));
    }
    Ok(decision)
}

/// Rate limiter layer type alias using governor types directly
pub type IpRateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Creates a per-IP rate limiter layer for the public callback route.
pub fn callback_layer(requests_per_minute: u32) -> IpRateLimitLayer {
    assert!(requests_per_minute > 0, "Rate limit must be greater than 0");

    let period_secs = 60 / requests_per_minute as u64;
    let config = GovernorConfigBuilder::default()
        .period(Duration::from_secs(period_secs.max(1)))
        .burst_size(requests_per_minute)
        .finish()
        .expect("Failed to build rate limiter config");

    GovernorLayer {
        config: Arc::new(config),
    }
}

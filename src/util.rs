//! Shared utility functions for the PayBridge application.

use axum::http::HeaderMap;

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Encode a non-negative integer in lowercase base36.
///
/// Used for compact timestamps inside gateway order ids.
pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ASCII")
}

/// Generate a gateway order id for a project.
///
/// Format: `{app_slug}-{timestamp_base36}-{5 hex chars}`. The random tail
/// keeps ids unique when several transactions open in the same second.
pub fn generate_gateway_order_id(app_slug: &str, now: i64) -> String {
    let rand = uuid::Uuid::new_v4().as_simple().to_string();
    format!("{}-{}-{}", app_slug, to_base36(now.max(0) as u64), &rand[..5])
}

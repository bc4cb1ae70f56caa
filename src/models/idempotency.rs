use serde::Serialize;

/// Reservation record for the create endpoint's exactly-once semantics.
///
/// Keyed by (project_id, key). A record without a stored response is
/// in-flight until its lease expires; records are never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct IdempotencyRecord {
    pub id: String,
    pub project_id: String,
    pub key: String,
    /// Fingerprint of the validated request payload; a reused key with a
    /// different fingerprint is a conflict
    pub request_hash: String,
    pub response_status: Option<i64>,
    pub response_body: Option<String>,
    /// A crashed holder's reservation can be reclaimed once this passes
    pub lease_expires_at: i64,
    pub created_at: i64,
}

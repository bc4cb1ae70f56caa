//! At-most-one-effect-per-key guard for the create endpoint.
//!
//! The atomic reservation insert is the single serialization point: exactly
//! one concurrent caller for a key observes [`IdempotencyOutcome::New`], no
//! matter how many arrive. A completed reservation replays its stored
//! response byte-identically; an in-flight reservation whose holder died is
//! reclaimable once its lease expires.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;

use crate::crypto::hash_payload;
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::IdempotencyRecord;

/// How long a reservation without a stored response blocks the key.
pub const LEASE_SECONDS: i64 = 60;

/// Outcome of attempting to reserve an idempotency key.
#[derive(Debug)]
pub enum IdempotencyOutcome {
    /// This caller holds the reservation and must call [`complete`] once
    /// the work succeeds.
    New(IdempotencyRecord),
    /// The key already completed; respond with the stored status and body
    /// verbatim.
    Replay { status: u16, body: String },
    /// Same key, different request payload.
    Conflict,
    /// Another holder is still working (or died with a live lease).
    InFlight,
}

/// Fingerprint a validated request payload for conflict detection.
pub fn hash_request<T: Serialize>(payload: &T) -> Result<String> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(hash_payload(&bytes))
}

/// Reserve (project_id, key) for this request.
pub fn begin(
    conn: &Connection,
    project_id: &str,
    key: &str,
    request_hash: &str,
) -> Result<IdempotencyOutcome> {
    let now = Utc::now().timestamp();
    let lease_expires_at = now + LEASE_SECONDS;

    if let Some(record) =
        queries::insert_idempotency_record(conn, project_id, key, request_hash, lease_expires_at)?
    {
        return Ok(IdempotencyOutcome::New(record));
    }

    // Insert lost to an existing reservation; read it back to classify.
    let existing = queries::get_idempotency_record(conn, project_id, key)?.ok_or_else(|| {
        AppError::Internal("Unable to resolve idempotency state".to_string())
    })?;

    if existing.request_hash != request_hash {
        return Ok(IdempotencyOutcome::Conflict);
    }

    if let (Some(status), Some(body)) = (&existing.response_status, &existing.response_body) {
        return Ok(IdempotencyOutcome::Replay {
            status: (*status).clamp(100, 599) as u16,
            body: body.clone(),
        });
    }

    // No response yet. The original holder may have crashed between begin
    // and complete; an expired lease can be taken over atomically.
    if queries::reclaim_idempotency_lease(conn, &existing.id, now, lease_expires_at)? {
        return Ok(IdempotencyOutcome::New(existing));
    }

    Ok(IdempotencyOutcome::InFlight)
}

/// Store the response for a reservation. Called exactly once by the holder
/// after the work succeeds; retried callers then replay it verbatim.
pub fn complete(conn: &Connection, record_id: &str, status: u16, body: &str) -> Result<()> {
    queries::complete_idempotency_record(conn, record_id, status as i64, body)
}

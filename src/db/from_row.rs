//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! This module provides a `FromRow` trait that models can implement to
//! define how they are constructed from database rows, plus helper functions
//! for common query patterns.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt values.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
///
/// Implementing this trait allows using the `query_one` and `query_all`
/// helper functions, reducing repetitive row mapping closures.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PROJECT_COLS: &str = "id, name, app_slug, webhook_url, webhook_secret, payout_bank_name, payout_account_name, payout_account_number, is_active, created_at, updated_at";

pub const API_KEY_COLS: &str =
    "id, project_id, key_hash, key_prefix, created_at, last_used_at, revoked_at";

pub const TRANSACTION_COLS: &str = "id, project_id, external_id, gateway_order_id, method, status, amount, fee, total_payment, payment_number, expired_at, paid_at, gateway_status, gateway_completed_at, gateway_raw, version, created_at, updated_at";

pub const IDEMPOTENCY_COLS: &str =
    "id, project_id, key, request_hash, response_status, response_body, lease_expires_at, created_at";

pub const WEBHOOK_LOG_COLS: &str = "id, project_id, transaction_id, event_type, attempt_no, is_success, target_url, request_body, response_code, response_body, created_at";

pub const WITHDRAWAL_COLS: &str = "id, project_id, status, amount_gross, amount_fee, amount_net, payout_bank_name, payout_account_name, payout_account_number, note, created_at, updated_at";

// ============ FromRow Implementations ============

impl FromRow for Project {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Project {
            id: row.get(0)?,
            name: row.get(1)?,
            app_slug: row.get(2)?,
            webhook_url: row.get(3)?,
            webhook_secret: row.get(4)?,
            payout_bank_name: row.get(5)?,
            payout_account_name: row.get(6)?,
            payout_account_number: row.get(7)?,
            is_active: row.get::<_, i64>(8)? != 0,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for ApiKey {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ApiKey {
            id: row.get(0)?,
            project_id: row.get(1)?,
            key_hash: row.get(2)?,
            key_prefix: row.get(3)?,
            created_at: row.get(4)?,
            last_used_at: row.get(5)?,
            revoked_at: row.get(6)?,
        })
    }
}

impl FromRow for Transaction {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Transaction {
            id: row.get(0)?,
            project_id: row.get(1)?,
            external_id: row.get(2)?,
            gateway_order_id: row.get(3)?,
            method: row.get(4)?,
            status: parse_enum(row, 5, "status")?,
            amount: row.get(6)?,
            fee: row.get(7)?,
            total_payment: row.get(8)?,
            payment_number: row.get(9)?,
            expired_at: row.get(10)?,
            paid_at: row.get(11)?,
            gateway_status: row.get(12)?,
            gateway_completed_at: row.get(13)?,
            gateway_raw: row.get(14)?,
            version: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }
}

impl FromRow for IdempotencyRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(IdempotencyRecord {
            id: row.get(0)?,
            project_id: row.get(1)?,
            key: row.get(2)?,
            request_hash: row.get(3)?,
            response_status: row.get(4)?,
            response_body: row.get(5)?,
            lease_expires_at: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl FromRow for WebhookLogEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookLogEntry {
            id: row.get(0)?,
            project_id: row.get(1)?,
            transaction_id: row.get(2)?,
            event_type: row.get(3)?,
            attempt_no: row.get(4)?,
            is_success: row.get::<_, i64>(5)? != 0,
            target_url: row.get(6)?,
            request_body: row.get(7)?,
            response_code: row.get(8)?,
            response_body: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

impl FromRow for Withdrawal {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Withdrawal {
            id: row.get(0)?,
            project_id: row.get(1)?,
            status: parse_enum(row, 2, "status")?,
            amount_gross: row.get(3)?,
            amount_fee: row.get(4)?,
            amount_net: row.get(5)?,
            payout_bank_name: row.get(6)?,
            payout_account_name: row.get(7)?,
            payout_account_number: row.get(8)?,
            note: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

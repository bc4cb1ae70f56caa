//! Balance ledger derived from paid transactions and open withdrawals.
//!
//! Read-only: nothing here mutates state. A paid transaction's net amount
//! becomes withdrawable only after the maturity window; open withdrawal
//! requests reserve their gross amount so concurrent requests cannot jointly
//! over-draw the same eligible funds.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::error::Result;

/// Seconds a paid transaction must settle before its net is withdrawable.
pub const MATURITY_WINDOW_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BalanceSummary {
    /// Sum of net amounts over all paid transactions
    pub total_balance: i64,
    /// Matured net minus open withdrawal reservations, floored at zero
    pub withdrawable_balance: i64,
}

/// Compute the balance summary as of `now`.
pub fn summary_at(conn: &Connection, project_id: &str, now: i64) -> Result<BalanceSummary> {
    let cutoff = now - MATURITY_WINDOW_SECS;

    let mut total_balance = 0i64;
    let mut eligible_balance = 0i64;
    for (gross, fee, settled_at) in queries::paid_settlements(conn, project_id)? {
        let net = (gross - fee.max(0)).max(0);
        total_balance += net;
        if settled_at <= cutoff {
            eligible_balance += net;
        }
    }

    let reserved = queries::reserved_withdrawal_total(conn, project_id)?;
    let withdrawable_balance = (eligible_balance - reserved).max(0);

    Ok(BalanceSummary {
        total_balance,
        withdrawable_balance,
    })
}

/// Compute the balance summary as of the current time.
pub fn project_balance_summary(conn: &Connection, project_id: &str) -> Result<BalanceSummary> {
    summary_at(conn, project_id, Utc::now().timestamp())
}

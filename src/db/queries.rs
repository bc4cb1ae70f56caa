use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::crypto::{generate_api_key, hash_secret};
use crate::error::Result;
use crate::gateway::GatewayDetail;
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    query_all, query_one, FromRow, API_KEY_COLS, IDEMPOTENCY_COLS, PROJECT_COLS, TRANSACTION_COLS,
    WEBHOOK_LOG_COLS, WITHDRAWAL_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Projects ============

/// Create a project.
pub fn create_project(conn: &Connection, input: &CreateProject) -> Result<Project> {
    let id = EntityType::Project.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO projects (id, name, app_slug, webhook_url, webhook_secret, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)",
        params![
            &id,
            &input.name,
            &input.app_slug,
            &input.webhook_url,
            &input.webhook_secret,
            now,
            now
        ],
    )?;

    Ok(Project {
        id,
        name: input.name.clone(),
        app_slug: input.app_slug.clone(),
        webhook_url: input.webhook_url.clone(),
        webhook_secret: input.webhook_secret.clone(),
        payout_bank_name: None,
        payout_account_name: None,
        payout_account_number: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_project_by_id(conn: &Connection, id: &str) -> Result<Option<Project>> {
    query_one(
        conn,
        &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLS),
        &[&id],
    )
}

/// Store the payout destination used to snapshot withdrawal requests.
pub fn set_project_payout(
    conn: &Connection,
    id: &str,
    bank_name: &str,
    account_name: &str,
    account_number: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE projects
         SET payout_bank_name = ?2, payout_account_name = ?3, payout_account_number = ?4, updated_at = ?5
         WHERE id = ?1",
        params![id, bank_name, account_name, account_number, now()],
    )?;
    Ok(affected > 0)
}

pub fn set_project_active(conn: &Connection, id: &str, active: bool) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE projects SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, active as i64, now()],
    )?;
    Ok(affected > 0)
}

// ============ API Keys ============

/// Create a new API key for a project, revoking any prior active keys.
/// Returns the key record and the raw key (shown once, never stored).
pub fn create_api_key(conn: &Connection, project_id: &str) -> Result<(ApiKey, String)> {
    let raw_key = generate_api_key();
    let key_hash = hash_secret(&raw_key);
    let key_prefix = raw_key[..15.min(raw_key.len())].to_string();
    let id = EntityType::ApiKey.gen_id();
    let now = now();

    conn.execute(
        "UPDATE api_keys SET revoked_at = ?2 WHERE project_id = ?1 AND revoked_at IS NULL",
        params![project_id, now],
    )?;
    conn.execute(
        "INSERT INTO api_keys (id, project_id, key_hash, key_prefix, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, project_id, &key_hash, &key_prefix, now],
    )?;

    Ok((
        ApiKey {
            id,
            project_id: project_id.to_string(),
            key_hash,
            key_prefix,
            created_at: now,
            last_used_at: None,
            revoked_at: None,
        },
        raw_key,
    ))
}

/// Resolve a raw bearer key to its active project.
/// Returns None for unknown, revoked, or inactive-project keys.
pub fn get_project_by_api_key(conn: &Connection, raw_key: &str) -> Result<Option<Project>> {
    let hash = hash_secret(raw_key);

    let key: Option<ApiKey> = query_one(
        conn,
        &format!(
            "SELECT {} FROM api_keys WHERE key_hash = ?1 AND revoked_at IS NULL",
            API_KEY_COLS
        ),
        &[&hash],
    )?;

    let Some(key) = key else {
        return Ok(None);
    };

    // Update last_used_at (fire and forget)
    let _ = conn.execute(
        "UPDATE api_keys SET last_used_at = ?2 WHERE id = ?1",
        params![&key.id, now()],
    );

    let project: Option<Project> = query_one(
        conn,
        &format!(
            "SELECT {} FROM projects WHERE id = ?1 AND is_active = 1",
            PROJECT_COLS
        ),
        &[&key.project_id],
    )?;

    Ok(project)
}

// ============ Transactions ============

/// Create a transaction row from the gateway's create response.
pub fn create_transaction(conn: &Connection, input: &CreateTransaction) -> Result<Transaction> {
    let id = EntityType::Transaction.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO transactions (id, project_id, external_id, gateway_order_id, method, status,
             amount, fee, total_payment, payment_number, expired_at, paid_at,
             gateway_status, gateway_completed_at, gateway_raw, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 0, ?16, ?17)",
        params![
            &id,
            &input.project_id,
            &input.external_id,
            &input.gateway_order_id,
            &input.method,
            input.status.as_str(),
            input.amount,
            input.fee,
            input.total_payment,
            &input.payment_number,
            input.expired_at,
            input.paid_at,
            &input.gateway_status,
            input.gateway_completed_at,
            &input.gateway_raw,
            now,
            now
        ],
    )?;

    Ok(Transaction {
        id,
        project_id: input.project_id.clone(),
        external_id: input.external_id.clone(),
        gateway_order_id: input.gateway_order_id.clone(),
        method: input.method.clone(),
        status: input.status,
        amount: input.amount,
        fee: input.fee,
        total_payment: input.total_payment,
        payment_number: input.payment_number.clone(),
        expired_at: input.expired_at,
        paid_at: input.paid_at,
        gateway_status: input.gateway_status.clone(),
        gateway_completed_at: input.gateway_completed_at,
        gateway_raw: input.gateway_raw.clone(),
        version: 0,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_transaction_by_id(conn: &Connection, id: &str) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLS),
        &[&id],
    )
}

/// Get a transaction scoped to its owning project (merchant-facing lookups).
pub fn get_transaction_for_project(
    conn: &Connection,
    project_id: &str,
    id: &str,
) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM transactions WHERE id = ?1 AND project_id = ?2",
            TRANSACTION_COLS
        ),
        &[&id, &project_id],
    )
}

pub fn get_transaction_by_gateway_order_id(
    conn: &Connection,
    gateway_order_id: &str,
) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM transactions WHERE gateway_order_id = ?1",
            TRANSACTION_COLS
        ),
        &[&gateway_order_id],
    )
}

pub fn list_transactions_paginated(
    conn: &Connection,
    project_id: &str,
    status: Option<TransactionStatus>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Transaction>, i64)> {
    let (filter, status_str) = match status {
        Some(s) => (" AND status = ?2", Some(s.as_str().to_string())),
        None => ("", None),
    };

    let total: i64 = match &status_str {
        Some(s) => conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM transactions WHERE project_id = ?1{}",
                filter
            ),
            params![project_id, s],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?,
    };

    let items = match &status_str {
        Some(s) => query_all(
            conn,
            &format!(
                "SELECT {} FROM transactions WHERE project_id = ?1{} ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
                TRANSACTION_COLS, filter
            ),
            params![project_id, s, limit, offset],
        )?,
        None => query_all(
            conn,
            &format!(
                "SELECT {} FROM transactions WHERE project_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                TRANSACTION_COLS
            ),
            params![project_id, limit, offset],
        )?,
    };

    Ok((items, total))
}

/// Apply a gateway read to a transaction under optimistic concurrency.
///
/// The write is conditional on the version the caller read; a lost race
/// returns None and the caller must re-read instead of firing side effects.
pub fn apply_reconciliation(
    conn: &Connection,
    transaction: &Transaction,
    detail: &GatewayDetail,
    fee: i64,
) -> Result<Option<Transaction>> {
    let raw = serde_json::to_string(&detail.raw)?;
    conn.query_row(
        &format!(
            "UPDATE transactions
             SET status = ?3, fee = ?4, total_payment = ?5,
                 payment_number = COALESCE(?6, payment_number),
                 expired_at = ?7, paid_at = ?8,
                 gateway_status = ?9, gateway_completed_at = ?10, gateway_raw = ?11,
                 version = version + 1, updated_at = ?12
             WHERE id = ?1 AND version = ?2
             RETURNING {}",
            TRANSACTION_COLS
        ),
        params![
            &transaction.id,
            transaction.version,
            detail.status.as_str(),
            fee,
            transaction.amount,
            &detail.payment_number,
            detail.expired_at,
            detail.paid_at,
            &detail.gateway_status,
            detail.gateway_completed_at,
            &raw,
            now()
        ],
        Transaction::from_row,
    )
    .optional()
    .map_err(Into::into)
}

/// Pending transactions that have not been touched recently, for the
/// background poller. Excludes rows whose gateway expiry is long past.
pub fn list_stale_pending_transaction_ids(
    conn: &Connection,
    older_than: i64,
    limit: i64,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM transactions
         WHERE status = 'pending' AND updated_at <= ?1
         ORDER BY updated_at ASC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![older_than, limit], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(rows)
}

// ============ Idempotency ============

/// Attempt the atomic reservation insert for (project_id, key).
/// Returns None when the unique constraint fires (key already reserved).
pub fn insert_idempotency_record(
    conn: &Connection,
    project_id: &str,
    key: &str,
    request_hash: &str,
    lease_expires_at: i64,
) -> Result<Option<IdempotencyRecord>> {
    let id = EntityType::IdempotencyKey.gen_id();
    let now = now();

    let inserted = conn.execute(
        "INSERT INTO idempotency_keys (id, project_id, key, request_hash, lease_expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, project_id, key, request_hash, lease_expires_at, now],
    );

    match inserted {
        Ok(_) => Ok(Some(IdempotencyRecord {
            id,
            project_id: project_id.to_string(),
            key: key.to_string(),
            request_hash: request_hash.to_string(),
            response_status: None,
            response_body: None,
            lease_expires_at,
            created_at: now,
        })),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation =>
        {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_idempotency_record(
    conn: &Connection,
    project_id: &str,
    key: &str,
) -> Result<Option<IdempotencyRecord>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM idempotency_keys WHERE project_id = ?1 AND key = ?2",
            IDEMPOTENCY_COLS
        ),
        &[&project_id, &key],
    )
}

/// Take over an expired in-flight reservation. The WHERE clause makes the
/// reclaim atomic: exactly one concurrent caller wins.
pub fn reclaim_idempotency_lease(
    conn: &Connection,
    record_id: &str,
    now_epoch: i64,
    new_lease_expires_at: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE idempotency_keys SET lease_expires_at = ?3
         WHERE id = ?1 AND response_status IS NULL AND lease_expires_at <= ?2",
        params![record_id, now_epoch, new_lease_expires_at],
    )?;
    Ok(affected > 0)
}

/// Store the response for a completed reservation.
pub fn complete_idempotency_record(
    conn: &Connection,
    record_id: &str,
    status: i64,
    body: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE idempotency_keys SET response_status = ?2, response_body = ?3 WHERE id = ?1",
        params![record_id, status, body],
    )?;
    Ok(())
}

// ============ Rate Limit Windows ============

/// Atomically create-or-increment the counter for one fixed window.
/// Returns the count after this request.
pub fn increment_rate_limit_window(
    conn: &Connection,
    project_id: &str,
    route_key: &str,
    window_start: i64,
) -> Result<i64> {
    let count = conn.query_row(
        "INSERT INTO rate_limit_windows (project_id, route_key, window_start, count)
         VALUES (?1, ?2, ?3, 1)
         ON CONFLICT(project_id, route_key, window_start) DO UPDATE SET count = count + 1
         RETURNING count",
        params![project_id, route_key, window_start],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============ Webhook Logs ============

/// Append one delivery-attempt row to the audit trail.
pub fn create_webhook_log(conn: &Connection, input: &CreateWebhookLog) -> Result<WebhookLogEntry> {
    let id = EntityType::WebhookLog.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO webhook_logs (id, project_id, transaction_id, event_type, attempt_no,
             is_success, target_url, request_body, response_code, response_body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            &id,
            &input.project_id,
            &input.transaction_id,
            &input.event_type,
            input.attempt_no,
            input.is_success as i64,
            &input.target_url,
            &input.request_body,
            input.response_code,
            &input.response_body,
            now
        ],
    )?;

    Ok(WebhookLogEntry {
        id,
        project_id: input.project_id.clone(),
        transaction_id: input.transaction_id.clone(),
        event_type: input.event_type.clone(),
        attempt_no: input.attempt_no,
        is_success: input.is_success,
        target_url: input.target_url.clone(),
        request_body: input.request_body.clone(),
        response_code: input.response_code,
        response_body: input.response_body.clone(),
        created_at: now,
    })
}

pub fn list_webhook_logs_for_transaction(
    conn: &Connection,
    transaction_id: &str,
) -> Result<Vec<WebhookLogEntry>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM webhook_logs WHERE transaction_id = ?1 ORDER BY attempt_no ASC, created_at ASC",
            WEBHOOK_LOG_COLS
        ),
        &[&transaction_id],
    )
}

// ============ Withdrawals ============

/// Create a pending withdrawal request with a payout snapshot.
pub fn create_withdrawal(conn: &Connection, input: &CreateWithdrawal) -> Result<Withdrawal> {
    let id = EntityType::Withdrawal.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO withdrawals (id, project_id, status, amount_gross, amount_fee, amount_net,
             payout_bank_name, payout_account_name, payout_account_number, note, created_at, updated_at)
         VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            &id,
            &input.project_id,
            input.amount_gross,
            input.amount_fee,
            input.amount_net,
            &input.payout_bank_name,
            &input.payout_account_name,
            &input.payout_account_number,
            &input.note,
            now,
            now
        ],
    )?;

    Ok(Withdrawal {
        id,
        project_id: input.project_id.clone(),
        status: WithdrawalStatus::Pending,
        amount_gross: input.amount_gross,
        amount_fee: input.amount_fee,
        amount_net: input.amount_net,
        payout_bank_name: input.payout_bank_name.clone(),
        payout_account_name: input.payout_account_name.clone(),
        payout_account_number: input.payout_account_number.clone(),
        note: input.note.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn list_withdrawals_paginated(
    conn: &Connection,
    project_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Withdrawal>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM withdrawals WHERE project_id = ?1",
        params![project_id],
        |row| row.get(0),
    )?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM withdrawals WHERE project_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            WITHDRAWAL_COLS
        ),
        params![project_id, limit, offset],
    )?;
    Ok((items, total))
}

pub fn update_withdrawal_status(
    conn: &Connection,
    id: &str,
    status: WithdrawalStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE withdrawals SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status.as_str(), now()],
    )?;
    Ok(affected > 0)
}

// ============ Balance ============

/// Gross/fee/settlement-time rows for all paid transactions of a project.
/// Settlement time falls back to creation time when paid_at is missing.
pub fn paid_settlements(conn: &Connection, project_id: &str) -> Result<Vec<(i64, i64, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT CASE WHEN total_payment > 0 THEN total_payment ELSE amount END,
                fee,
                COALESCE(paid_at, created_at)
         FROM transactions WHERE project_id = ?1 AND status = 'paid'",
    )?;
    let rows = stmt
        .query_map(params![project_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Sum of gross amounts reserved by open (non-rejected) withdrawals.
pub fn reserved_withdrawal_total(conn: &Connection, project_id: &str) -> Result<i64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount_gross), 0) FROM withdrawals
         WHERE project_id = ?1 AND status IN ('pending', 'processing', 'completed')",
        params![project_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

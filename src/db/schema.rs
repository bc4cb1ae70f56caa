use rusqlite::Connection;

/// Initialize the database schema.
///
/// WAL mode keeps concurrent request handlers from serializing on reads;
/// rate-limit increments and webhook logs are small sequential writes.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;

        -- Projects (merchant tenants)
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            app_slug TEXT NOT NULL UNIQUE,
            webhook_url TEXT,
            webhook_secret TEXT,
            payout_bank_name TEXT,
            payout_account_name TEXT,
            payout_account_number TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- API keys (one active credential per project; creation revokes priors)
        CREATE TABLE IF NOT EXISTS api_keys (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            key_hash TEXT NOT NULL UNIQUE,
            key_prefix TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            last_used_at INTEGER,
            revoked_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_api_keys_project ON api_keys(project_id);
        CREATE INDEX IF NOT EXISTS idx_api_keys_hash ON api_keys(key_hash);

        -- Transactions (status moves pending -> paid/failed/expired only)
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            external_id TEXT NOT NULL,
            gateway_order_id TEXT NOT NULL UNIQUE,
            method TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'paid', 'failed', 'expired')),
            amount INTEGER NOT NULL,
            fee INTEGER NOT NULL DEFAULT 0,
            total_payment INTEGER NOT NULL DEFAULT 0,
            payment_number TEXT,
            expired_at INTEGER,
            paid_at INTEGER,
            gateway_status TEXT,
            gateway_completed_at INTEGER,
            gateway_raw TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_project_time ON transactions(project_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_transactions_project_status ON transactions(project_id, status);
        CREATE INDEX IF NOT EXISTS idx_transactions_external ON transactions(project_id, external_id);

        -- Idempotency reservations (never deleted; lease allows reclaim of
        -- records whose holder crashed before storing a response)
        CREATE TABLE IF NOT EXISTS idempotency_keys (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            request_hash TEXT NOT NULL,
            response_status INTEGER,
            response_body TEXT,
            lease_expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(project_id, key)
        );

        -- Fixed-window request counters (never deleted; closed windows are
        -- effectively immutable)
        CREATE TABLE IF NOT EXISTS rate_limit_windows (
            project_id TEXT NOT NULL,
            route_key TEXT NOT NULL,
            window_start INTEGER NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (project_id, route_key, window_start)
        );

        -- Webhook delivery audit trail (append-only, one row per attempt)
        CREATE TABLE IF NOT EXISTS webhook_logs (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            transaction_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            attempt_no INTEGER NOT NULL,
            is_success INTEGER NOT NULL DEFAULT 0,
            target_url TEXT NOT NULL,
            request_body TEXT NOT NULL,
            response_code INTEGER,
            response_body TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_logs_project_time ON webhook_logs(project_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_webhook_logs_transaction ON webhook_logs(transaction_id, attempt_no);

        -- Withdrawal requests (payout destination snapshotted at request time)
        CREATE TABLE IF NOT EXISTS withdrawals (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            status TEXT NOT NULL CHECK (status IN ('pending', 'processing', 'completed', 'rejected')),
            amount_gross INTEGER NOT NULL,
            amount_fee INTEGER NOT NULL,
            amount_net INTEGER NOT NULL,
            payout_bank_name TEXT NOT NULL,
            payout_account_name TEXT NOT NULL,
            payout_account_number TEXT NOT NULL,
            note TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_withdrawals_project_time ON withdrawals(project_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_withdrawals_project_status ON withdrawals(project_id, status);
        "#,
    )?;
    Ok(())
}

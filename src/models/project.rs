use serde::{Deserialize, Serialize};

/// A merchant tenant. Owns API keys, transactions, withdrawals, rate-limit
/// windows, and idempotency records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Short slug embedded in generated gateway order ids
    pub app_slug: String,
    /// Target for merchant webhook deliveries (None = deliveries skipped)
    pub webhook_url: Option<String>,
    /// HMAC key for signing outbound webhook bodies (None = unsigned)
    pub webhook_secret: Option<String>,
    pub payout_bank_name: Option<String>,
    pub payout_account_name: Option<String>,
    pub payout_account_number: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Data required to create a new project
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub app_slug: String,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

/// A merchant bearer credential. The raw key is shown once at creation;
/// only the salted hash is stored.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKey {
    pub id: String,
    pub project_id: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
    pub revoked_at: Option<i64>,
}

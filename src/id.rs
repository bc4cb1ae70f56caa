//! Prefixed ID generation for PayBridge entities.
//!
//! All IDs use a `pb_` brand prefix to guarantee collision avoidance with
//! gateway-side identifiers (order ids, VA numbers, etc.).
//!
//! Format: `pb_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &[
    "pb_proj_",
    "pb_key_",
    "pb_txn_",
    "pb_idem_",
    "pb_whl_",
    "pb_wd_",
];

/// Validate that a string is a valid PayBridge prefixed ID.
///
/// This is a cheap check to reject garbage before hitting the database.
/// Validates format: `pb_{entity}_{32_hex_chars}`
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in PayBridge.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Project,
    ApiKey,
    Transaction,
    IdempotencyKey,
    WebhookLog,
    Withdrawal,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Project => "pb_proj",
            Self::ApiKey => "pb_key",
            Self::Transaction => "pb_txn",
            Self::IdempotencyKey => "pb_idem",
            Self::WebhookLog => "pb_whl",
            Self::Withdrawal => "pb_wd",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}

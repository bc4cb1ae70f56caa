use serde::Serialize;

/// Append-only record of one webhook delivery attempt. One row per attempt,
/// never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookLogEntry {
    pub id: String,
    pub project_id: String,
    pub transaction_id: String,
    /// e.g. "transaction.paid"
    pub event_type: String,
    /// 1-based attempt counter within one delivery sequence
    pub attempt_no: i64,
    pub is_success: bool,
    pub target_url: String,
    /// Outgoing event envelope (JSON text)
    pub request_body: String,
    /// HTTP status of the merchant's response, None on transport error
    pub response_code: Option<i64>,
    /// Merchant response body, or the transport error message
    pub response_body: Option<String>,
    pub created_at: i64,
}

/// Data required to append a webhook log row
#[derive(Debug, Clone)]
pub struct CreateWebhookLog {
    pub project_id: String,
    pub transaction_id: String,
    pub event_type: String,
    pub attempt_no: i64,
    pub is_success: bool,
    pub target_url: String,
    pub request_body: String,
    pub response_code: Option<i64>,
    pub response_body: Option<String>,
}

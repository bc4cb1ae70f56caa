//! Merchant webhook delivery with bounded retry and an audit trail.
//!
//! One delivery sequence makes up to three attempts with exponential backoff
//! and writes one [`WebhookLogEntry`](crate::models::WebhookLogEntry) per
//! attempt. Total failure is recorded but not escalated: the merchant
//! observes it through the audit log or by calling sync.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;

use crate::crypto::sign_payload;
use crate::db::{queries, DbPool};
use crate::models::{CreateWebhookLog, Project, Transaction};

/// Attempts per delivery sequence.
const MAX_ATTEMPTS: i64 = 3;
/// Backoff before attempt N+1 is BACKOFF_BASE * 2^(N-1).
const BACKOFF_BASE: Duration = Duration::from_millis(300);
/// Per-attempt timeout; a stalled merchant endpoint must not pin the worker.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Signature header accompanying signed deliveries.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Event envelope POSTed to the merchant's webhook URL.
#[derive(Debug, Serialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created_at: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Serialize)]
pub struct WebhookEventData {
    pub transaction_id: String,
    pub external_id: String,
    pub status: String,
    pub method: String,
    pub amounts: WebhookEventAmounts,
    pub paid_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookEventAmounts {
    pub amount: i64,
    pub total_payment: i64,
}

/// Build the event envelope for a transaction's current status.
pub fn build_event(transaction: &Transaction) -> WebhookEvent {
    WebhookEvent {
        id: format!("evt_{}", transaction.id),
        event_type: format!("transaction.{}", transaction.status),
        created_at: Utc::now().to_rfc3339(),
        data: WebhookEventData {
            transaction_id: transaction.id.clone(),
            external_id: transaction.external_id.clone(),
            status: transaction.status.to_string(),
            method: transaction.method.clone(),
            amounts: WebhookEventAmounts {
                amount: transaction.amount,
                total_payment: transaction.gross_received(),
            },
            paid_at: transaction
                .paid_at
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.to_rfc3339()),
        },
    }
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    client: Client,
}

impl Default for WebhookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction only fails on TLS misconfiguration");
        Self { client }
    }

    /// Deliver the transaction's terminal-state event to the project's
    /// webhook URL.
    ///
    /// Never returns an error: every attempt is recorded in the audit log
    /// and delivery failure must not fail the reconciliation that
    /// triggered it.
    pub async fn deliver(&self, pool: &DbPool, project: &Project, transaction: &Transaction) {
        let Some(target_url) = project.webhook_url.as_deref().filter(|u| !u.is_empty()) else {
            tracing::warn!(
                project_id = %project.id,
                transaction_id = %transaction.id,
                "Skipping webhook delivery: project has no webhook URL"
            );
            return;
        };

        let event = build_event(transaction);
        let body = match serde_json::to_string(&event) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Failed to serialize webhook event: {}", e);
                return;
            }
        };

        for attempt_no in 1..=MAX_ATTEMPTS {
            let mut request = self
                .client
                .post(target_url)
                .header("content-type", "application/json")
                .body(body.clone());
            if let Some(secret) = project.webhook_secret.as_deref().filter(|s| !s.is_empty()) {
                request = request.header(SIGNATURE_HEADER, sign_payload(secret, body.as_bytes()));
            }

            let (is_success, response_code, response_body) = match request.send().await {
                Ok(response) => {
                    let code = response.status().as_u16() as i64;
                    let ok = response.status().is_success();
                    let text = response.text().await.unwrap_or_default();
                    (ok, Some(code), Some(text))
                }
                Err(e) => (false, None, Some(e.to_string())),
            };

            let log = CreateWebhookLog {
                project_id: project.id.clone(),
                transaction_id: transaction.id.clone(),
                event_type: event.event_type.clone(),
                attempt_no,
                is_success,
                target_url: target_url.to_string(),
                request_body: body.clone(),
                response_code,
                response_body,
            };
            match pool.get() {
                Ok(conn) => {
                    if let Err(e) = queries::create_webhook_log(&conn, &log) {
                        tracing::error!("Failed to record webhook attempt: {}", e);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to get db connection for webhook log: {}", e);
                }
            }

            if is_success {
                tracing::debug!(
                    transaction_id = %transaction.id,
                    attempt = attempt_no,
                    "Webhook delivered"
                );
                return;
            }

            if attempt_no < MAX_ATTEMPTS {
                tokio::time::sleep(BACKOFF_BASE * 2u32.pow((attempt_no - 1) as u32)).await;
            }
        }

        tracing::warn!(
            transaction_id = %transaction.id,
            target_url,
            "Webhook delivery exhausted all attempts"
        );
    }
}

//! Client for the external payment gateway.
//!
//! Hides the gateway's wire shape behind a stable contract: heterogeneous
//! status vocabularies are normalized into [`TransactionStatus`], instrument
//! fields are extracted from known aliases, and every response keeps its raw
//! payload for audit. The gateway is authoritative but only eventually
//! consistent; a failed create call does NOT mean the remote side created
//! nothing, and no compensating action is taken.

use std::time::Duration;

use chrono::DateTime;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::models::TransactionStatus;

/// Per-call timeout for gateway HTTP requests. A stalled gateway must not
/// hold a request handler indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Gateway-side project identifier
    pub project: String,
    pub api_key: String,
    /// Shared secret expected on inbound push callbacks
    pub callback_token: String,
}

impl GatewayConfig {
    pub fn is_configured(&self) -> bool {
        !self.project.is_empty() && !self.api_key.is_empty()
    }
}

/// Normalized snapshot of one gateway read (create or detail).
#[derive(Debug, Clone)]
pub struct GatewayDetail {
    pub status: TransactionStatus,
    /// Raw status string exactly as reported
    pub gateway_status: Option<String>,
    /// Fee as the gateway reports it; informational only, never trusted
    pub fee: i64,
    pub amount: i64,
    pub total_payment: i64,
    pub payment_number: Option<String>,
    pub qr_string: Option<String>,
    pub qr_image_url: Option<String>,
    pub expired_at: Option<i64>,
    pub paid_at: Option<i64>,
    pub gateway_completed_at: Option<i64>,
    /// Full raw payload, stored for audit
    pub raw: Value,
}

/// Instrument data extracted from a raw gateway payload.
#[derive(Debug, Clone, Default)]
pub struct PaymentInstrument {
    pub payment_number: Option<String>,
    pub qr_string: Option<String>,
    pub qr_image_url: Option<String>,
}

#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction only fails on TLS misconfiguration");
        Self { client, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn callback_token(&self) -> &str {
        &self.config.callback_token
    }

    /// Open a payment on the gateway.
    ///
    /// The method selects the endpoint path. Any transport error, non-2xx
    /// status, or `"failed"` envelope becomes `AppError::Gateway`; the
    /// caller must not assume the remote side created nothing.
    pub async fn create(
        &self,
        method: &str,
        amount: i64,
        order_id: &str,
        payer_name: &str,
        callback_url: Option<&str>,
    ) -> Result<GatewayDetail> {
        let path_method = method_to_path(method);
        let url = format!(
            "{}/api/transactioncreate/{}",
            self.config.base_url,
            urlencoding::encode(&path_method)
        );

        let mut payload = json!({
            "project": self.config.project,
            "amount": amount,
            "order_id": order_id,
            "api_key": self.config.api_key,
            "payer_name": if payer_name.is_empty() { "Customer" } else { payer_name },
        });
        if let Some(callback_url) = callback_url {
            payload["callback_url"] = json!(callback_url);
        }

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("create request failed: {}", e)))?;

        let body = read_gateway_body(response, "Gateway create transaction failed").await?;
        Ok(parse_detail(unwrap_payload(body)))
    }

    /// Fetch current status for a known order.
    pub async fn fetch_detail(&self, amount: i64, order_id: &str) -> Result<GatewayDetail> {
        let url = format!("{}/api/transactiondetail", self.config.base_url);
        let amount = amount.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("project", self.config.project.as_str()),
                ("amount", amount.as_str()),
                ("order_id", order_id),
                ("api_key", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("detail request failed: {}", e)))?;

        let body = read_gateway_body(response, "Gateway detail fetch failed").await?;
        Ok(parse_detail(unwrap_payload(body)))
    }
}

/// Check the HTTP status and the gateway's own `status` field, returning the
/// parsed JSON body on success.
async fn read_gateway_body(response: reqwest::Response, context: &str) -> Result<Value> {
    let http_status = response.status();
    let body: Value = response.json().await.unwrap_or_else(|_| json!({}));

    let envelope_failed = body.get("status").and_then(Value::as_str) == Some("failed");
    if !http_status.is_success() || envelope_failed {
        let reason = body
            .get("msg")
            .or_else(|| body.get("message"))
            .and_then(Value::as_str)
            .unwrap_or(context);
        return Err(AppError::Gateway(reason.to_string()));
    }

    Ok(body)
}

/// The gateway wraps its object under varying envelope keys.
pub fn unwrap_payload(body: Value) -> Value {
    for key in ["data", "payment", "transaction", "result", "response"] {
        if let Some(inner) = body.get(key) {
            if inner.is_object() {
                return inner.clone();
            }
        }
    }
    body
}

fn method_to_path(method: &str) -> String {
    let normalized = method.to_lowercase();
    if normalized.is_empty() {
        return "qris".to_string();
    }
    normalized
}

/// Map the gateway's status vocabulary onto ours, case-insensitively.
///
/// Unknown values stay `pending` so a vocabulary change on the gateway side
/// can never silently mark a payment paid or failed.
pub fn normalize_status(raw: &str) -> TransactionStatus {
    match raw.to_lowercase().as_str() {
        "completed" | "paid" | "success" => TransactionStatus::Paid,
        "expired" => TransactionStatus::Expired,
        "failed" | "cancelled" | "canceled" => TransactionStatus::Failed,
        _ => TransactionStatus::Pending,
    }
}

fn pick_first(data: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(value) = data.get(key).and_then(Value::as_str) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Best-effort instrument extraction over known field aliases.
pub fn extract_instrument(data: &Value) -> PaymentInstrument {
    PaymentInstrument {
        payment_number: pick_first(
            data,
            &[
                "payment_number",
                "va_number",
                "virtual_account",
                "virtual_account_number",
                "nomor_va",
                "va",
            ],
        ),
        qr_string: pick_first(
            data,
            &[
                "qr_string",
                "qris_string",
                "qr_content",
                "qr_code",
                "qr_text",
                "qris_payload",
                "payload",
            ],
        ),
        qr_image_url: pick_first(
            data,
            &["qr_url", "qris_url", "qr_image", "qr_image_url", "qrcode_url"],
        ),
    }
}

fn parse_timestamp(data: &Value, key: &str) -> Option<i64> {
    let raw = data.get(key)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp())
}

fn money_field(data: &Value, key: &str) -> i64 {
    match data.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_else(|| {
            n.as_f64().map(|f| f.round() as i64).unwrap_or(0)
        }),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Build a [`GatewayDetail`] from an unwrapped payload object.
pub fn parse_detail(data: Value) -> GatewayDetail {
    let gateway_status = data
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_string);
    let status = gateway_status
        .as_deref()
        .map(normalize_status)
        .unwrap_or(TransactionStatus::Pending);
    let instrument = extract_instrument(&data);
    let completed_at = parse_timestamp(&data, "completed_at");

    GatewayDetail {
        status,
        gateway_status,
        fee: money_field(&data, "fee"),
        amount: money_field(&data, "amount"),
        total_payment: money_field(&data, "total_payment"),
        payment_number: instrument.payment_number,
        qr_string: instrument.qr_string,
        qr_image_url: instrument.qr_image_url,
        expired_at: parse_timestamp(&data, "expired_at"),
        paid_at: completed_at,
        gateway_completed_at: completed_at,
        raw: data,
    }
}

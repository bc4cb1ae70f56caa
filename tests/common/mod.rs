//! Test utilities and fixtures for PayBridge integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use serde_json::{json, Value};

pub use paybridge::db::{init_db, queries, AppState, DbPool};
pub use paybridge::gateway::{GatewayClient, GatewayConfig};
pub use paybridge::models::*;
pub use paybridge::webhook::WebhookDispatcher;

pub const TEST_CALLBACK_TOKEN: &str = "test-callback-token";

/// Create an in-memory pool with the schema initialized.
///
/// max_size is 1: each in-memory SQLite connection is its own database, so
/// every component must share the single pooled connection.
pub fn setup_test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    pool
}

/// Create an AppState pointed at a gateway base URL (usually a mock server).
pub fn create_test_app_state(gateway_base_url: &str) -> AppState {
    AppState {
        db: setup_test_pool(),
        base_url: "http://localhost:3000".to_string(),
        gateway: GatewayClient::new(GatewayConfig {
            base_url: gateway_base_url.to_string(),
            project: "test-project".to_string(),
            api_key: "test-gateway-key".to_string(),
            callback_token: TEST_CALLBACK_TOKEN.to_string(),
        }),
        webhooks: WebhookDispatcher::new(),
        platform_fee: 0,
    }
}

/// Create a Router with all endpoints (without the IP rate-limit layer,
/// which needs connection info that `oneshot` requests do not carry).
pub fn test_app(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/internal/gateway/callback",
            post(paybridge::handlers::internal::gateway_callback),
        )
        .merge(paybridge::handlers::merchant::router(state.clone()))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

/// Create a test project with a webhook URL.
pub fn create_test_project(
    conn: &rusqlite::Connection,
    slug: &str,
    webhook_url: Option<&str>,
) -> Project {
    let input = CreateProject {
        name: format!("Test {}", slug),
        app_slug: slug.to_string(),
        webhook_url: webhook_url.map(String::from),
        webhook_secret: None,
    };
    queries::create_project(conn, &input).expect("Failed to create test project")
}

/// Create a test project with a webhook signing secret.
pub fn create_test_project_with_secret(
    conn: &rusqlite::Connection,
    slug: &str,
    webhook_url: &str,
    webhook_secret: &str,
) -> Project {
    let input = CreateProject {
        name: format!("Test {}", slug),
        app_slug: slug.to_string(),
        webhook_url: Some(webhook_url.to_string()),
        webhook_secret: Some(webhook_secret.to_string()),
    };
    queries::create_project(conn, &input).expect("Failed to create test project")
}

/// Create an API key for a project, returning the raw key.
pub fn create_test_api_key(conn: &rusqlite::Connection, project_id: &str) -> String {
    let (_, raw) = queries::create_api_key(conn, project_id).expect("Failed to create API key");
    raw
}

/// Insert a transaction row directly (bypassing the gateway).
pub fn insert_test_transaction(
    conn: &rusqlite::Connection,
    project_id: &str,
    status: TransactionStatus,
    amount: i64,
    fee: i64,
) -> Transaction {
    let order_id = format!("test-{}", uuid::Uuid::new_v4().as_simple());
    queries::create_transaction(
        conn,
        &CreateTransaction {
            project_id: project_id.to_string(),
            external_id: format!("INV-{}", &order_id[5..13]),
            gateway_order_id: order_id,
            method: "qris".to_string(),
            status,
            amount,
            fee,
            total_payment: amount,
            payment_number: None,
            expired_at: None,
            paid_at: None,
            gateway_status: None,
            gateway_completed_at: None,
            gateway_raw: None,
        },
    )
    .expect("Failed to insert test transaction")
}

/// Force a transaction's paid_at timestamp (for maturity-window tests).
pub fn set_transaction_paid_at(conn: &rusqlite::Connection, id: &str, paid_at: i64) {
    conn.execute(
        "UPDATE transactions SET paid_at = ?2 WHERE id = ?1",
        params![id, paid_at],
    )
    .expect("Failed to set paid_at");
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Get a past timestamp (hours ago)
pub fn hours_ago(hours: i64) -> i64 {
    now() - hours * 3600
}

// ============ Mock gateway server ============

#[derive(Debug, Clone, Default)]
pub struct MockOrder {
    pub status: String,
    pub amount: i64,
    pub fee: i64,
    pub total_payment: i64,
    pub payment_number: String,
    pub completed_at: Option<String>,
}

#[derive(Clone, Default)]
pub struct MockGateway {
    orders: Arc<Mutex<HashMap<String, MockOrder>>>,
    /// When set, the detail endpoint answers with this HTTP status and a
    /// failed envelope regardless of state.
    pub detail_failure: Arc<AtomicU16>,
}

impl MockGateway {
    pub fn set_status(&self, order_id: &str, status: &str) {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(order_id) {
            order.status = status.to_string();
            order.completed_at = if status == "completed" {
                Some(chrono::Utc::now().to_rfc3339())
            } else {
                None
            };
        }
    }

    pub fn order_ids(&self) -> Vec<String> {
        self.orders.lock().unwrap().keys().cloned().collect()
    }

    pub fn fail_detail_with(&self, http_status: u16) {
        self.detail_failure.store(http_status, Ordering::SeqCst);
    }
}

fn order_payload(order: &MockOrder) -> Value {
    json!({
        "status": order.status,
        "amount": order.amount,
        "fee": order.fee,
        "total_payment": order.total_payment,
        "payment_number": order.payment_number,
        "expired_at": chrono::DateTime::from_timestamp(now() + 3600, 0).unwrap().to_rfc3339(),
        "completed_at": order.completed_at,
    })
}

/// Start a mock gateway HTTP server on an ephemeral port.
/// Returns the base URL and a handle for manipulating order state.
pub async fn start_mock_gateway() -> (String, MockGateway) {
    let gateway = MockGateway::default();

    let create_state = gateway.clone();
    let detail_state = gateway.clone();

    let app = Router::new()
        .route(
            "/api/transactioncreate/{method}",
            post(move |body: axum::extract::Json<Value>| {
                let state = create_state.clone();
                async move {
                    if body.get("project").and_then(Value::as_str) != Some("test-project")
                        || body.get("api_key").and_then(Value::as_str)
                            != Some("test-gateway-key")
                    {
                        return (
                            axum::http::StatusCode::UNAUTHORIZED,
                            axum::Json(json!({"status": "failed", "msg": "invalid credentials"})),
                        );
                    }

                    let order_id = body
                        .get("order_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let amount = body.get("amount").and_then(Value::as_i64).unwrap_or(0);
                    let order = MockOrder {
                        status: "pending".to_string(),
                        amount,
                        fee: 500,
                        total_payment: amount + 500,
                        payment_number: format!(
                            "VA-{}",
                            &order_id[order_id.len().saturating_sub(8)..]
                        ),
                        completed_at: None,
                    };
                    let payload = order_payload(&order);
                    state.orders.lock().unwrap().insert(order_id, order);

                    (
                        axum::http::StatusCode::OK,
                        axum::Json(json!({"status": "success", "data": payload})),
                    )
                }
            }),
        )
        .route(
            "/api/transactiondetail",
            get(
                move |query: axum::extract::Query<HashMap<String, String>>| {
                    let state = detail_state.clone();
                    async move {
                        let forced = state.detail_failure.load(Ordering::SeqCst);
                        if forced != 0 {
                            return (
                                axum::http::StatusCode::from_u16(forced).unwrap(),
                                axum::Json(
                                    json!({"status": "failed", "msg": "forced failure"}),
                                ),
                            );
                        }

                        let order_id = query.get("order_id").cloned().unwrap_or_default();
                        let orders = state.orders.lock().unwrap();
                        match orders.get(&order_id) {
                            Some(order) => (
                                axum::http::StatusCode::OK,
                                axum::Json(
                                    json!({"status": "success", "data": order_payload(order)}),
                                ),
                            ),
                            None => (
                                axum::http::StatusCode::NOT_FOUND,
                                axum::Json(json!({"status": "failed", "msg": "order not found"})),
                            ),
                        }
                    }
                },
            ),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), gateway)
}

// ============ Merchant webhook receiver ============

#[derive(Debug, Clone)]
pub struct ReceivedWebhook {
    pub body: Value,
    pub signature: Option<String>,
}

#[derive(Clone)]
pub struct WebhookReceiver {
    pub events: Arc<Mutex<Vec<ReceivedWebhook>>>,
    /// HTTP status the receiver answers with (default 200)
    pub respond_with: Arc<AtomicU16>,
    pub url: String,
}

impl WebhookReceiver {
    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn events(&self) -> Vec<ReceivedWebhook> {
        self.events.lock().unwrap().clone()
    }

    pub fn set_response_status(&self, status: u16) {
        self.respond_with.store(status, Ordering::SeqCst);
    }
}

/// Start a webhook receiver HTTP server on an ephemeral port.
pub async fn start_webhook_receiver() -> WebhookReceiver {
    let events: Arc<Mutex<Vec<ReceivedWebhook>>> = Arc::new(Mutex::new(Vec::new()));
    let respond_with = Arc::new(AtomicU16::new(200));

    let events_state = events.clone();
    let respond_state = respond_with.clone();

    let app = Router::new().route(
        "/webhook",
        post(
            move |headers: axum::http::HeaderMap, body: axum::extract::Json<Value>| {
                let events = events_state.clone();
                let respond = respond_state.clone();
                async move {
                    let signature = headers
                        .get(paybridge::webhook::SIGNATURE_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    events.lock().unwrap().push(ReceivedWebhook {
                        body: body.0,
                        signature,
                    });
                    (
                        axum::http::StatusCode::from_u16(respond.load(Ordering::SeqCst))
                            .unwrap(),
                        axum::Json(json!({"ok": true})),
                    )
                }
            },
        ),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    WebhookReceiver {
        events,
        respond_with,
        url: format!("http://{}/webhook", addr),
    }
}

//! HTTP-level tests for the merchant transaction API and the gateway
//! callback, driven through the full router with a mock gateway behind it.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::{
    create_test_api_key, create_test_app_state, create_test_project, queries, start_mock_gateway,
    start_webhook_receiver, test_app, AppState, TEST_CALLBACK_TOKEN,
};

use paybridge::models::TransactionStatus;

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn read_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn create_request(api_key: &str, idem_key: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/transactions")
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .header("Idempotency-Key", idem_key)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Full fixture: mock gateway + webhook receiver + project + API key.
async fn setup() -> (AppState, common::WebhookReceiver, common::MockGateway, String) {
    let (gateway_url, gateway) = start_mock_gateway().await;
    let receiver = start_webhook_receiver().await;
    let state = create_test_app_state(&gateway_url);

    let api_key = {
        let conn = state.db.get().unwrap();
        let project = create_test_project(&conn, "api-test", Some(&receiver.url));
        create_test_api_key(&conn, &project.id)
    };

    (state, receiver, gateway, api_key)
}

#[tokio::test]
async fn test_create_transaction_returns_projection() {
    let (state, _receiver, _gateway, api_key) = setup().await;
    let app = test_app(state);

    let body = json!({
        "external_id": "INV-2026-0001",
        "method": "qris",
        "amount": 120000,
        "customer_name": "Budi"
    });
    let response = app
        .oneshot(create_request(&api_key, "idem-1", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = read_json(response).await;
    assert!(json["id"].as_str().unwrap().starts_with("pb_txn_"));
    assert_eq!(json["external_id"], "INV-2026-0001");
    assert_eq!(json["method"], "qris");
    assert_eq!(json["status"], "pending");
    assert_eq!(json["amount"], 120000);
    assert_eq!(json["total_payment"], 120000);
    assert!(json["gateway_order_id"]
        .as_str()
        .unwrap()
        .starts_with("api-test-"));
    assert!(json["payment_number"].as_str().unwrap().starts_with("VA-"));
    assert!(json["expired_at"].is_string());
}

#[tokio::test]
async fn test_create_replay_is_byte_identical() {
    let (state, _receiver, _gateway, api_key) = setup().await;
    let app = test_app(state);

    let body = json!({
        "external_id": "INV-REPLAY",
        "method": "bni_va",
        "amount": 150000
    });

    let first = app
        .clone()
        .oneshot(create_request(&api_key, "idem-replay", &body))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = read_text(first).await;

    let second = app
        .oneshot(create_request(&api_key, "idem-replay", &body))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    let second_body = read_text(second).await;

    assert_eq!(first_body, second_body, "replay must be byte-identical");
}

#[tokio::test]
async fn test_create_reused_key_with_different_payload_conflicts() {
    let (state, _receiver, _gateway, api_key) = setup().await;
    let app = test_app(state);

    let body = json!({"external_id": "INV-A", "method": "qris", "amount": 50000});
    let response = app
        .clone()
        .oneshot(create_request(&api_key, "idem-conflict", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let different = json!({"external_id": "INV-B", "method": "qris", "amount": 60000});
    let response = app
        .oneshot(create_request(&api_key, "idem-conflict", &different))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_in_flight_key_conflicts() {
    let (state, _receiver, _gateway, api_key) = setup().await;

    // Reserve the key as another in-flight request would, with the hash the
    // HTTP path will compute for this payload.
    let request = paybridge::handlers::merchant::CreateTransactionRequest {
        external_id: "INV-FLIGHT".to_string(),
        method: "qris".to_string(),
        amount: 75000,
        customer_name: None,
    };
    {
        let conn = state.db.get().unwrap();
        let project = queries::get_project_by_api_key(&conn, &api_key).unwrap().unwrap();
        let hash = paybridge::idempotency::hash_request(&request).unwrap();
        match paybridge::idempotency::begin(&conn, &project.id, "idem-flight", &hash).unwrap() {
            paybridge::idempotency::IdempotencyOutcome::New(_) => {}
            other => panic!("expected New, got {:?}", other),
        }
    }

    let app = test_app(state);
    let body = json!({"external_id": "INV-FLIGHT", "method": "qris", "amount": 75000});
    let response = app
        .oneshot(create_request(&api_key, "idem-flight", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_requires_idempotency_key() {
    let (state, _receiver, _gateway, api_key) = setup().await;
    let app = test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/transactions")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"external_id": "INV-X", "method": "qris", "amount": 1000}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_validates_payload() {
    let (state, _receiver, _gateway, api_key) = setup().await;
    let app = test_app(state);

    for (idem, body) in [
        ("v-1", json!({"external_id": "ab", "method": "qris", "amount": 1000})),
        ("v-2", json!({"external_id": "INV-1", "method": "cash", "amount": 1000})),
        ("v-3", json!({"external_id": "INV-1", "method": "qris", "amount": 0})),
        ("v-4", json!({"external_id": "INV-1", "method": "qris", "amount": -5})),
    ] {
        let response = app
            .clone()
            .oneshot(create_request(&api_key, idem, &body))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "payload {} should be rejected",
            body
        );
    }
}

#[tokio::test]
async fn test_create_requires_valid_api_key() {
    let (state, _receiver, _gateway, _api_key) = setup().await;
    let app = test_app(state);

    let body = json!({"external_id": "INV-1", "method": "qris", "amount": 1000});
    let response = app
        .clone()
        .oneshot(create_request("pb_live_wrong", "idem-x", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Missing Authorization entirely
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/transactions")
                .header("Content-Type", "application/json")
                .header("Idempotency-Key", "idem-y")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoked_key_and_inactive_project_are_unauthorized() {
    let (state, _receiver, _gateway, api_key) = setup().await;

    // Rotating the key revokes the old one.
    let (project_id, new_key) = {
        let conn = state.db.get().unwrap();
        let project = queries::get_project_by_api_key(&conn, &api_key).unwrap().unwrap();
        let new_key = create_test_api_key(&conn, &project.id);
        (project.id, new_key)
    };

    let app = test_app(state.clone());
    let body = json!({"external_id": "INV-1", "method": "qris", "amount": 1000});
    let response = app
        .clone()
        .oneshot(create_request(&api_key, "idem-old", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Deactivating the project kills the new key too.
    {
        let conn = state.db.get().unwrap();
        queries::set_project_active(&conn, &project_id, false).unwrap();
    }
    let response = app
        .oneshot(create_request(&new_key, "idem-new", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_gateway_failure_returns_502_and_persists_nothing() {
    // Point the gateway client at a dead port.
    let receiver = start_webhook_receiver().await;
    let state = create_test_app_state("http://127.0.0.1:9");
    let api_key = {
        let conn = state.db.get().unwrap();
        let project = create_test_project(&conn, "dead-gw", Some(&receiver.url));
        create_test_api_key(&conn, &project.id)
    };

    let app = test_app(state.clone());
    let body = json!({"external_id": "INV-GW", "method": "qris", "amount": 10000});
    let response = app
        .oneshot(create_request(&api_key, "idem-gw", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let conn = state.db.get().unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0, "no local transaction may be persisted on gateway failure");
}

#[tokio::test]
async fn test_create_rate_limited_with_headers() {
    let (state, _receiver, _gateway, api_key) = setup().await;

    // Fill the current fixed window to the limit.
    {
        let conn = state.db.get().unwrap();
        let project = queries::get_project_by_api_key(&conn, &api_key).unwrap().unwrap();
        let window_start = (common::now() / 60) * 60;
        for _ in 0..60 {
            queries::increment_rate_limit_window(
                &conn,
                &project.id,
                "transactions:create",
                window_start,
            )
            .unwrap();
        }
    }

    let app = test_app(state);
    let body = json!({"external_id": "INV-RL", "method": "qris", "amount": 1000});
    let response = app
        .oneshot(create_request(&api_key, "idem-rl", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get("x-ratelimit-limit").unwrap(),
        "60"
    );
    assert_eq!(
        response.headers().get("x-ratelimit-remaining").unwrap(),
        "0"
    );
    assert!(response.headers().contains_key("x-ratelimit-reset"));
}

#[tokio::test]
async fn test_get_and_list_transactions() {
    let (state, _receiver, _gateway, api_key) = setup().await;
    let app = test_app(state.clone());

    for (i, method) in ["qris", "bni_va", "paypal"].iter().enumerate() {
        let body = json!({
            "external_id": format!("INV-L{}", i),
            "method": method,
            "amount": 50000 + i as i64
        });
        let response = app
            .clone()
            .oneshot(create_request(&api_key, &format!("idem-l{}", i), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    // List all
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/transactions?per_page=2&page=1")
                .header("Authorization", format!("Bearer {}", api_key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["items"].as_array().unwrap().len(), 2);
    assert_eq!(json["pagination"]["total"], 3);
    assert_eq!(json["pagination"]["page"], 1);
    assert_eq!(json["pagination"]["per_page"], 2);

    // Filter by status
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/transactions?status=pending")
                .header("Authorization", format!("Bearer {}", api_key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = read_json(response).await;
    assert_eq!(json["pagination"]["total"], 3);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/transactions?status=paid")
                .header("Authorization", format!("Bearer {}", api_key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = read_json(response).await;
    assert_eq!(json["pagination"]["total"], 0);

    // Unknown status filter is rejected
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/transactions?status=unknown")
                .header("Authorization", format!("Bearer {}", api_key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Get one by id
    let id = {
        let conn = state.db.get().unwrap();
        let project = queries::get_project_by_api_key(&conn, &api_key).unwrap().unwrap();
        let (items, _) =
            queries::list_transactions_paginated(&conn, &project.id, None, 10, 0).unwrap();
        items[0].id.clone()
    };
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/transactions/{}", id))
                .header("Authorization", format!("Bearer {}", api_key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["id"], id);
    assert!(json["payment_number"].is_string());

    // Unknown id is 404
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/transactions/pb_txn_00000000000000000000000000000000")
                .header("Authorization", format!("Bearer {}", api_key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_transactions_are_tenant_scoped() {
    let (state, _receiver, _gateway, api_key) = setup().await;
    let app = test_app(state.clone());

    let body = json!({"external_id": "INV-SCOPE", "method": "qris", "amount": 10000});
    let response = app
        .clone()
        .oneshot(create_request(&api_key, "idem-scope", &body))
        .await
        .unwrap();
    let created = read_json(response).await;

    // A second tenant must not see the first tenant's transaction.
    let other_key = {
        let conn = state.db.get().unwrap();
        let other = create_test_project(&conn, "other-tenant", None);
        create_test_api_key(&conn, &other.id)
    };
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/transactions/{}", created["id"].as_str().unwrap()))
                .header("Authorization", format!("Bearer {}", other_key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sync_reconciles_and_fires_webhook() {
    let (state, receiver, gateway, api_key) = setup().await;
    let app = test_app(state.clone());

    let body = json!({"external_id": "INV-SYNC", "method": "qris", "amount": 130000});
    let response = app
        .clone()
        .oneshot(create_request(&api_key, "idem-sync", &body))
        .await
        .unwrap();
    let created = read_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    let order_id = created["gateway_order_id"].as_str().unwrap().to_string();

    gateway.set_status(&order_id, "completed");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/transactions/{}/sync", id))
                .header("Authorization", format!("Bearer {}", api_key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["id"], id.as_str());
    assert_eq!(json["status"], "paid");
    assert_eq!(json["gateway_status"], "completed");
    assert!(json["paid_at"].is_string());

    assert_eq!(receiver.event_count(), 1);
}

#[tokio::test]
async fn test_callback_token_and_flow() {
    let (state, receiver, gateway, api_key) = setup().await;
    let app = test_app(state.clone());

    let body = json!({"external_id": "INV-CB", "method": "qris", "amount": 120000});
    let response = app
        .clone()
        .oneshot(create_request(&api_key, "idem-cb", &body))
        .await
        .unwrap();
    let created = read_json(response).await;
    let order_id = created["gateway_order_id"].as_str().unwrap().to_string();

    gateway.set_status(&order_id, "completed");

    // Wrong token
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/internal/gateway/callback?token=wrong")
                .header("Content-Type", "application/json")
                .body(Body::from(json!({"order_id": order_id}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Missing order_id
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!(
                    "/api/v1/internal/gateway/callback?token={}",
                    TEST_CALLBACK_TOKEN
                ))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({"status": "completed"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown order id
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!(
                    "/api/v1/internal/gateway/callback?token={}",
                    TEST_CALLBACK_TOKEN
                ))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({"order_id": "missing-order"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Valid callback reconciles and fires the webhook once.
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!(
                    "/api/v1/internal/gateway/callback?token={}",
                    TEST_CALLBACK_TOKEN
                ))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"order_id": order_id, "status": "completed"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["status"], "paid");

    assert_eq!(receiver.event_count(), 1);

    let conn = state.db.get().unwrap();
    let stored = queries::get_transaction_by_gateway_order_id(&conn, &order_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Paid);
}

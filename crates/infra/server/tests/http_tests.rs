use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use patron_adapter_memory::MemoryAdapter;
use patron_mailer::{DeliveryMetrics, MailDispatcher, MemoryTransport, RetryPolicy, SiteContext};
use patron_oauth::IdentityService;
use patron_server::{AppState, build_router};
use patron_webhooks::{
    EventHandlers, InMemoryDeadLetterStore, InMemoryProcessor, WebhookReceiver, WebhookRouter,
    WebhookSigner,
};

const SECRET: &str = "whsec_http_test";

struct TestApp {
    app: Router,
    storage: MemoryAdapter,
    transport: Arc<MemoryTransport>,
}

fn test_app(admin_token: Option<&str>) -> TestApp {
    let storage = MemoryAdapter::new();
    let transport = Arc::new(MemoryTransport::new());
    let metrics = Arc::new(DeliveryMetrics::new());
    let dead_letters = Arc::new(InMemoryDeadLetterStore::new());

    let handlers = EventHandlers::new(
        Arc::new(storage.clone()),
        Arc::new(InMemoryProcessor::new()),
        MailDispatcher::new(transport.clone(), metrics.clone())
            .with_policy(RetryPolicy::immediate(3)),
        SiteContext::new("Patron", "https://patron.example.org"),
    );
    let webhooks = WebhookRouter::new(WebhookReceiver::new(SECRET), handlers)
        .with_dead_letters(dead_letters.clone());

    let state = AppState {
        webhooks: Arc::new(webhooks),
        identity: IdentityService::new(Arc::new(storage.clone())),
        metrics,
        dead_letters,
        admin_token: admin_token.map(str::to_string),
    };

    TestApp {
        app: build_router(state),
        storage,
        transport,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn webhook_request(body: &[u8], signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    builder.body(Body::from(body.to_vec())).unwrap()
}

fn sign_in_request(provider: &str, profile: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/auth/callback/{provider}"))
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&profile).unwrap()))
        .unwrap()
}

fn signed(body: &[u8]) -> String {
    WebhookSigner::new(SECRET).sign_header(chrono::Utc::now().timestamp(), body)
}

#[tokio::test]
async fn health_check() {
    let t = test_app(None);
    let response = t
        .app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn verified_donation_is_acknowledged() {
    let t = test_app(None);
    let body = serde_json::to_vec(&json!({
        "id": "evt_http_1",
        "type": "payment_intent.succeeded",
        "data": {"object": {
            "id": "pi_1",
            "amount": 5000,
            "amount_received": 5000,
            "currency": "usd",
            "receipt_email": "donor@example.org"
        }}
    }))
    .unwrap();

    let response = t
        .app
        .oneshot(webhook_request(&body, Some(signed(&body))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["received"], true);
    assert_eq!(json["outcome"]["result"], "handled");
    assert_eq!(json["outcome"]["notification"]["status"], "sent");
    assert_eq!(t.storage.donation_count().await, 1);
    assert_eq!(t.transport.sent().len(), 1);
}

#[tokio::test]
async fn unknown_event_is_acknowledged() {
    let t = test_app(None);
    let body = br#"{"id":"evt_2","type":"customer.created","data":{"object":{}}}"#;

    let response = t
        .app
        .oneshot(webhook_request(body, Some(signed(body))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["outcome"]["result"], "ignored");
    assert_eq!(json["outcome"]["event_type"], "customer.created");
}

#[tokio::test]
async fn unsigned_request_is_rejected() {
    let t = test_app(None);
    let body = br#"{"id":"evt_3","type":"payment_intent.succeeded","data":{"object":{}}}"#;

    let response = t.app.oneshot(webhook_request(body, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(t.storage.write_count(), 0);
    assert_eq!(t.transport.calls(), 0);
}

#[tokio::test]
async fn forged_signature_is_rejected() {
    let t = test_app(None);
    let body = br#"{"id":"evt_4","type":"payment_intent.succeeded","data":{"object":{}}}"#;
    let forged = WebhookSigner::new("wrong").sign_header(chrono::Utc::now().timestamp(), body);

    let response = t
        .app
        .oneshot(webhook_request(body, Some(forged)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Invalid signature");
}

#[tokio::test]
async fn malformed_but_signed_body_is_rejected() {
    let t = test_app(None);
    let body = b"{not json";

    let response = t
        .app
        .oneshot(webhook_request(body, Some(signed(body))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn email_metrics_snapshot() {
    let t = test_app(None);
    let response = t
        .app
        .oneshot(
            Request::get("/admin/email-metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total_sent"], 0);
    assert_eq!(json["total_failed"], 0);
    assert_eq!(json["delivery_rate"], 100.0);
}

#[tokio::test]
async fn dead_letters_capture_persistence_failures() {
    let t = test_app(None);
    t.storage.set_fail_writes(true);
    let body = serde_json::to_vec(&json!({
        "id": "evt_dl",
        "type": "payment_intent.succeeded",
        "data": {"object": {"id": "pi_9", "amount": 100, "currency": "usd", "receipt_email": "a@b.org"}}
    }))
    .unwrap();

    let response = t
        .app
        .clone()
        .oneshot(webhook_request(&body, Some(signed(&body))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["outcome"]["result"], "degraded");

    let response = t
        .app
        .oneshot(
            Request::get("/admin/dead-letters")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json.as_array().map(Vec::len), Some(1));
    assert_eq!(json[0]["event_id"], "evt_dl");
    assert_eq!(json[0]["stage"], "persistence");
}

#[tokio::test]
async fn admin_routes_require_token_when_configured() {
    let t = test_app(Some("s3cret"));

    let response = t
        .app
        .clone()
        .oneshot(
            Request::get("/admin/email-metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = t
        .app
        .oneshot(
            Request::get("/admin/email-metrics")
                .header("authorization", "Bearer s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_token_of_same_length_is_rejected() {
    let t = test_app(Some("s3cret"));

    let response = t
        .app
        .oneshot(
            Request::get("/admin/dead-letters")
                .header("authorization", "Bearer s3creT")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn provider_sign_in_creates_user_and_session() {
    let t = test_app(None);
    let profile = json!({
        "provider": "ignored",
        "id": "gh_42",
        "email": "Ada@Example.com",
        "email_verified": true,
        "name": "Ada Lovelace"
    });

    let response = t
        .app
        .clone()
        .oneshot(sign_in_request("github", profile.clone(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["is_new_user"], true);
    assert_eq!(json["user"]["email"], "ada@example.com");
    assert_eq!(json["session"]["user_id"], json["user"]["id"]);
    assert_eq!(t.storage.user_count().await, 1);

    let response = t
        .app
        .oneshot(sign_in_request("github", profile, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["is_new_user"], false);
    assert_eq!(t.storage.user_count().await, 1);
}

#[tokio::test]
async fn provider_sign_in_without_email_is_unprocessable() {
    let t = test_app(None);

    let response = t
        .app
        .oneshot(sign_in_request("github", json!({"provider": "github", "id": "gh_7"}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Missing required field: email");
    assert_eq!(t.storage.user_count().await, 0);
}

#[tokio::test]
async fn provider_sign_in_requires_token_when_configured() {
    let t = test_app(Some("s3cret"));
    let profile = json!({"provider": "github", "id": "gh_9", "email": "bo@example.com"});

    let response = t
        .app
        .clone()
        .oneshot(sign_in_request("github", profile.clone(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = t
        .app
        .oneshot(sign_in_request("github", profile, Some("s3cret")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

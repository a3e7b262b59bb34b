use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use tourdesk_api::{
    app,
    middleware::Claims,
    state::{AppState, AuthConfig},
    webhooks::SIGNATURE_HEADER,
};
use tourdesk_booking::{
    BookingManager, CatalogService, InMemoryStore, LifecycleRules, LogNotifier, PaymentOrchestrator, Role,
    SandboxGateway,
};
use tourdesk_catalog::PricingCalculator;
use tourdesk_core::{Clock, FixedClock, WebhookVerifier};
use tower::ServiceExt;

const JWT_SECRET: &str = "test-jwt-secret";
const WEBHOOK_SECRET: &str = "whsec_test";

struct Harness {
    app: Router,
    clock: Arc<FixedClock>,
}

fn harness() -> Harness {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap()));
    let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
    let pricing = PricingCalculator::default();

    let bookings = Arc::new(BookingManager::new(
        store.clone(),
        store.clone(),
        Arc::new(LogNotifier),
        clock.clone(),
        pricing.clone(),
        LifecycleRules::default(),
    ));
    let gateway = Arc::new(SandboxGateway::new(WebhookVerifier::new(WEBHOOK_SECRET, 300), clock.clone()));

    let state = AppState {
        catalog: Arc::new(CatalogService::new(store.clone(), clock.clone(), pricing)),
        payments: Arc::new(PaymentOrchestrator::new(gateway, bookings.clone())),
        bookings,
        auth: AuthConfig {
            secret: JWT_SECRET.to_string(),
        },
        default_currency: "USD".to_string(),
    };

    Harness { app: app(state), clock }
}

fn token(sub: &str, role: Role) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        email: Some(format!("{}@example.com", sub)),
        role,
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let request = match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn sign(body: &[u8], timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(body);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

async fn send_webhook(app: &Router, body: &[u8], signature: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body.to_vec()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn succeeded_event(intent_id: &str, booking_id: &str, amount: i64) -> Vec<u8> {
    json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": {
            "object": {
                "id": intent_id,
                "amount": amount,
                "amount_received": amount,
                "metadata": { "booking_id": booking_id },
                "payment_method_types": ["card"]
            }
        }
    })
    .to_string()
    .into_bytes()
}

/// Creates an item with one single-day slot on 2030-06-10 and returns its id.
async fn seed_item(app: &Router, base_price: i64, capacity: u32) -> String {
    let admin = token("ops", Role::Admin);
    let (status, item) = send(
        app,
        Method::POST,
        "/v1/admin/catalog",
        Some(&admin),
        Some(json!({
            "kind": "tour",
            "title": "Ha Long Bay cruise",
            "base_price": base_price,
            "capacity_per_slot": capacity,
            "duration_days": 2
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let item_id = item["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        app,
        Method::POST,
        &format!("/v1/admin/catalog/{}/slots", item_id),
        Some(&admin),
        Some(json!({ "start_date": "2030-06-10", "end_date": "2030-06-10" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    item_id
}

fn booking_body(item_id: &str, travelers: Value) -> Value {
    json!({
        "catalog_item_id": item_id,
        "date": "2030-06-10",
        "travelers": travelers,
        "emergency_contact": { "name": "Lan", "phone": "+84 90 000 0000", "relationship": "sister" }
    })
}

#[tokio::test]
async fn test_book_pay_and_confirm_flow() {
    let h = harness();
    let item_id = seed_item(&h.app, 5000, 10).await;
    let alice = token("alice", Role::Customer);

    let (status, availability) = send(
        &h.app,
        Method::GET,
        &format!("/v1/catalog/{}/availability?date=2030-06-10&party_size=3", item_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(availability["available"], json!(true));

    let (status, quote) = send(
        &h.app,
        Method::GET,
        &format!("/v1/catalog/{}/quote?date=2030-06-10&party_size=3", item_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["total"], json!(16500));

    let travelers = json!([
        { "name": "Alice", "type": "adult" },
        { "name": "Bob", "type": "adult" },
        { "name": "Chi", "type": "child", "age": 7 }
    ]);
    let (status, booking) = send(
        &h.app,
        Method::POST,
        "/v1/bookings",
        Some(&alice),
        Some(booking_body(&item_id, travelers)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], json!("pending"));
    assert_eq!(booking["pricing"]["total_amount"], json!(16500));
    assert_eq!(booking["end_date"], json!("2030-06-11"));
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let (status, intent) = send(
        &h.app,
        Method::POST,
        &format!("/v1/bookings/{}/payment-intent", booking_id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(intent["amount"], json!(16500));
    let intent_id = intent["intent_id"].as_str().unwrap().to_string();

    let body = succeeded_event(&intent_id, &booking_id, 16500);
    let signature = sign(&body, h.clock.now().timestamp());
    let (status, first) = send_webhook(&h.app, &body, &signature).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["result"], json!("confirmed"));

    let (status, again) = send_webhook(&h.app, &body, &signature).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["result"], json!("duplicate"));

    let (status, stored) = send(
        &h.app,
        Method::GET,
        &format!("/v1/bookings/{}", booking_id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["status"], json!("confirmed"));
    assert_eq!(stored["payment"]["status"], json!("paid"));
    assert_eq!(stored["payment"]["paid_amount"], json!(16500));
    assert_eq!(stored["notes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_authentication_and_roles() {
    let h = harness();
    let alice = token("alice", Role::Customer);

    let (status, _) = send(&h.app, Method::GET, "/v1/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.app, Method::GET, "/v1/bookings", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &h.app,
        Method::POST,
        "/v1/admin/catalog",
        Some(&alice),
        Some(json!({ "kind": "tour", "title": "x", "base_price": 1, "capacity_per_slot": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, list) = send(&h.app, Method::GET, "/v1/bookings", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_capacity_and_ownership_errors() {
    let h = harness();
    let item_id = seed_item(&h.app, 10000, 2).await;
    let alice = token("alice", Role::Customer);
    let mallory = token("mallory", Role::Customer);

    let mut first_id = String::new();
    for name in ["A", "B"] {
        let (status, booking) = send(
            &h.app,
            Method::POST,
            "/v1/bookings",
            Some(&alice),
            Some(booking_body(&item_id, json!([{ "name": name, "type": "adult" }]))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        if first_id.is_empty() {
            first_id = booking["id"].as_str().unwrap().to_string();
        }
    }

    let (status, err) = send(
        &h.app,
        Method::POST,
        "/v1/bookings",
        Some(&alice),
        Some(booking_body(&item_id, json!([{ "name": "C", "type": "adult" }]))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], json!("CAPACITY_EXCEEDED"));

    let (status, err) = send(
        &h.app,
        Method::GET,
        &format!("/v1/bookings/{}", first_id),
        Some(&mallory),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn test_cancellation_window_over_http() {
    let h = harness();
    let item_id = seed_item(&h.app, 5000, 10).await;
    let alice = token("alice", Role::Customer);

    let (_, booking) = send(
        &h.app,
        Method::POST,
        "/v1/bookings",
        Some(&alice),
        Some(booking_body(&item_id, json!([{ "name": "A", "type": "adult" }, { "name": "B", "type": "adult" }]))),
    )
    .await;
    let booking_id = booking["id"].as_str().unwrap().to_string();
    let starts_at = Utc.with_ymd_and_hms(2030, 6, 10, 0, 0, 0).unwrap();

    h.clock.set(starts_at - Duration::hours(10));
    let (status, err) = send(
        &h.app,
        Method::POST,
        &format!("/v1/bookings/{}/cancel", booking_id),
        Some(&alice),
        Some(json!({ "reason": "too late" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], json!("POLICY_VIOLATION"));

    h.clock.set(starts_at - Duration::hours(48));
    let (status, cancelled) = send(
        &h.app,
        Method::POST,
        &format!("/v1/bookings/{}/cancel", booking_id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], json!("cancelled"));

    let (_, availability) = send(
        &h.app,
        Method::GET,
        &format!("/v1/catalog/{}/availability?date=2030-06-10&party_size=10", item_id),
        None,
        None,
    )
    .await;
    assert_eq!(availability["available"], json!(true));

    let (status, err) = send(
        &h.app,
        Method::POST,
        &format!("/v1/bookings/{}/cancel", booking_id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], json!("INVALID_STATE"));
}

#[tokio::test]
async fn test_rejects_invalid_input_and_signatures() {
    let h = harness();
    let item_id = seed_item(&h.app, 5000, 10).await;
    let alice = token("alice", Role::Customer);

    let (status, err) = send(
        &h.app,
        Method::POST,
        "/v1/bookings",
        Some(&alice),
        Some(booking_body(&item_id, json!([{ "name": "Kid", "type": "child", "age": 6 }]))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], json!("VALIDATION_ERROR"));

    let (status, err) = send(
        &h.app,
        Method::POST,
        "/v1/bookings",
        Some(&alice),
        Some(json!({ "catalog_item_id": item_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], json!("VALIDATION_ERROR"));

    let body = succeeded_event("pi_1", &uuid::Uuid::new_v4().to_string(), 100);
    let (status, err) = send_webhook(&h.app, &body, "t=1,v1=deadbeef").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], json!("INVALID_SIGNATURE"));

    let past = NaiveDate::from_ymd_opt(2030, 5, 1).unwrap();
    let (status, _) = send(
        &h.app,
        Method::POST,
        "/v1/bookings",
        Some(&alice),
        Some(json!({
            "catalog_item_id": item_id,
            "date": past,
            "travelers": [{ "name": "A", "type": "adult" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

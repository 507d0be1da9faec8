use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use wingdesk_api::{app, middleware::StaffClaims, AppState, AuthConfig};
use wingdesk_core::{Agent, DebtType, Flight, FlightGuide, MemoryHistorySink, MemoryRepository};
use wingdesk_store::BusinessRules;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    repo: MemoryRepository,
    flight_id: Uuid,
    agent_id: Uuid,
}

async fn setup(balance: i64) -> TestApp {
    let repo = MemoryRepository::new();
    let now = Utc::now();
    let guide = FlightGuide {
        id: Uuid::new_v4(),
        carrier_code: "WZ".to_string(),
        luggage_fee: 250,
    };
    let flight = Flight {
        id: Uuid::new_v4(),
        guide_id: guide.id,
        from_airport_id: Uuid::new_v4(),
        to_airport_id: Uuid::new_v4(),
        departure_at: now + Duration::days(5),
        arrival_at: now + Duration::days(5) + Duration::hours(3),
        price: 1200,
        currency: "USD".to_string(),
        total_seats: 6,
        left_seats: 6,
        on_sale: now - Duration::hours(1),
        created_by: Uuid::new_v4(),
        created_at: now,
        deleted_at: None,
    };
    let agent = Agent {
        id: Uuid::new_v4(),
        name: "Steppe Travel".to_string(),
        balance,
        discount_id: None,
        is_on_credit: false,
        block_date: None,
    };
    let (flight_id, agent_id) = (flight.id, agent.id);
    repo.seed_guide(guide).await;
    repo.seed_flight(flight).await;
    repo.seed_agent(agent).await;

    let state = AppState::new(
        Arc::new(repo.clone()),
        Arc::new(MemoryHistorySink::new()),
        &BusinessRules::default(),
        AuthConfig {
            secret: SECRET.to_string(),
            expiration: 3600,
        },
    );
    TestApp {
        router: app(state),
        repo,
        flight_id,
        agent_id,
    }
}

fn token(permissions: &[&str]) -> String {
    let claims = StaffClaims {
        sub: Uuid::new_v4(),
        email: Some("desk@wingdesk.test".to_string()),
        role: "AGENT_MANAGER".to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn sale_body(agent_id: Uuid) -> Value {
    json!({
        "agent_id": agent_id,
        "passenger": {
            "first_name": "Dana",
            "last_name": "Omarova",
            "document_number": "N7654321",
            "birth_date": "1988-02-14",
            "phone": null
        },
        "luggage": true
    })
}

#[tokio::test]
async fn test_health_is_open() {
    let t = setup(0).await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = t.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let t = setup(5000).await;
    let uri = format!("/v1/flights/{}/tickets", t.flight_id);
    let (status, body) = send(&t.router, post(&uri, None, sale_body(t.agent_id))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "authentication");
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let t = setup(5000).await;
    let uri = format!("/v1/flights/{}/tickets", t.flight_id);
    let read_only = token(&["flights:read"]);
    let (status, _) = send(&t.router, post(&uri, Some(&read_only), sale_body(t.agent_id))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let state = t.repo.snapshot().await;
    assert!(state.tickets.is_empty());
}

#[tokio::test]
async fn test_ticket_sale_charges_agent() {
    let t = setup(5000).await;
    let uri = format!("/v1/flights/{}/tickets", t.flight_id);
    let staff = token(&["tickets:write", "balance:read"]);

    let (status, ticket) = send(&t.router, post(&uri, Some(&staff), sale_body(t.agent_id))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ticket["price"], 1450);
    assert_eq!(ticket["luggage"], true);

    let state = t.repo.snapshot().await;
    assert_eq!(state.agents[&t.agent_id].balance, 3550);
    assert_eq!(state.flights[&t.flight_id].left_seats, 5);
    let debts = state.debts_for(t.agent_id);
    assert_eq!(debts.len(), 1);
    assert_eq!(debts[0].debt_type, DebtType::Purchase);

    let debts_uri = format!("/v1/agents/{}/debts", t.agent_id);
    let req = Request::builder()
        .uri(debts_uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", staff))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_insufficient_balance_maps_to_402() {
    let t = setup(1000).await;
    let uri = format!("/v1/flights/{}/tickets", t.flight_id);
    let staff = token(&["tickets:write"]);

    let (status, body) = send(&t.router, post(&uri, Some(&staff), sale_body(t.agent_id))).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["kind"], "insufficient_balance");

    let state = t.repo.snapshot().await;
    assert_eq!(state.agents[&t.agent_id].balance, 1000);
    assert_eq!(state.flights[&t.flight_id].left_seats, 6);
}

#[tokio::test]
async fn test_unknown_flight_maps_to_404() {
    let t = setup(5000).await;
    let uri = format!("/v1/flights/{}/tickets", Uuid::new_v4());
    let staff = token(&["tickets:write"]);

    let (status, body) = send(&t.router, post(&uri, Some(&staff), sale_body(t.agent_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_second_booking_conflicts() {
    let t = setup(5000).await;
    let uri = format!("/v1/flights/{}/bookings", t.flight_id);
    let staff = token(&["bookings:write"]);
    let body = json!({ "agent_id": t.agent_id, "hard_block": 2, "soft_block": 1 });

    let (status, booking) = send(&t.router, post(&uri, Some(&staff), body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["hard_block"], 2);

    let (status, err) = send(&t.router, post(&uri, Some(&staff), body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["kind"], "conflict");

    let state = t.repo.snapshot().await;
    assert_eq!(state.flights[&t.flight_id].left_seats, 3);
}

#[tokio::test]
async fn test_cancel_twice_is_a_state_error() {
    let t = setup(5000).await;
    let staff = token(&["tickets:write", "tickets:cancel"]);
    let uri = format!("/v1/flights/{}/tickets", t.flight_id);
    let (_, ticket) = send(&t.router, post(&uri, Some(&staff), sale_body(t.agent_id))).await;
    let ticket_id = ticket["id"].as_str().unwrap().to_string();

    let cancel_uri = format!("/v1/tickets/{}/cancel", ticket_id);
    let body = json!({ "fine": 200, "comment": "no-show" });
    let (status, cancelled) = send(&t.router, post(&cancel_uri, Some(&staff), body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, _) = send(&t.router, post(&cancel_uri, Some(&staff), body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let state = t.repo.snapshot().await;
    assert_eq!(state.agents[&t.agent_id].balance, 5000 - 200);
    assert_eq!(state.flights[&t.flight_id].left_seats, 6);
}

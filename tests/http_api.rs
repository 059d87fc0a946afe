//! Integration tests for `HttpBookingApi`.
//!
//! Each test spins up an Axum stub of the booking API on a random port and
//! exercises the real HTTP contract: routes, envelopes, headers, and error
//! statuses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use parking_lot::Mutex;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use booking_intake::api::{BookingApi, HttpBookingApi};
use booking_intake::booking::{BookingSession, BookingStep, ResourceKind};
use booking_intake::config::{ApiConfig, SessionConfig};
use booking_intake::error::{ApiError, ErrorKind, classify};

const TOKEN: &str = "test-token";

/// What the stub saw, for assertions.
#[derive(Default)]
struct Stub {
    /// Path plus selected headers of every request, in order.
    requests: Mutex<Vec<(String, Option<String>, Option<String>)>>,
    last_client: Mutex<Option<Value>>,
    last_booking: Mutex<Option<Value>>,
}

impl Stub {
    fn record(&self, path: &str, headers: &HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.requests
            .lock()
            .push((path.to_string(), header("authorization"), header("x-request-id")));
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {TOKEN}"))
    }
}

type Shared = Arc<Stub>;

async fn services(State(stub): State<Shared>, headers: HeaderMap) -> Response {
    stub.record("/services", &headers);
    if !Stub::authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "token expired"})))
            .into_response();
    }
    Json(json!({
        "success": true,
        "data": [
            {"_id": "s1", "name": "Initial consultation", "price": "150.00",
             "durationMinutes": 60, "category": "fraud", "isActive": true},
            {"_id": "s2", "name": "Retired service", "price": "90.00",
             "duration": 30, "isActive": false}
        ]
    }))
    .into_response()
}

async fn availability(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    stub.record("/availability", &headers);
    let Some(service_id) = params.get("serviceId") else {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "serviceId is required"})))
            .into_response();
    };
    if service_id == "boom" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response();
    }
    if service_id == "slow" {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    match params.get("date") {
        None => Json(json!(["2025-06-02", "2025-06-03"])).into_response(),
        Some(date) if date == "2025-06-02" => Json(json!([
            {"id": "t2", "startTime": "11:00", "endTime": "12:00", "durationMinutes": 60},
            {"id": "t1", "startTime": "10:00", "endTime": "11:00", "durationMinutes": 60},
            {"id": "t3", "startTime": "09:00", "endTime": "10:00", "durationMinutes": 60,
             "available": false}
        ]))
        .into_response(),
        Some(_) => Json(json!([])).into_response(),
    }
}

async fn clients(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    stub.record("/clients", &headers);
    *stub.last_client.lock() = Some(body.clone());
    if body["email"] == "taken@example.com" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"errors": [{"field": "email", "message": "already registered"}]})),
        )
            .into_response();
    }
    (StatusCode::CREATED, Json(json!({"_id": "c1"}))).into_response()
}

async fn bookings(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    stub.record("/bookings", &headers);
    *stub.last_booking.lock() = Some(body.clone());
    if body["timeSlotId"] == "t2" {
        return (StatusCode::CONFLICT, Json(json!({"message": "slot taken"}))).into_response();
    }
    (
        StatusCode::CREATED,
        Json(json!({"data": {"_id": "b1", "reference": "BK-2025-0001"}})),
    )
        .into_response()
}

async fn health(State(stub): State<Shared>, headers: HeaderMap) -> &'static str {
    stub.record("/health", &headers);
    "ok"
}

/// Start the stub on a random port, return (base URL, stub).
async fn start_server() -> (String, Shared) {
    let stub = Shared::default();
    let app = Router::new()
        .route("/api/services", get(services))
        .route("/api/availability", get(availability))
        .route("/api/clients", post(clients))
        .route("/api/bookings", post(bookings))
        .route("/api/health", get(health))
        .with_state(Arc::clone(&stub));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://127.0.0.1:{port}/api/"), stub)
}

fn client(base_url: &str, token: Option<&str>) -> HttpBookingApi {
    let mut config = ApiConfig::new(base_url);
    config.auth_token = token.map(|t| SecretString::from(t.to_string()));
    config.request_timeout = Duration::from_secs(5);
    HttpBookingApi::new(&config).unwrap()
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

#[tokio::test]
async fn reads_wrapped_and_bare_payloads() {
    let (url, stub) = start_server().await;
    let api = client(&url, Some(TOKEN));

    let services = api.list_services().await.unwrap();
    assert_eq!(services.len(), 2);
    assert_eq!(services[0].id, "s1");
    assert!(!services[1].is_active);
    assert_eq!(services[1].duration_minutes, 30);

    let dates = api.list_available_dates("s1").await.unwrap();
    assert_eq!(dates, vec![date(), date().succ_opt().unwrap()]);

    let slots = api.list_time_slots("s1", date()).await.unwrap();
    assert_eq!(slots.len(), 3);
    assert!(!slots[2].available);

    api.health().await.unwrap();

    let requests = stub.requests.lock();
    assert_eq!(requests.len(), 4);
    for (path, auth, request_id) in requests.iter() {
        assert_eq!(auth.as_deref(), Some("Bearer test-token"), "{path}");
        assert!(request_id.is_some(), "{path} carries a request id");
    }
    assert_ne!(requests[0].2, requests[1].2, "request ids are per request");
}

#[tokio::test]
async fn error_statuses_are_classified() {
    let (url, _stub) = start_server().await;

    let err = client(&url, None).list_services().await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 401, .. }));
    assert_eq!(classify(&err).kind, ErrorKind::Auth);

    let err = client(&url, Some(TOKEN))
        .list_available_dates("boom")
        .await
        .unwrap_err();
    let failure = classify(&err);
    assert_eq!(failure.kind, ErrorKind::Server);
    assert_eq!(failure.status, Some(500));
    assert_eq!(failure.technical_details(), Some("upstream exploded"));
}

#[tokio::test]
async fn client_timeout_reports_configured_duration() {
    let (url, _stub) = start_server().await;
    let mut config = ApiConfig::new(&url);
    config.auth_token = Some(SecretString::from(TOKEN.to_string()));
    config.request_timeout = Duration::from_millis(100);
    let api = HttpBookingApi::new(&config).unwrap();

    let err = api.list_available_dates("slow").await.unwrap_err();
    assert!(
        matches!(err, ApiError::Timeout(after) if after == Duration::from_millis(100)),
        "{err:?}"
    );
    let failure = classify(&err);
    assert_eq!(failure.kind, ErrorKind::Timeout);
    assert_eq!(failure.technical_details(), Some("no response after 100ms"));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = client(&format!("http://127.0.0.1:{port}"), None)
        .health()
        .await
        .unwrap_err();
    assert_eq!(classify(&err).kind, ErrorKind::Network);
}

#[tokio::test]
async fn session_books_over_http() {
    let (url, stub) = start_server().await;
    let api: Arc<dyn BookingApi> = Arc::new(client(&url, Some(TOKEN)));
    let session = BookingSession::new(api, &SessionConfig::default());

    let services = session.fetch_available_services(false).await.unwrap();
    session.select_service(services[0].clone()).unwrap();
    assert!(session.go_to_next_step());

    let dates = session.fetch_available_dates(false).await.unwrap();
    session.select_date(dates[0]).unwrap();
    let slots = session.fetch_available_time_slots(false).await.unwrap();
    let t1 = slots.iter().find(|s| s.id == "t1").cloned().unwrap();
    session.select_time_slot(t1).unwrap();
    assert!(session.go_to_next_step());

    session
        .set_client_info(booking_intake::booking::ClientInfo {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "Ada@Example.com".into(),
            phone: "+44 20 7946 0958".into(),
            case_type: "investment_fraud".into(),
            case_description: "Transferred funds to a fake trading platform.".into(),
            consent_to_contact: true,
            privacy_policy_accepted: true,
            data_processing_agreed: true,
            ..Default::default()
        })
        .unwrap();
    assert!(session.go_to_next_step());

    let reference = session.submit_booking().await.unwrap();
    assert_eq!(reference, "BK-2025-0001");
    assert_eq!(session.current_step(), BookingStep::Success);

    let client_body = stub.last_client.lock().clone().unwrap();
    assert_eq!(client_body["email"], "ada@example.com");
    let booking_body = stub.last_booking.lock().clone().unwrap();
    assert_eq!(booking_body["clientId"], "c1");
    assert_eq!(booking_body["serviceId"], "s1");
    assert_eq!(booking_body["date"], "2025-06-02");
    assert_eq!(booking_body["timeSlotId"], "t1");
}

#[tokio::test]
async fn conflict_over_http_is_recoverable() {
    let (url, _stub) = start_server().await;
    let api: Arc<dyn BookingApi> = Arc::new(client(&url, Some(TOKEN)));
    let session = BookingSession::new(api, &SessionConfig::default());

    let services = session.fetch_available_services(false).await.unwrap();
    session.select_service(services[0].clone()).unwrap();
    session.go_to_next_step();
    session.select_date(date()).unwrap();
    let slots = session.fetch_available_time_slots(false).await.unwrap();
    let t2 = slots.iter().find(|s| s.id == "t2").cloned().unwrap();
    session.select_time_slot(t2).unwrap();
    session.go_to_next_step();
    session
        .set_client_info(booking_intake::booking::ClientInfo {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            email: "grace@example.com".into(),
            phone: "555 010 9999".into(),
            case_type: "romance_scam".into(),
            case_description: "Sent gift cards to someone met online.".into(),
            consent_to_contact: true,
            privacy_policy_accepted: true,
            data_processing_agreed: true,
            ..Default::default()
        })
        .unwrap();
    assert!(session.go_to_next_step());

    let err = session.submit_booking().await.unwrap_err();
    assert_eq!(err.failure().map(|f| f.kind), Some(ErrorKind::Conflict));
    let failure = session.api_error_for(ResourceKind::Booking).unwrap();
    assert_eq!(failure.status, Some(409));
    assert!(failure.technical_details().unwrap().contains("slot taken"));

    assert!(session.recover_from_error());
    assert_eq!(session.current_step(), BookingStep::DateSelection);
    assert_eq!(session.state().created_client_id.as_deref(), Some("c1"));
}

#[tokio::test]
async fn validation_body_carries_field_errors() {
    let (url, _stub) = start_server().await;
    let info = booking_intake::booking::ClientInfo {
        email: "Taken@Example.com".into(),
        ..Default::default()
    };
    let request = booking_intake::booking::model::CreateClientRequest::from(&info);

    let err = client(&url, Some(TOKEN))
        .create_client(&request)
        .await
        .unwrap_err();
    let failure = classify(&err);
    assert_eq!(failure.kind, ErrorKind::Validation);
    assert_eq!(failure.status, Some(422));
    assert_eq!(failure.field_errors.len(), 1);
    assert_eq!(failure.field_errors[0].field, "email");
    assert_eq!(failure.message, ErrorKind::Validation.user_message());
}

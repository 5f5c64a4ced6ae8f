use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use cinebook_api::app;
use cinebook_api::metrics::Metrics;
use cinebook_api::middleware::Claims;
use cinebook_api::wiring::{assemble, Backends};
use cinebook_core::webhook::signature_header;
use cinebook_order::PaymentMode;
use cinebook_store::app_config::{AuthConfig, BookingRules, Config, PaymentsConfig, ServerConfig};
use cinebook_store::MockPaymentProvider;

const JWT_SECRET: &str = "integration-secret";
const WEBHOOK_SECRET: &str = "whsec_integration";
const ORIGIN: &str = "https://cine.example";

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            port: 0,
            frontend_url: "http://localhost:5173".into(),
        },
        database: None,
        redis: None,
        kafka: None,
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.into(),
        },
        payments: PaymentsConfig {
            secret_key: None,
            webhook_secret: WEBHOOK_SECRET.into(),
            currency: "inr".into(),
            webhook_tolerance_seconds: 300,
            api_base: "https://api.stripe.com".into(),
            request_timeout_seconds: 10,
        },
        mail: None,
        booking_rules: BookingRules::default(),
    }
}

fn router(payments: PaymentMode) -> Router {
    let mut backends = Backends::in_memory();
    backends.payments = payments;
    let metrics = Arc::new(Metrics::new().unwrap());
    let services = assemble(&test_config(), backends, metrics).unwrap();
    app(services.state)
}

fn token(sub: &str, role: Option<&str>) -> String {
    let claims = Claims {
        sub: sub.into(),
        email: Some(format!("{}@example.com", sub)),
        name: Some(sub.into()),
        role: role.map(str::to_string),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()));
    (status, body)
}

fn post_json(uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ORIGIN, ORIGIN);
    if let Some(t) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(t) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    builder.body(Body::empty()).unwrap()
}

/// Adds one show at price 200 and returns its id.
async fn add_show(app: &Router) -> String {
    let admin = token("admin_1", Some("admin"));
    let (status, body) = send(
        app,
        post_json(
            "/api/show/add",
            Some(&admin),
            json!({
                "movieId": "550",
                "movieTitle": "Fight Club",
                "showsInput": [{ "date": "2030-06-01", "time": ["18:30"] }],
                "showPrice": 200
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Show Added successfully.");

    let (_, shows) = send(app, get("/api/show/all", None)).await;
    shows["shows"][0]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_booking_without_payment_provider() {
    let app = router(PaymentMode::Disabled);
    let show_id = add_show(&app).await;
    let user = token("user_1", None);

    let (status, body) = send(
        &app,
        post_json(
            "/api/booking/create",
            Some(&user),
            json!({ "showId": show_id, "selectedSeats": ["A1", "A2"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(
        body["url"],
        "https://cine.example/loading/my-bookings?success=true&message=Booking%20confirmed%20successfully!"
    );

    let (_, seats) = send(&app, get(&format!("/api/booking/seats/{}", show_id), None)).await;
    assert_eq!(seats, json!({ "success": true, "occupiedSeats": ["A1", "A2"] }));

    let (_, mine) = send(&app, get("/api/user/bookings", Some(&user))).await;
    assert_eq!(mine["bookings"][0]["amount"], "400.00");
    assert_eq!(mine["bookings"][0]["isPaid"], true);

    let (status, body) = send(
        &app,
        post_json(
            "/api/booking/create",
            Some(&token("user_2", None)),
            json!({ "showId": show_id, "selectedSeats": ["A2", "A5"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({ "success": false, "message": "Selected Seats are not available." }));
}

#[tokio::test]
async fn test_booking_requires_authentication_and_valid_input() {
    let app = router(PaymentMode::Disabled);
    let show_id = add_show(&app).await;

    let (status, body) = send(
        &app,
        post_json("/api/booking/create", None, json!({ "showId": show_id, "selectedSeats": ["A1"] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, body) = send(
        &app,
        post_json("/api/booking/create", Some(&token("user_1", None)), json!({ "selectedSeats": ["A1"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Show ID is required");

    let (status, _) = send(&app, get("/api/booking/seats/not-a-uuid", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, get(&format!("/api/booking/seats/{}", uuid::Uuid::new_v4()), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Show not found");
}

#[tokio::test]
async fn test_checkout_then_webhook_marks_paid() {
    let provider = Arc::new(MockPaymentProvider::new());
    let app = router(PaymentMode::Provider(provider.clone()));
    let show_id = add_show(&app).await;
    let user = token("user_1", None);

    let (status, body) = send(
        &app,
        post_json(
            "/api/booking/create",
            Some(&user),
            json!({ "showId": show_id, "selectedSeats": ["A3"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let url = body["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("https://checkout.stripe.test/"));

    let (_, mine) = send(&app, get("/api/user/bookings", Some(&user))).await;
    let booking = &mine["bookings"][0];
    assert_eq!(booking["isPaid"], false);
    assert_eq!(booking["paymentLink"], url.as_str());
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let event = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_test_1", "metadata": { "bookingId": booking_id } } }
    })
    .to_string();

    let forged = Request::post("/api/stripe")
        .header("stripe-signature", signature_header("whsec_wrong", Utc::now().timestamp(), event.as_bytes()))
        .body(Body::from(event.clone()))
        .unwrap();
    let (status, body) = send(&app, forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.as_str().unwrap().starts_with("Webhook Error: "));

    let genuine = Request::post("/api/stripe")
        .header("stripe-signature", signature_header(WEBHOOK_SECRET, Utc::now().timestamp(), event.as_bytes()))
        .body(Body::from(event))
        .unwrap();
    let (status, body) = send(&app, genuine).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));

    let (_, mine) = send(&app, get("/api/user/bookings", Some(&user))).await;
    assert_eq!(mine["bookings"][0]["isPaid"], true);

    let (_, metrics) = send(&app, get("/metrics", None)).await;
    let text = metrics.as_str().unwrap();
    assert!(text.contains("cinebook_bookings_paid_total 1"));
    assert!(text.contains("cinebook_webhook_rejections_total 1"));
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = router(PaymentMode::Disabled);

    let (status, _) = send(&app, get("/api/admin/dashboard", Some(&token("user_1", None)))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        post_json("/api/show/add", Some(&token("admin_1", Some("admin"))), json!({ "showsInput": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Movie ID is required");

    let show_id = add_show(&app).await;
    send(
        &app,
        post_json(
            "/api/booking/create",
            Some(&token("user_1", None)),
            json!({ "showId": show_id, "selectedSeats": ["B1", "B2", "B3"] }),
        ),
    )
    .await;

    let (status, body) = send(&app, get("/api/admin/dashboard", Some(&token("admin_1", Some("admin"))))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dashboardData"]["totalBookings"], 1);
    assert_eq!(body["dashboardData"]["totalRevenue"], "600.00");
    assert_eq!(body["dashboardData"]["activeShows"].as_array().unwrap().len(), 1);
}

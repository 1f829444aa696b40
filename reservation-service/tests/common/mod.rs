//! Common test utilities for reservation-service integration tests.
#![allow(dead_code)]

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use reservation_service::config::{FeedConfig, MatchingConfig, ReservationConfig};
use reservation_service::startup::Application;
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;
use std::sync::Once;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,reservation_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config() -> ReservationConfig {
    ReservationConfig {
        common: CommonConfig { port: 0 },
        service_name: "reservation-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        feed: FeedConfig {
            fetch_timeout_secs: 2,
            max_concurrent_fetches: 4,
        },
        matching: MatchingConfig {
            min_score: 40,
            exact_date_tolerance_days: 0,
        },
    }
}

/// Test application wrapper.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute POST request")
    }

    pub async fn patch(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .patch(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute PATCH request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Failed to execute GET request")
    }

    pub async fn get_json(&self, path: &str) -> Value {
        let response = self.get(path).await;
        assert!(
            response.status().is_success(),
            "GET {} returned {}",
            path,
            response.status()
        );
        response.json().await.expect("Invalid JSON response")
    }
}

/// Spawn the application on an ephemeral port and wait until it serves.
pub async fn spawn_app() -> TestApp {
    init_tracing();

    let app = Application::build(test_config())
        .await
        .expect("Failed to build application");
    let port = app.port();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let client = reqwest::Client::new();
    let base_url = format!("http://127.0.0.1:{}", port);

    let mut attempts = 0;
    loop {
        match client.get(format!("{}/ready", base_url)).send().await {
            Ok(_) => break,
            Err(_) if attempts < 20 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => panic!("Server did not become ready after 20 attempts: {}", e),
        }
    }

    TestApp { base_url, client }
}

// ============================================================================
// Stub feed endpoint
// ============================================================================

/// A local HTTP server serving a mutable calendar document, standing in for
/// a channel's remote feed.
pub struct FeedServer {
    pub url: String,
    content: std::sync::Arc<RwLock<String>>,
}

impl FeedServer {
    pub async fn set(&self, body: &str) {
        *self.content.write().await = body.to_string();
    }
}

pub async fn spawn_feed_server(initial: &str) -> FeedServer {
    let content = std::sync::Arc::new(RwLock::new(initial.to_string()));

    async fn serve(State(content): State<std::sync::Arc<RwLock<String>>>) -> String {
        content.read().await.clone()
    }

    let router = Router::new()
        .route("/feed.ics", get(serve))
        .with_state(content.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind feed server");
    let port = listener.local_addr().expect("No local addr").port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    FeedServer {
        url: format!("http://127.0.0.1:{}/feed.ics", port),
        content,
    }
}

/// Build a calendar document from (uid, start, end) triples; dates in the
/// compact 20240601 form.
pub fn ics_feed(events: &[(&str, &str, &str)]) -> String {
    let mut doc = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n");
    for (uid, start, end) in events {
        doc.push_str("BEGIN:VEVENT\r\n");
        doc.push_str(&format!("DTSTART;VALUE=DATE:{}\r\n", start));
        doc.push_str(&format!("DTEND;VALUE=DATE:{}\r\n", end));
        doc.push_str(&format!("UID:{}\r\n", uid));
        doc.push_str("SUMMARY:Reserved\r\n");
        doc.push_str("END:VEVENT\r\n");
    }
    doc.push_str("END:VCALENDAR\r\n");
    doc
}

// ============================================================================
// Entity setup helpers
// ============================================================================

pub async fn create_property(app: &TestApp) -> Uuid {
    let response = app
        .post(
            "/properties",
            &json!({
                "name": "Casa Bella",
                "tax_rate_per_night": "2.00",
                "tax_max_nights": 4
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.expect("Invalid JSON");
    body["property_id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("Missing property_id")
}

pub async fn create_room(
    app: &TestApp,
    property_id: Uuid,
    name: &str,
    feed_url: Option<&str>,
) -> Uuid {
    let response = app
        .post(
            "/rooms",
            &json!({
                "property_id": property_id,
                "name": name,
                "feed_url": feed_url,
                "feed_channel": feed_url.map(|_| "AIRBNB")
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.expect("Invalid JSON");
    body["room_id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("Missing room_id")
}

pub async fn create_booking(
    app: &TestApp,
    room_id: Uuid,
    guest_name: &str,
    check_in: &str,
    check_out: &str,
) -> Uuid {
    let response = app
        .post(
            "/bookings",
            &json!({
                "room_id": room_id,
                "guest_name": guest_name,
                "check_in": check_in,
                "check_out": check_out
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.expect("Invalid JSON");
    body["booking_id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("Missing booking_id")
}

pub async fn submit_check_in(
    app: &TestApp,
    room_id: Uuid,
    first_name: &str,
    last_name: &str,
    stay_start: &str,
    stay_end: &str,
) -> Uuid {
    let response = app
        .post(
            "/check-ins",
            &json!({
                "first_name": first_name,
                "last_name": last_name,
                "room_id": room_id,
                "stay_start": stay_start,
                "stay_end": stay_end
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.expect("Invalid JSON");
    body["check_in_id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("Missing check_in_id")
}

//! Application startup and lifecycle management.

use crate::config::ReservationConfig;
use crate::http;
use crate::services::{
    get_metrics, init_metrics, BookingLedger, FeedFetcher, HttpFeedFetcher, MatchingEngine,
    NotificationSink, SyncEngine, TracingSink,
};
use axum::{http::StatusCode, middleware, response::IntoResponse, routing::get, Json};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ReservationConfig,
    pub ledger: Arc<BookingLedger>,
    pub sync: Arc<SyncEngine>,
    pub matching: Arc<MatchingEngine>,
    pub sink: Arc<dyn NotificationSink>,
}

/// Health check endpoint for liveness probes.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "reservation-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check endpoint.
async fn readiness_check() -> StatusCode {
    StatusCode::OK
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ReservationConfig) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(config.feed.fetch_timeout_secs);
        let fetcher = Arc::new(HttpFeedFetcher::new(timeout).map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to build feed client: {}", e))
        })?);
        Self::build_with_fetcher(config, fetcher).await
    }

    /// Build with an injected feed fetcher. Tests use this to stub feeds.
    pub async fn build_with_fetcher(
        config: ReservationConfig,
        fetcher: Arc<dyn FeedFetcher>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let ledger = Arc::new(BookingLedger::new());
        let sink: Arc<dyn NotificationSink> = Arc::new(TracingSink);
        let sync = Arc::new(SyncEngine::new(
            ledger.clone(),
            fetcher,
            sink.clone(),
            config.feed.max_concurrent_fetches,
        ));
        let matching = Arc::new(MatchingEngine::new(ledger.clone(), config.matching.clone()));

        let state = AppState {
            config: config.clone(),
            ledger,
            sync,
            matching,
            sink,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Reservation service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = http::api_router()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(self.state);

        tracing::info!(
            service = "reservation-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}

//! Operator-facing HTTP API.

pub mod handlers;

use crate::startup::AppState;
use axum::routing::{get, post};
use axum::Router;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route(
            "/properties",
            post(handlers::create_property).get(handlers::list_properties),
        )
        .route("/properties/:id/rooms", get(handlers::list_rooms))
        .route("/properties/:id/sync", post(handlers::sync_property))
        .route("/rooms", post(handlers::create_room))
        .route("/rooms/:id/sync", post(handlers::sync_room))
        .route(
            "/bookings",
            post(handlers::create_booking).get(handlers::list_bookings),
        )
        .route(
            "/bookings/:id",
            get(handlers::get_booking).patch(handlers::update_booking),
        )
        .route("/bookings/:id/cancel", post(handlers::cancel_booking))
        .route(
            "/check-ins",
            post(handlers::submit_check_in).get(handlers::list_check_ins),
        )
        .route("/check-ins/:id", get(handlers::get_check_in))
        .route("/check-ins/:id/suggestions", get(handlers::get_suggestions))
        .route("/check-ins/:id/approve", post(handlers::approve_check_in))
        .route("/check-ins/:id/reject", post(handlers::reject_check_in))
        .route("/check-ins/:id/reported", post(handlers::mark_reported))
}

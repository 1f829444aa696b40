//! HTTP handlers for the operator-facing API.

use crate::models::{
    Booking, BookingStatus, Channel, CheckInStatus, GuestCheckIn, MatchSuggestion, Property, Room,
};
use crate::services::store::{BookingFilter, BookingPatch, NewBooking, Upserted};
use crate::services::sync::SyncReport;
use crate::services::{record_error, record_match_computation};
use crate::services::notifications::{NotificationEvent, TriggerRule};
use crate::startup::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// Request / Response Payloads
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePropertyRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub tax_rate_per_night: Decimal,
    #[validate(range(min = 0))]
    pub tax_max_nights: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoomRequest {
    pub property_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(url)]
    pub feed_url: Option<String>,
    pub feed_channel: Option<Channel>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub room_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub guest_name: String,
    #[validate(email)]
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_count: Option<u32>,
    pub total_price: Option<Decimal>,
    pub channel: Option<Channel>,
    pub external_uid: Option<String>,
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitCheckInRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub birth_place: Option<String>,
    pub fiscal_code: Option<String>,
    pub address: Option<String>,
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub document_expiry: Option<NaiveDate>,
    #[serde(default)]
    pub document_urls: Vec<String>,
    #[serde(default)]
    pub exempt: bool,
    pub exemption_reason: Option<String>,
    pub tax_proof_url: Option<String>,
    pub room_id: Uuid,
    pub stay_start: NaiveDate,
    pub stay_end: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ApproveCheckInRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ApproveCheckInResponse {
    pub check_in: GuestCheckIn,
    pub booking: Booking,
}

#[derive(Debug, Deserialize)]
pub struct CheckInListQuery {
    pub status: Option<CheckInStatus>,
}

// ============================================================================
// Property & Room Handlers
// ============================================================================

pub async fn create_property(
    State(state): State<AppState>,
    Json(req): Json<CreatePropertyRequest>,
) -> Result<(StatusCode, Json<Property>), AppError> {
    req.validate()?;
    let property = state
        .ledger
        .add_property(req.name, req.tax_rate_per_night, req.tax_max_nights);
    tracing::info!(property_id = %property.property_id, "Property registered");
    Ok((StatusCode::CREATED, Json(property)))
}

pub async fn list_properties(
    State(state): State<AppState>,
) -> Result<Json<Vec<Property>>, AppError> {
    Ok(Json(state.ledger.list_properties()))
}

pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), AppError> {
    req.validate()?;
    let room = state
        .ledger
        .add_room(req.property_id, req.name, req.feed_url, req.feed_channel)?;
    tracing::info!(room_id = %room.room_id, property_id = %room.property_id, "Room registered");
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn list_rooms(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
) -> Result<Json<Vec<Room>>, AppError> {
    if state.ledger.property(property_id).is_none() {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "property {} not found",
            property_id
        )));
    }
    Ok(Json(state.ledger.rooms_for_property(property_id)))
}

// ============================================================================
// Booking Handlers
// ============================================================================

pub async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    req.validate()?;

    let status = req.status.unwrap_or(BookingStatus::Confirmed);
    let new = NewBooking {
        room_id: req.room_id,
        guest_name: req.guest_name,
        guest_email: req.guest_email,
        guest_phone: req.guest_phone,
        check_in: req.check_in,
        check_out: req.check_out,
        guest_count: req.guest_count.unwrap_or(1),
        total_price: req.total_price,
        status,
        channel: req.channel.unwrap_or(Channel::Direct),
        external_uid: req.external_uid,
    };

    let upserted = state.ledger.create_booking(new).await?;
    if let Upserted::Created(ref booking) = upserted {
        if booking.status == BookingStatus::Confirmed {
            state
                .sink
                .dispatch(NotificationEvent::now(booking, TriggerRule::OnConfirmation))
                .await;
        }
    }
    Ok((StatusCode::CREATED, Json(upserted.into_booking())))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    state
        .ledger
        .booking(booking_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("booking {} not found", booking_id)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Query(filter): Query<BookingFilter>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.ledger.list_bookings(&filter)))
}

pub async fn update_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(patch): Json<BookingPatch>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.ledger.update_booking(booking_id, patch).await?;
    Ok(Json(booking))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.ledger.cancel_booking(booking_id).await?;
    Ok(Json(booking))
}

// ============================================================================
// Guest Check-in Handlers
// ============================================================================

pub async fn submit_check_in(
    State(state): State<AppState>,
    Json(req): Json<SubmitCheckInRequest>,
) -> Result<(StatusCode, Json<GuestCheckIn>), AppError> {
    req.validate()?;

    // Intentionally no check against the ledger: the guest may register
    // before any reservation exists, or with a typo in room or dates.
    let check_in = GuestCheckIn {
        check_in_id: Uuid::new_v4(),
        first_name: req.first_name,
        last_name: req.last_name,
        birth_date: req.birth_date,
        birth_place: req.birth_place,
        fiscal_code: req.fiscal_code,
        address: req.address,
        document_type: req.document_type,
        document_number: req.document_number,
        document_expiry: req.document_expiry,
        document_urls: req.document_urls,
        exempt: req.exempt,
        exemption_reason: req.exemption_reason,
        tax_proof_url: req.tax_proof_url,
        room_id: req.room_id,
        stay_start: req.stay_start,
        stay_end: req.stay_end,
        status: CheckInStatus::Pending,
        booking_id: None,
        submitted_utc: Utc::now(),
        reported_to_authorities: false,
        reported_utc: None,
    };

    let stored = state.ledger.submit_check_in(check_in);
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn get_check_in(
    State(state): State<AppState>,
    Path(check_in_id): Path<Uuid>,
) -> Result<Json<GuestCheckIn>, AppError> {
    state
        .ledger
        .check_in(check_in_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("check-in {} not found", check_in_id)))
}

pub async fn list_check_ins(
    State(state): State<AppState>,
    Query(query): Query<CheckInListQuery>,
) -> Result<Json<Vec<GuestCheckIn>>, AppError> {
    Ok(Json(state.ledger.list_check_ins(query.status)))
}

pub async fn get_suggestions(
    State(state): State<AppState>,
    Path(check_in_id): Path<Uuid>,
) -> Result<Json<Vec<MatchSuggestion>>, AppError> {
    match state.matching.suggestions_for(check_in_id) {
        Ok(suggestions) => {
            record_match_computation(if suggestions.is_empty() {
                "no_match"
            } else {
                "suggested"
            });
            Ok(Json(suggestions))
        }
        Err(err) => {
            record_error("matching");
            Err(err.into())
        }
    }
}

pub async fn approve_check_in(
    State(state): State<AppState>,
    Path(check_in_id): Path<Uuid>,
    Json(req): Json<ApproveCheckInRequest>,
) -> Result<Json<ApproveCheckInResponse>, AppError> {
    let (check_in, booking) = state
        .ledger
        .approve_check_in(check_in_id, req.booking_id)
        .await?;
    Ok(Json(ApproveCheckInResponse { check_in, booking }))
}

pub async fn reject_check_in(
    State(state): State<AppState>,
    Path(check_in_id): Path<Uuid>,
) -> Result<Json<GuestCheckIn>, AppError> {
    let check_in = state.ledger.reject_check_in(check_in_id)?;
    Ok(Json(check_in))
}

pub async fn mark_reported(
    State(state): State<AppState>,
    Path(check_in_id): Path<Uuid>,
) -> Result<Json<GuestCheckIn>, AppError> {
    let check_in = state.ledger.mark_reported(check_in_id)?;
    Ok(Json(check_in))
}

// ============================================================================
// Sync Handlers
// ============================================================================

pub async fn sync_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
) -> Result<Json<SyncReport>, AppError> {
    let report = state.sync.sync_property(property_id).await?;
    tracing::info!(
        property_id = %property_id,
        rooms_synced = report.rooms_synced,
        rooms_failed = report.rooms_failed,
        created = report.bookings_created,
        updated = report.bookings_updated,
        cancelled = report.bookings_cancelled,
        conflicts = report.conflicts.len(),
        "Property sync finished"
    );
    Ok(Json(report))
}

pub async fn sync_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<SyncReport>, AppError> {
    let report = state.sync.sync_room(room_id).await?;
    Ok(Json(report))
}

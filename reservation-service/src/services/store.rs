//! Booking ledger: the authoritative store for properties, rooms, bookings
//! and guest check-ins.
//!
//! All check-then-act sequences (overlap check before insert, terminal-state
//! check before a date change) run under a per-room async mutex so concurrent
//! reconciliation tasks touching the same room cannot race. Locks are per
//! room, not global: one slow feed never blocks the others.

use crate::models::{
    Booking, BookingStatus, Channel, CheckInStatus, GuestCheckIn, Property, Room,
};
use crate::services::tax;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("property {0} not found")]
    PropertyNotFound(Uuid),

    #[error("room {0} not found")]
    RoomNotFound(Uuid),

    #[error("booking {0} not found")]
    BookingNotFound(Uuid),

    #[error("check-in {0} not found")]
    CheckInNotFound(Uuid),

    #[error("room {room_id} already has booking {existing} overlapping {start}..{end}")]
    OverlapConflict {
        room_id: Uuid,
        existing: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("dates of booking {booking_id} are frozen in status {status}")]
    TerminalState {
        booking_id: Uuid,
        status: BookingStatus,
    },

    #[error("check-out {1} must be after check-in {0}")]
    InvalidDateRange(NaiveDate, NaiveDate),

    #[error("check-in {0} is not pending")]
    NotPending(Uuid),

    #[error("cannot link check-in: {0}")]
    LinkIntegrity(String),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            e @ (LedgerError::PropertyNotFound(_)
            | LedgerError::RoomNotFound(_)
            | LedgerError::BookingNotFound(_)
            | LedgerError::CheckInNotFound(_)) => AppError::NotFound(e.into()),
            e @ LedgerError::InvalidDateRange(_, _) => AppError::BadRequest(e.into()),
            e => AppError::Conflict(e.into()),
        }
    }
}

/// Input for a booking insert. Channel imports carry their external UID.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub room_id: Uuid,
    pub guest_name: String,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_count: u32,
    pub total_price: Option<Decimal>,
    pub status: BookingStatus,
    pub channel: Channel,
    pub external_uid: Option<String>,
}

/// Partial update applied by operator edits or reconciliation passes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingPatch {
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guest_count: Option<u32>,
    pub total_price: Option<Decimal>,
    pub status: Option<BookingStatus>,
    pub tax_paid: Option<bool>,
}

impl BookingPatch {
    pub fn dates(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self {
            check_in: Some(check_in),
            check_out: Some(check_out),
            ..Self::default()
        }
    }
}

/// Outcome of `create_booking`: a channel-sourced insert whose external UID
/// already exists becomes an update, never a duplicate.
#[derive(Debug, Clone)]
pub enum Upserted {
    Created(Booking),
    Updated(Booking),
}

impl Upserted {
    pub fn into_booking(self) -> Booking {
        match self {
            Self::Created(b) | Self::Updated(b) => b,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingFilter {
    pub property_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub struct BookingLedger {
    properties: DashMap<Uuid, Property>,
    rooms: DashMap<Uuid, Room>,
    bookings: DashMap<Uuid, Booking>,
    check_ins: DashMap<Uuid, GuestCheckIn>,
    by_external_uid: DashMap<String, Uuid>,
    room_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl BookingLedger {
    pub fn new() -> Self {
        Self {
            properties: DashMap::new(),
            rooms: DashMap::new(),
            bookings: DashMap::new(),
            check_ins: DashMap::new(),
            by_external_uid: DashMap::new(),
            room_locks: DashMap::new(),
        }
    }

    fn room_lock(&self, room_id: Uuid) -> Arc<Mutex<()>> {
        self.room_locks
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // =========================================================================
    // Property & Room Operations
    // =========================================================================

    pub fn add_property(
        &self,
        name: String,
        tax_rate_per_night: Decimal,
        tax_max_nights: i64,
    ) -> Property {
        let property = Property {
            property_id: Uuid::new_v4(),
            name,
            tax_rate_per_night,
            tax_max_nights,
            created_utc: Utc::now(),
        };
        self.properties
            .insert(property.property_id, property.clone());
        property
    }

    pub fn property(&self, id: Uuid) -> Option<Property> {
        self.properties.get(&id).map(|r| r.value().clone())
    }

    pub fn list_properties(&self) -> Vec<Property> {
        let mut all: Vec<Property> = self.properties.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|p| p.created_utc);
        all
    }

    pub fn add_room(
        &self,
        property_id: Uuid,
        name: String,
        feed_url: Option<String>,
        feed_channel: Option<Channel>,
    ) -> Result<Room, LedgerError> {
        if !self.properties.contains_key(&property_id) {
            return Err(LedgerError::PropertyNotFound(property_id));
        }
        let room = Room {
            room_id: Uuid::new_v4(),
            property_id,
            name,
            feed_url,
            feed_channel,
            created_utc: Utc::now(),
        };
        self.rooms.insert(room.room_id, room.clone());
        Ok(room)
    }

    pub fn room(&self, id: Uuid) -> Option<Room> {
        self.rooms.get(&id).map(|r| r.value().clone())
    }

    pub fn rooms_for_property(&self, property_id: Uuid) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .rooms
            .iter()
            .filter(|r| r.property_id == property_id)
            .map(|r| r.value().clone())
            .collect();
        rooms.sort_by_key(|r| r.created_utc);
        rooms
    }

    // =========================================================================
    // Booking Operations
    // =========================================================================

    /// Insert a booking, atomically checking for overlaps under the room lock.
    ///
    /// A channel-sourced insert resolves its external UID first: if a booking
    /// already carries it, the call degrades to a date/detail update.
    #[instrument(skip(self, new), fields(room_id = %new.room_id, channel = new.channel.as_str()))]
    pub async fn create_booking(&self, new: NewBooking) -> Result<Upserted, LedgerError> {
        let room = self
            .room(new.room_id)
            .ok_or(LedgerError::RoomNotFound(new.room_id))?;
        if new.check_out <= new.check_in {
            return Err(LedgerError::InvalidDateRange(new.check_in, new.check_out));
        }

        let lock = self.room_lock(new.room_id);
        let guard = lock.lock().await;

        if let Some(uid) = new.external_uid.as_deref() {
            if let Some(existing_id) = self.by_external_uid.get(uid).map(|r| *r.value()) {
                let patch = BookingPatch {
                    guest_name: Some(new.guest_name.clone()),
                    check_in: Some(new.check_in),
                    check_out: Some(new.check_out),
                    total_price: new.total_price,
                    ..BookingPatch::default()
                };
                let existing_room = self
                    .bookings
                    .get(&existing_id)
                    .map(|b| b.room_id)
                    .ok_or(LedgerError::BookingNotFound(existing_id))?;
                if existing_room == new.room_id {
                    return self.apply_patch_locked(existing_id, patch).map(Upserted::Updated);
                }
                // UID landed on another room; defer to that room's lock.
                drop(guard);
                return self
                    .update_booking(existing_id, patch)
                    .await
                    .map(Upserted::Updated);
            }
        }

        if let Some(existing) = self
            .find_overlapping(new.room_id, new.check_in, new.check_out, None)
            .into_iter()
            .next()
        {
            return Err(LedgerError::OverlapConflict {
                room_id: new.room_id,
                existing: existing.booking_id,
                start: new.check_in,
                end: new.check_out,
            });
        }

        let now = Utc::now();
        let booking = Booking {
            booking_id: Uuid::new_v4(),
            property_id: room.property_id,
            room_id: room.room_id,
            guest_name: new.guest_name,
            guest_email: new.guest_email,
            guest_phone: new.guest_phone,
            check_in: new.check_in,
            check_out: new.check_out,
            guest_count: new.guest_count,
            total_price: new.total_price,
            status: new.status,
            channel: new.channel,
            external_uid: new.external_uid,
            tax_total: Decimal::ZERO,
            tax_paid: false,
            created_utc: now,
            updated_utc: now,
        };
        if let Some(uid) = booking.external_uid.clone() {
            self.by_external_uid.insert(uid, booking.booking_id);
        }
        self.bookings.insert(booking.booking_id, booking.clone());
        tracing::info!(booking_id = %booking.booking_id, "Booking created");
        Ok(Upserted::Created(booking))
    }

    /// Apply a partial update under the booking's room lock.
    #[instrument(skip(self, patch))]
    pub async fn update_booking(
        &self,
        booking_id: Uuid,
        patch: BookingPatch,
    ) -> Result<Booking, LedgerError> {
        let room_id = self
            .bookings
            .get(&booking_id)
            .map(|b| b.room_id)
            .ok_or(LedgerError::BookingNotFound(booking_id))?;

        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;
        self.apply_patch_locked(booking_id, patch)
    }

    // Caller holds the room lock.
    fn apply_patch_locked(
        &self,
        booking_id: Uuid,
        patch: BookingPatch,
    ) -> Result<Booking, LedgerError> {
        let mut booking = self
            .bookings
            .get(&booking_id)
            .map(|b| b.value().clone())
            .ok_or(LedgerError::BookingNotFound(booking_id))?;

        let check_in = patch.check_in.unwrap_or(booking.check_in);
        let check_out = patch.check_out.unwrap_or(booking.check_out);
        if check_out <= check_in {
            return Err(LedgerError::InvalidDateRange(check_in, check_out));
        }
        let dates_changed = check_in != booking.check_in || check_out != booking.check_out;

        if dates_changed && booking.status.is_terminal() {
            return Err(LedgerError::TerminalState {
                booking_id,
                status: booking.status,
            });
        }

        let next_status = patch.status.unwrap_or(booking.status);
        let becomes_active = next_status.is_active();
        let was_cancelled = !booking.status.is_active();

        // Date moves, and cancelled bookings coming back to life, must not
        // collide with what the room holds now.
        if (dates_changed || (was_cancelled && becomes_active)) && becomes_active {
            if let Some(existing) = self
                .find_overlapping(booking.room_id, check_in, check_out, Some(booking_id))
                .into_iter()
                .next()
            {
                return Err(LedgerError::OverlapConflict {
                    room_id: booking.room_id,
                    existing: existing.booking_id,
                    start: check_in,
                    end: check_out,
                });
            }
        }

        booking.check_in = check_in;
        booking.check_out = check_out;
        booking.status = next_status;
        if let Some(name) = patch.guest_name {
            booking.guest_name = name;
        }
        if let Some(email) = patch.guest_email {
            booking.guest_email = Some(email);
        }
        if let Some(phone) = patch.guest_phone {
            booking.guest_phone = Some(phone);
        }
        if let Some(count) = patch.guest_count {
            booking.guest_count = count;
        }
        if let Some(price) = patch.total_price {
            booking.total_price = Some(price);
        }
        if let Some(paid) = patch.tax_paid {
            booking.tax_paid = paid;
        }
        booking.updated_utc = Utc::now();

        self.bookings.insert(booking_id, booking.clone());
        Ok(booking)
    }

    /// Soft-terminate a booking. Stays that already started are left alone.
    #[instrument(skip(self))]
    pub async fn cancel_booking(&self, booking_id: Uuid) -> Result<Booking, LedgerError> {
        let room_id = self
            .bookings
            .get(&booking_id)
            .map(|b| b.room_id)
            .ok_or(LedgerError::BookingNotFound(booking_id))?;

        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        let mut booking = self
            .bookings
            .get(&booking_id)
            .map(|b| b.value().clone())
            .ok_or(LedgerError::BookingNotFound(booking_id))?;

        if booking.status.is_terminal() {
            return Err(LedgerError::TerminalState {
                booking_id,
                status: booking.status,
            });
        }
        if booking.status == BookingStatus::Cancelled {
            return Ok(booking);
        }

        booking.status = BookingStatus::Cancelled;
        booking.updated_utc = Utc::now();
        self.bookings.insert(booking_id, booking.clone());
        tracing::info!(booking_id = %booking_id, "Booking cancelled");
        Ok(booking)
    }

    pub fn booking(&self, id: Uuid) -> Option<Booking> {
        self.bookings.get(&id).map(|r| r.value().clone())
    }

    pub fn find_by_source_uid(&self, uid: &str) -> Option<Booking> {
        let id = self.by_external_uid.get(uid).map(|r| *r.value())?;
        self.booking(id)
    }

    /// Non-cancelled bookings intersecting the half-open [start, end) range.
    pub fn find_overlapping(
        &self,
        room_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|b| {
                b.room_id == room_id
                    && b.status.is_active()
                    && b.overlaps(start, end)
                    && Some(b.booking_id) != exclude
            })
            .map(|b| b.value().clone())
            .collect()
    }

    pub fn list_bookings(&self, filter: &BookingFilter) -> Vec<Booking> {
        let mut result: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|b| {
                filter.property_id.map_or(true, |p| b.property_id == p)
                    && filter.room_id.map_or(true, |r| b.room_id == r)
                    && filter.to.map_or(true, |to| b.check_in < to)
                    && filter.from.map_or(true, |from| b.check_out > from)
            })
            .map(|b| b.value().clone())
            .collect();
        result.sort_by_key(|b| (b.check_in, b.created_utc));
        result
    }

    /// Channel imports for one room; the cancel-disappeared pass of a sync
    /// diffs these against the live feed.
    pub fn channel_bookings(&self, room_id: Uuid, channel: Channel) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|b| b.room_id == room_id && b.channel == channel && b.external_uid.is_some())
            .map(|b| b.value().clone())
            .collect()
    }

    // =========================================================================
    // Guest Check-in Operations
    // =========================================================================

    /// Store a self-service submission. Deliberately not validated against the
    /// ledger: the guest may submit before any reservation exists, or with a
    /// typo in the dates. Linking happens later through operator approval.
    pub fn submit_check_in(&self, check_in: GuestCheckIn) -> GuestCheckIn {
        self.check_ins
            .insert(check_in.check_in_id, check_in.clone());
        tracing::info!(check_in_id = %check_in.check_in_id, "Guest check-in stored");
        check_in
    }

    pub fn check_in(&self, id: Uuid) -> Option<GuestCheckIn> {
        self.check_ins.get(&id).map(|r| r.value().clone())
    }

    pub fn list_check_ins(&self, status: Option<CheckInStatus>) -> Vec<GuestCheckIn> {
        let mut result: Vec<GuestCheckIn> = self
            .check_ins
            .iter()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .map(|c| c.value().clone())
            .collect();
        result.sort_by_key(|c| c.submitted_utc);
        result
    }

    /// Link a pending check-in to a booking. The only path that turns the
    /// guest's registration into an occupied room-night, and the only path
    /// that makes the booking's tourist-tax total meaningful.
    #[instrument(skip(self))]
    pub async fn approve_check_in(
        &self,
        check_in_id: Uuid,
        booking_id: Uuid,
    ) -> Result<(GuestCheckIn, Booking), LedgerError> {
        let check_in = self
            .check_in(check_in_id)
            .ok_or(LedgerError::CheckInNotFound(check_in_id))?;
        if check_in.status != CheckInStatus::Pending {
            return Err(LedgerError::NotPending(check_in_id));
        }

        let booking = self.booking(booking_id).ok_or_else(|| {
            LedgerError::LinkIntegrity(format!("booking {} no longer exists", booking_id))
        })?;

        let lock = self.room_lock(booking.room_id);
        let _guard = lock.lock().await;

        // Re-read under the lock; the booking may have been cancelled meanwhile.
        let mut booking = self.booking(booking_id).ok_or_else(|| {
            LedgerError::LinkIntegrity(format!("booking {} no longer exists", booking_id))
        })?;
        if booking.status == BookingStatus::Cancelled {
            return Err(LedgerError::LinkIntegrity(format!(
                "booking {} is cancelled",
                booking_id
            )));
        }

        let property = self.property(booking.property_id).ok_or_else(|| {
            LedgerError::LinkIntegrity(format!("property {} no longer exists", booking.property_id))
        })?;

        let mut check_in = self
            .check_in(check_in_id)
            .ok_or(LedgerError::CheckInNotFound(check_in_id))?;
        if check_in.status != CheckInStatus::Pending {
            return Err(LedgerError::NotPending(check_in_id));
        }

        check_in.status = CheckInStatus::Approved;
        check_in.booking_id = Some(booking_id);
        self.check_ins.insert(check_in_id, check_in.clone());

        let exempt_linked = self
            .check_ins
            .iter()
            .filter(|c| {
                c.booking_id == Some(booking_id) && c.status == CheckInStatus::Approved && c.exempt
            })
            .count() as u32;
        let mut non_exempt = booking.guest_count.saturating_sub(exempt_linked);
        if non_exempt == 0 && !check_in.exempt {
            non_exempt = 1;
        }

        booking.tax_total = tax::tourist_tax(
            booking.nights(),
            property.tax_rate_per_night,
            property.tax_max_nights,
            non_exempt,
        );
        booking.updated_utc = Utc::now();
        self.bookings.insert(booking_id, booking.clone());

        tracing::info!(
            check_in_id = %check_in_id,
            booking_id = %booking_id,
            tax_total = %booking.tax_total,
            "Check-in approved and linked"
        );
        Ok((check_in, booking))
    }

    /// Terminal: a rejected check-in keeps its data but never links.
    pub fn reject_check_in(&self, check_in_id: Uuid) -> Result<GuestCheckIn, LedgerError> {
        let mut check_in = self
            .check_in(check_in_id)
            .ok_or(LedgerError::CheckInNotFound(check_in_id))?;
        if check_in.status != CheckInStatus::Pending {
            return Err(LedgerError::NotPending(check_in_id));
        }
        check_in.status = CheckInStatus::Rejected;
        self.check_ins.insert(check_in_id, check_in.clone());
        tracing::info!(check_in_id = %check_in_id, "Check-in rejected");
        Ok(check_in)
    }

    pub fn mark_reported(&self, check_in_id: Uuid) -> Result<GuestCheckIn, LedgerError> {
        let mut check_in = self
            .check_in(check_in_id)
            .ok_or(LedgerError::CheckInNotFound(check_in_id))?;
        check_in.reported_to_authorities = true;
        check_in.reported_utc = Some(Utc::now());
        self.check_ins.insert(check_in_id, check_in.clone());
        Ok(check_in)
    }
}

impl Default for BookingLedger {
    fn default() -> Self {
        Self::new()
    }
}

//! Domain models for reservation-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Property & Room Models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub property_id: Uuid,
    pub name: String,
    /// Tourist tax charged per non-exempt guest per taxable night.
    pub tax_rate_per_night: Decimal,
    /// Nights beyond this cap are not taxed, regardless of stay length.
    pub tax_max_nights: i64,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: Uuid,
    pub property_id: Uuid,
    pub name: String,
    /// Remote calendar document for this room, if the room is listed on a channel.
    pub feed_url: Option<String>,
    /// Channel the feed belongs to; events imported from it carry this origin.
    pub feed_channel: Option<Channel>,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Booking Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Direct,
    BookingCom,
    Airbnb,
    Other,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "DIRECT",
            Self::BookingCom => "BOOKING_COM",
            Self::Airbnb => "AIRBNB",
            Self::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::CheckedIn => "CHECKED_IN",
            Self::CheckedOut => "CHECKED_OUT",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// The stay already started or ended; dates are frozen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CheckedIn | Self::CheckedOut)
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: Uuid,
    pub property_id: Uuid,
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
    /// Stable identifier assigned by the source feed. Set only for channel imports.
    pub external_uid: Option<String>,
    pub tax_total: Decimal,
    pub tax_paid: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Booking {
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Half-open [check_in, check_out) range intersection.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.check_in < end && start < self.check_out
    }
}

// ============================================================================
// External Calendar Models
// ============================================================================

/// Feed-sourced event. Transient: exists only to diff against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCalendarEvent {
    pub room_id: Uuid,
    pub uid: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub summary: String,
}

// ============================================================================
// Guest Check-in Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckInStatus {
    Pending,
    Approved,
    Rejected,
}

impl CheckInStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// One person's self-submitted registration. Stored with no booking link
/// until an operator approves a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestCheckIn {
    pub check_in_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub birth_place: Option<String>,
    pub fiscal_code: Option<String>,
    pub address: Option<String>,
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub document_expiry: Option<NaiveDate>,
    /// Opaque blob-store URLs for uploaded document images.
    pub document_urls: Vec<String>,
    pub exempt: bool,
    pub exemption_reason: Option<String>,
    pub tax_proof_url: Option<String>,
    /// Room and dates as typed by the guest; may not match any booking.
    pub room_id: Uuid,
    pub stay_start: NaiveDate,
    pub stay_end: NaiveDate,
    pub status: CheckInStatus,
    pub booking_id: Option<Uuid>,
    pub submitted_utc: DateTime<Utc>,
    pub reported_to_authorities: bool,
    pub reported_utc: Option<DateTime<Utc>>,
}

impl GuestCheckIn {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ============================================================================
// Match Suggestion Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Name,
    Property,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Name => "name",
            Self::Property => "property",
        }
    }
}

/// Candidate booking for a pending check-in. Computed fresh on each query,
/// never cached across ledger mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub booking_id: Uuid,
    pub match_type: MatchKind,
    pub score: u8,
    pub match_reason: String,
}

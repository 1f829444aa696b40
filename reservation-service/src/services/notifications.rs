//! Notification trigger events consumed by the message dispatcher.
//!
//! Delivery is an external collaborator; this module only defines the
//! trigger vocabulary and the seam booking state changes emit through.

use crate::models::Booking;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerRule {
    OnConfirmation,
    BeforeCheckin,
    OnCheckinDay,
    AfterCheckin,
    BeforeCheckout,
    OnCheckoutDay,
    Manual,
}

impl TriggerRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnConfirmation => "ON_CONFIRMATION",
            Self::BeforeCheckin => "BEFORE_CHECKIN",
            Self::OnCheckinDay => "ON_CHECKIN_DAY",
            Self::AfterCheckin => "AFTER_CHECKIN",
            Self::BeforeCheckout => "BEFORE_CHECKOUT",
            Self::OnCheckoutDay => "ON_CHECKOUT_DAY",
            Self::Manual => "MANUAL",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub booking_id: Uuid,
    pub trigger: TriggerRule,
    pub occurred_utc: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn now(booking: &Booking, trigger: TriggerRule) -> Self {
        Self {
            booking_id: booking.booking_id,
            trigger,
            occurred_utc: Utc::now(),
        }
    }
}

/// Black-box dispatcher seam. Implementations must not fail the caller:
/// a lost notification is recoverable, a failed booking write is not.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn dispatch(&self, event: NotificationEvent);
}

/// Default sink: log the event and move on.
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn dispatch(&self, event: NotificationEvent) {
        tracing::info!(
            booking_id = %event.booking_id,
            trigger = event.trigger.as_str(),
            "Notification event emitted"
        );
    }
}

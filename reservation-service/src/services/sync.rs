//! Reconciliation engine: merges channel calendar feeds into the booking
//! ledger without duplicating events or clobbering manual bookings.
//!
//! Each room feed is an independent unit of work; rooms sync concurrently
//! and one unreachable feed never blocks or aborts the others. Per-room
//! results merge into a single report surfaced to the operator. A run
//! aborted mid-way leaves already-committed rooms intact; there is no
//! global rollback.

use crate::models::{Booking, BookingStatus, Channel, ExternalCalendarEvent, Room};
use crate::services::feed::{parse_calendar, FeedError, FeedFetcher};
use crate::services::metrics::{record_feed_fetch, record_sync_operation, record_sync_run};
use crate::services::notifications::{NotificationEvent, NotificationSink, TriggerRule};
use crate::services::store::{BookingLedger, BookingPatch, LedgerError, NewBooking, Upserted};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct SyncConflict {
    pub room_id: Uuid,
    pub external_uid: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomSyncError {
    pub room_id: Uuid,
    pub kind: String,
    pub message: String,
}

/// Contract surfaced to the operator-facing sync trigger.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub rooms_synced: u32,
    pub rooms_failed: u32,
    pub bookings_created: u32,
    pub bookings_updated: u32,
    pub bookings_cancelled: u32,
    /// Malformed feed entries skipped individually, across all rooms.
    pub entries_skipped: u32,
    pub conflicts: Vec<SyncConflict>,
    pub errors: Vec<RoomSyncError>,
}

#[derive(Default)]
struct RoomCounts {
    created: u32,
    updated: u32,
    cancelled: u32,
    entries_skipped: u32,
    conflicts: Vec<SyncConflict>,
}

pub struct SyncEngine {
    ledger: Arc<BookingLedger>,
    fetcher: Arc<dyn FeedFetcher>,
    sink: Arc<dyn NotificationSink>,
    max_concurrent_fetches: usize,
}

impl SyncEngine {
    pub fn new(
        ledger: Arc<BookingLedger>,
        fetcher: Arc<dyn FeedFetcher>,
        sink: Arc<dyn NotificationSink>,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            ledger,
            fetcher,
            sink,
            max_concurrent_fetches,
        }
    }

    /// Sync every feed-configured room of a property.
    #[instrument(skip(self))]
    pub async fn sync_property(&self, property_id: Uuid) -> Result<SyncReport, LedgerError> {
        if self.ledger.property(property_id).is_none() {
            return Err(LedgerError::PropertyNotFound(property_id));
        }
        let rooms: Vec<Room> = self
            .ledger
            .rooms_for_property(property_id)
            .into_iter()
            .filter(|r| r.feed_url.is_some())
            .collect();
        let report = self.sync_rooms(rooms).await;
        record_sync_run("property", run_status(&report));
        Ok(report)
    }

    /// Sync a single room's feed.
    #[instrument(skip(self))]
    pub async fn sync_room(&self, room_id: Uuid) -> Result<SyncReport, LedgerError> {
        let room = self
            .ledger
            .room(room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let report = self.sync_rooms(vec![room]).await;
        record_sync_run("room", run_status(&report));
        Ok(report)
    }

    async fn sync_rooms(&self, rooms: Vec<Room>) -> SyncReport {
        let outcomes: Vec<(Uuid, Result<RoomCounts, FeedError>)> = stream::iter(rooms)
            .map(|room| async move {
                let room_id = room.room_id;
                (room_id, self.sync_one(room).await)
            })
            .buffer_unordered(self.max_concurrent_fetches.max(1))
            .collect()
            .await;

        let mut report = SyncReport::default();
        for (room_id, outcome) in outcomes {
            match outcome {
                Ok(counts) => {
                    report.rooms_synced += 1;
                    report.bookings_created += counts.created;
                    report.bookings_updated += counts.updated;
                    report.bookings_cancelled += counts.cancelled;
                    report.entries_skipped += counts.entries_skipped;
                    report.conflicts.extend(counts.conflicts);
                }
                Err(err) => {
                    tracing::warn!(room_id = %room_id, error = %err, "Room sync failed");
                    report.rooms_failed += 1;
                    report.errors.push(RoomSyncError {
                        room_id,
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
        report
    }

    #[instrument(skip(self, room), fields(room_id = %room.room_id))]
    async fn sync_one(&self, room: Room) -> Result<RoomCounts, FeedError> {
        let url = room.feed_url.clone().ok_or(FeedError::NotConfigured)?;
        let channel = room.feed_channel.unwrap_or(Channel::Other);

        let started = Instant::now();
        let text = match self.fetcher.fetch(&url).await {
            Ok(text) => {
                record_feed_fetch("ok", started.elapsed().as_secs_f64());
                text
            }
            Err(err) => {
                record_feed_fetch(err.kind(), started.elapsed().as_secs_f64());
                return Err(err);
            }
        };
        let parsed = parse_calendar(room.room_id, &text)?;

        let mut counts = RoomCounts {
            entries_skipped: parsed.skipped_entries,
            ..RoomCounts::default()
        };

        // Pass 1: events whose UID already has a booking get their dates
        // aligned. Pass 2: the rest become new bookings unless they would
        // shadow an existing one. Pass 3: bookings whose event vanished from
        // the feed are cancelled. Three passes keep each outcome observable
        // on its own.
        let mut unmatched: Vec<&ExternalCalendarEvent> = Vec::new();
        for event in &parsed.events {
            match self.ledger.find_by_source_uid(&event.uid) {
                Some(existing) => {
                    self.update_matched(&room, event, existing, &mut counts)
                        .await
                }
                None => unmatched.push(event),
            }
        }

        for event in unmatched {
            self.create_unmatched(&room, channel, event, &mut counts)
                .await;
        }

        let live_uids: HashSet<&str> = parsed.events.iter().map(|e| e.uid.as_str()).collect();
        for booking in self.ledger.channel_bookings(room.room_id, channel) {
            let gone = booking
                .external_uid
                .as_deref()
                .map_or(false, |uid| !live_uids.contains(uid));
            if !gone {
                continue;
            }
            match booking.status {
                BookingStatus::Pending | BookingStatus::Confirmed => {
                    match self.ledger.cancel_booking(booking.booking_id).await {
                        Ok(_) => {
                            counts.cancelled += 1;
                            record_sync_operation("cancel");
                        }
                        Err(err) => counts.conflicts.push(SyncConflict {
                            room_id: room.room_id,
                            external_uid: booking.external_uid.clone(),
                            reason: err.to_string(),
                        }),
                    }
                }
                // The stay already happened (or the booking is already
                // cancelled); the feed no longer has a say.
                _ => {}
            }
        }

        Ok(counts)
    }

    async fn update_matched(
        &self,
        room: &Room,
        event: &ExternalCalendarEvent,
        existing: Booking,
        counts: &mut RoomCounts,
    ) {
        if existing.room_id != room.room_id {
            counts.conflicts.push(SyncConflict {
                room_id: room.room_id,
                external_uid: Some(event.uid.clone()),
                reason: format!(
                    "event UID is already attached to booking {} in another room",
                    existing.booking_id
                ),
            });
            return;
        }

        let dates_differ =
            existing.check_in != event.start || existing.check_out != event.end;

        if existing.status.is_terminal() {
            if dates_differ {
                counts.conflicts.push(SyncConflict {
                    room_id: room.room_id,
                    external_uid: Some(event.uid.clone()),
                    reason: format!(
                        "feed moved dates to {}..{} but booking {} is {}",
                        event.start, event.end, existing.booking_id, existing.status
                    ),
                });
            }
            return;
        }

        if existing.status == BookingStatus::Cancelled {
            // The event reappeared after a cancellation: re-confirm with the
            // feed's dates unless the room has been taken meanwhile.
            let patch = BookingPatch {
                check_in: Some(event.start),
                check_out: Some(event.end),
                status: Some(BookingStatus::Confirmed),
                ..BookingPatch::default()
            };
            match self.ledger.update_booking(existing.booking_id, patch).await {
                Ok(booking) => {
                    counts.updated += 1;
                    record_sync_operation("reconfirm");
                    self.sink
                        .dispatch(NotificationEvent::now(&booking, TriggerRule::OnConfirmation))
                        .await;
                }
                Err(err) => counts.conflicts.push(SyncConflict {
                    room_id: room.room_id,
                    external_uid: Some(event.uid.clone()),
                    reason: err.to_string(),
                }),
            }
            return;
        }

        if dates_differ {
            let patch = BookingPatch::dates(event.start, event.end);
            match self.ledger.update_booking(existing.booking_id, patch).await {
                Ok(_) => {
                    counts.updated += 1;
                    record_sync_operation("update");
                }
                Err(err) => counts.conflicts.push(SyncConflict {
                    room_id: room.room_id,
                    external_uid: Some(event.uid.clone()),
                    reason: err.to_string(),
                }),
            }
        }
    }

    async fn create_unmatched(
        &self,
        room: &Room,
        channel: Channel,
        event: &ExternalCalendarEvent,
        counts: &mut RoomCounts,
    ) {
        let summary = event.summary.trim();
        let guest_name = if summary.is_empty() {
            format!("{} guest", channel.as_str())
        } else {
            summary.to_string()
        };

        let new = NewBooking {
            room_id: room.room_id,
            guest_name,
            guest_email: None,
            guest_phone: None,
            check_in: event.start,
            check_out: event.end,
            guest_count: 1,
            total_price: None,
            status: BookingStatus::Confirmed,
            channel,
            external_uid: Some(event.uid.clone()),
        };

        match self.ledger.create_booking(new).await {
            Ok(Upserted::Created(booking)) => {
                counts.created += 1;
                record_sync_operation("create");
                self.sink
                    .dispatch(NotificationEvent::now(&booking, TriggerRule::OnConfirmation))
                    .await;
            }
            // Another run won the race on this UID; its booking stands.
            Ok(Upserted::Updated(_)) => counts.updated += 1,
            Err(err) => counts.conflicts.push(SyncConflict {
                room_id: room.room_id,
                external_uid: Some(event.uid.clone()),
                reason: err.to_string(),
            }),
        }
    }
}

fn run_status(report: &SyncReport) -> &'static str {
    if report.rooms_failed == 0 {
        "ok"
    } else if report.rooms_synced > 0 {
        "partial"
    } else {
        "failed"
    }
}

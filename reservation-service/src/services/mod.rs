//! Services module for reservation-service.

pub mod feed;
pub mod matching;
pub mod metrics;
pub mod notifications;
pub mod store;
pub mod sync;
pub mod tax;

pub use feed::{parse_calendar, FeedError, FeedFetcher, HttpFeedFetcher, ParsedFeed};
pub use matching::MatchingEngine;
pub use metrics::{
    get_metrics, init_metrics, record_error, record_feed_fetch, record_match_computation,
    record_sync_operation, record_sync_run,
};
pub use notifications::{NotificationEvent, NotificationSink, TracingSink, TriggerRule};
pub use store::{
    BookingFilter, BookingLedger, BookingPatch, LedgerError, NewBooking, Upserted,
};
pub use sync::{RoomSyncError, SyncConflict, SyncEngine, SyncReport};
pub use tax::tourist_tax;

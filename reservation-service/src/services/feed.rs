//! Calendar feed client: fetches a remote calendar document per room and
//! parses it into a normalized list of date-range events.
//!
//! Parsing is tolerant entry by entry: one malformed VEVENT is skipped and
//! counted, never aborting the document. Re-parsing the same text yields the
//! same events in the same order.

use crate::models::ExternalCalendarEvent;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Network failure or timeout. Retryable, isolated to one room's feed.
    #[error("feed unreachable: {0}")]
    Unreachable(String),

    /// The document could not be read as a calendar at all.
    #[error("feed parse error: {0}")]
    Parse(String),

    /// The room has no feed URL; only meaningful for single-room triggers.
    #[error("room has no feed configured")]
    NotConfigured,
}

impl FeedError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "unreachable",
            Self::Parse(_) => "parse",
            Self::NotConfigured => "not_configured",
        }
    }
}

/// Seam for the remote feed endpoint: given a URL, return raw text or fail.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FeedError>;
}

pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Unreachable(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FeedError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FeedError::Unreachable(e.to_string()))?;
        response
            .text()
            .await
            .map_err(|e| FeedError::Unreachable(e.to_string()))
    }
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub events: Vec<ExternalCalendarEvent>,
    /// VEVENT blocks dropped for missing/invalid fields or duplicate UIDs.
    pub skipped_entries: u32,
}

#[derive(Default)]
struct DraftEvent {
    uid: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    summary: String,
}

impl DraftEvent {
    fn finish(self, room_id: Uuid) -> Option<ExternalCalendarEvent> {
        let uid = self.uid.filter(|u| !u.is_empty())?;
        let start = self.start?;
        let end = self.end?;
        if end <= start {
            return None;
        }
        Some(ExternalCalendarEvent {
            room_id,
            uid,
            start,
            end,
            summary: self.summary,
        })
    }
}

/// Parse an iCalendar document into the room's event list.
pub fn parse_calendar(room_id: Uuid, text: &str) -> Result<ParsedFeed, FeedError> {
    if !text.contains("BEGIN:VCALENDAR") {
        return Err(FeedError::Parse(
            "document does not contain a VCALENDAR".to_string(),
        ));
    }

    let mut events = Vec::new();
    let mut seen_uids: HashSet<String> = HashSet::new();
    let mut skipped = 0u32;
    let mut current: Option<DraftEvent> = None;

    for line in unfold_lines(text) {
        if line == "BEGIN:VEVENT" {
            // An unterminated previous block counts as one bad entry.
            if current.take().is_some() {
                skipped += 1;
            }
            current = Some(DraftEvent::default());
            continue;
        }
        if line == "END:VEVENT" {
            match current.take().and_then(|draft| draft.finish(room_id)) {
                Some(event) => {
                    if seen_uids.insert(event.uid.clone()) {
                        events.push(event);
                    } else {
                        skipped += 1;
                    }
                }
                None => skipped += 1,
            }
            continue;
        }

        let Some(draft) = current.as_mut() else {
            continue;
        };
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        // Property parameters (e.g. DTSTART;VALUE=DATE) are irrelevant here.
        let name = name.split(';').next().unwrap_or(name);
        match name {
            "UID" => draft.uid = Some(value.trim().to_string()),
            "DTSTART" => draft.start = parse_ics_date(value),
            "DTEND" => draft.end = parse_ics_date(value),
            "SUMMARY" => draft.summary = value.trim().to_string(),
            _ => {}
        }
    }

    Ok(ParsedFeed {
        events,
        skipped_entries: skipped,
    })
}

// RFC 5545 folds long lines with a leading space or tab on the continuation.
fn unfold_lines(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in text.lines() {
        let trimmed = raw.trim_end_matches('\r');
        if let Some(cont) = trimmed.strip_prefix(' ').or_else(|| trimmed.strip_prefix('\t')) {
            if let Some(last) = out.last_mut() {
                last.push_str(cont);
                continue;
            }
        }
        out.push(trimmed.to_string());
    }
    out
}

// Accepts both the all-day form (20240601) and the datetime form
// (20240601T120000Z); only the date part matters for room-night ranges.
fn parse_ics_date(value: &str) -> Option<NaiveDate> {
    let prefix = value.trim().get(..8)?;
    NaiveDate::parse_from_str(prefix, "%Y%m%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
PRODID:-//Channel//EN\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
DTSTART;VALUE=DATE:20240601\r\n\
DTEND;VALUE=DATE:20240605\r\n\
UID:abc-123@channel.example\r\n\
SUMMARY:Reserved - Maria Rossi\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
DTSTART:20240710T140000Z\r\n\
DTEND:20240714T100000Z\r\n\
UID:def-456@channel.example\r\n\
SUMMARY:Reserved\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    fn room() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn parses_date_and_datetime_events() {
        let parsed = parse_calendar(room(), FEED).unwrap();
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.skipped_entries, 0);

        let first = &parsed.events[0];
        assert_eq!(first.uid, "abc-123@channel.example");
        assert_eq!(first.start, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(first.end, NaiveDate::from_ymd_opt(2024, 6, 5).unwrap());
        assert_eq!(first.summary, "Reserved - Maria Rossi");

        let second = &parsed.events[1];
        assert_eq!(second.start, NaiveDate::from_ymd_opt(2024, 7, 10).unwrap());
        assert_eq!(second.end, NaiveDate::from_ymd_opt(2024, 7, 14).unwrap());
    }

    #[test]
    fn reparsing_is_idempotent() {
        let id = room();
        let a = parse_calendar(id, FEED).unwrap();
        let b = parse_calendar(id, FEED).unwrap();
        assert_eq!(a.events, b.events);
    }

    #[test]
    fn malformed_entry_is_skipped_not_fatal() {
        let feed = "BEGIN:VCALENDAR\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20240601\n\
UID:missing-end-date\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20240603\n\
DTEND;VALUE=DATE:20240606\n\
UID:good\n\
END:VEVENT\n\
END:VCALENDAR\n";
        let parsed = parse_calendar(room(), feed).unwrap();
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].uid, "good");
        assert_eq!(parsed.skipped_entries, 1);
    }

    #[test]
    fn inverted_range_is_skipped() {
        let feed = "BEGIN:VCALENDAR\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20240605\n\
DTEND;VALUE=DATE:20240601\n\
UID:backwards\n\
END:VEVENT\n\
END:VCALENDAR\n";
        let parsed = parse_calendar(room(), feed).unwrap();
        assert!(parsed.events.is_empty());
        assert_eq!(parsed.skipped_entries, 1);
    }

    #[test]
    fn duplicate_uid_keeps_first_occurrence() {
        let feed = "BEGIN:VCALENDAR\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20240601\n\
DTEND;VALUE=DATE:20240603\n\
UID:dup\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20240610\n\
DTEND;VALUE=DATE:20240612\n\
UID:dup\n\
END:VEVENT\n\
END:VCALENDAR\n";
        let parsed = parse_calendar(room(), feed).unwrap();
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(
            parsed.events[0].start,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
        assert_eq!(parsed.skipped_entries, 1);
    }

    #[test]
    fn folded_summary_lines_are_unfolded() {
        // The continuation line must keep its leading space.
        let feed = [
            "BEGIN:VCALENDAR",
            "BEGIN:VEVENT",
            "DTSTART;VALUE=DATE:20240601",
            "DTEND;VALUE=DATE:20240603",
            "UID:folded",
            "SUMMARY:Reserved for a guest with a very lo",
            " ng name",
            "END:VEVENT",
            "END:VCALENDAR",
            "",
        ]
        .join("\r\n");
        let parsed = parse_calendar(room(), &feed).unwrap();
        assert_eq!(
            parsed.events[0].summary,
            "Reserved for a guest with a very long name"
        );
    }

    #[test]
    fn non_calendar_document_is_a_parse_error() {
        let err = parse_calendar(room(), "<html>404</html>").unwrap_err();
        assert!(matches!(err, FeedError::Parse(_)));
    }
}

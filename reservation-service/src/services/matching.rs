//! Matching & scoring: rank candidate bookings for a pending guest check-in.
//!
//! Check-ins arrive with no foreign key to any booking, so candidates are
//! scored from the weak signals the guest supplies: selected room, typed
//! dates, and their name. Scoring is pure and side-effect-free; linking is a
//! separate explicit operator action.

use crate::config::MatchingConfig;
use crate::models::{Booking, CheckInStatus, GuestCheckIn, MatchKind, MatchSuggestion};
use crate::services::store::{BookingFilter, BookingLedger, LedgerError};
use std::sync::Arc;
use uuid::Uuid;

const EXACT_SCORE: u8 = 100;
/// Name matches never reach 100; that score is reserved for exact room+dates.
const NAME_SCORE_CEILING: u8 = 99;
/// Flat score for the same-property fallback; deliberately the lowest rung.
const PROPERTY_SCORE: u8 = 20;
/// A property fallback still counts as "near" this many days away.
const NEAR_OVERLAP_DAYS: i64 = 3;

pub struct MatchingEngine {
    ledger: Arc<BookingLedger>,
    config: MatchingConfig,
}

impl MatchingEngine {
    pub fn new(ledger: Arc<BookingLedger>, config: MatchingConfig) -> Self {
        Self { ledger, config }
    }

    /// Ranked suggestions for a pending check-in, computed against the ledger
    /// as read at invocation time. The result is advisory and recomputed on
    /// demand, never cached.
    pub fn suggestions_for(
        &self,
        check_in_id: Uuid,
    ) -> Result<Vec<MatchSuggestion>, LedgerError> {
        let check_in = self
            .ledger
            .check_in(check_in_id)
            .ok_or(LedgerError::CheckInNotFound(check_in_id))?;
        if check_in.status != CheckInStatus::Pending {
            return Err(LedgerError::NotPending(check_in_id));
        }
        let room = self
            .ledger
            .room(check_in.room_id)
            .ok_or(LedgerError::RoomNotFound(check_in.room_id))?;

        let candidates: Vec<Booking> = self
            .ledger
            .list_bookings(&BookingFilter {
                property_id: Some(room.property_id),
                ..BookingFilter::default()
            })
            .into_iter()
            .filter(|b| b.status.is_active())
            .collect();

        Ok(suggest(&check_in, &candidates, &self.config))
    }
}

/// Score all candidate bookings against one check-in. Suggestions are sorted
/// by score descending, ties broken by date proximity to the guest's stated
/// range. Same-property fallbacks are offered only when nothing scores
/// higher.
pub fn suggest(
    check_in: &GuestCheckIn,
    bookings: &[Booking],
    config: &MatchingConfig,
) -> Vec<MatchSuggestion> {
    let guest_name = normalize_name(&check_in.full_name());
    let tolerance = config.exact_date_tolerance_days;

    let mut ranked: Vec<(MatchSuggestion, i64)> = Vec::new();
    let mut fallbacks: Vec<(MatchSuggestion, i64)> = Vec::new();

    for booking in bookings.iter().filter(|b| b.status.is_active()) {
        let proximity = date_distance(booking, check_in);

        let start_drift = (booking.check_in - check_in.stay_start).num_days().abs();
        let end_drift = (booking.check_out - check_in.stay_end).num_days().abs();
        if booking.room_id == check_in.room_id
            && start_drift <= tolerance
            && end_drift <= tolerance
        {
            let reason = if start_drift == 0 && end_drift == 0 {
                "same room, exact dates".to_string()
            } else {
                format!("same room, dates within {} day(s)", tolerance)
            };
            ranked.push((
                MatchSuggestion {
                    booking_id: booking.booking_id,
                    match_type: MatchKind::Exact,
                    score: EXACT_SCORE,
                    match_reason: reason,
                },
                proximity,
            ));
            continue;
        }

        let similarity = name_similarity(&guest_name, &normalize_name(&booking.guest_name));
        let score = ((similarity * 100.0).round() as u8).min(NAME_SCORE_CEILING);
        if score >= config.min_score {
            let locality = if booking.room_id == check_in.room_id {
                "same room"
            } else {
                "same property"
            };
            ranked.push((
                MatchSuggestion {
                    booking_id: booking.booking_id,
                    match_type: MatchKind::Name,
                    score,
                    match_reason: format!(
                        "name similarity {}%, {}",
                        (similarity * 100.0).round() as u32,
                        locality
                    ),
                },
                proximity,
            ));
            continue;
        }

        let gap = range_gap(booking, check_in);
        if gap <= NEAR_OVERLAP_DAYS {
            let reason = if gap == 0 {
                "same property, overlapping dates".to_string()
            } else {
                format!("same property, dates within {} day(s)", gap)
            };
            fallbacks.push((
                MatchSuggestion {
                    booking_id: booking.booking_id,
                    match_type: MatchKind::Property,
                    score: PROPERTY_SCORE,
                    match_reason: reason,
                },
                proximity,
            ));
        }
    }

    let mut chosen = if ranked.is_empty() { fallbacks } else { ranked };
    chosen.sort_by(|(a, pa), (b, pb)| b.score.cmp(&a.score).then(pa.cmp(pb)));
    chosen.into_iter().map(|(s, _)| s).collect()
}

// Combined start+end drift, in days, against the guest-stated range.
fn date_distance(booking: &Booking, check_in: &GuestCheckIn) -> i64 {
    (booking.check_in - check_in.stay_start).num_days().abs()
        + (booking.check_out - check_in.stay_end).num_days().abs()
}

// 0 when the ranges overlap, otherwise the gap between them in days.
fn range_gap(booking: &Booking, check_in: &GuestCheckIn) -> i64 {
    if booking.overlaps(check_in.stay_start, check_in.stay_end) {
        return 0;
    }
    if booking.check_out <= check_in.stay_start {
        (check_in.stay_start - booking.check_out).num_days()
    } else {
        (booking.check_in - check_in.stay_end).num_days()
    }
}

/// Lowercase, fold diacritics, turn punctuation into spaces, collapse runs
/// of whitespace. "María  Rossi." and "maria rossi" normalize identically.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = true;
    for c in name.to_lowercase().chars() {
        let c = fold_diacritic(c);
        if c.is_alphanumeric() {
            out.push(c);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'ç' => 'c',
        'ñ' => 'n',
        'ß' => 's',
        other => other,
    }
}

/// Similarity of two normalized names in [0, 1]: token overlap (with
/// single-letter initials matching their full token) blended with an
/// edit-distance ratio over the whole string.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: Vec<&str> = b.split_whitespace().collect();
    let matched = tokens_a
        .iter()
        .filter(|ta| tokens_b.iter().any(|tb| tokens_match(ta, tb)))
        .count();
    let token_score = matched as f64 / tokens_a.len().max(tokens_b.len()) as f64;

    let distance = levenshtein(a, b);
    let edit_ratio = 1.0 - distance as f64 / a.chars().count().max(b.chars().count()) as f64;

    0.6 * token_score + 0.4 * edit_ratio
}

fn tokens_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    // "m" matches "maria": guests abbreviate, channels don't.
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    (a_len == 1 && b.starts_with(a)) || (b_len == 1 && a.starts_with(b))
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, Channel, CheckInStatus};
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config() -> MatchingConfig {
        MatchingConfig {
            min_score: 40,
            exact_date_tolerance_days: 0,
        }
    }

    fn booking(
        room_id: Uuid,
        guest_name: &str,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Booking {
        let now = Utc::now();
        Booking {
            booking_id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            room_id,
            guest_name: guest_name.to_string(),
            guest_email: None,
            guest_phone: None,
            check_in,
            check_out,
            guest_count: 2,
            total_price: None,
            status: BookingStatus::Confirmed,
            channel: Channel::Direct,
            external_uid: None,
            tax_total: Decimal::ZERO,
            tax_paid: false,
            created_utc: now,
            updated_utc: now,
        }
    }

    fn check_in(room_id: Uuid, first: &str, last: &str, start: NaiveDate, end: NaiveDate) -> GuestCheckIn {
        GuestCheckIn {
            check_in_id: Uuid::new_v4(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            birth_date: None,
            birth_place: None,
            fiscal_code: None,
            address: None,
            document_type: None,
            document_number: None,
            document_expiry: None,
            document_urls: vec![],
            exempt: false,
            exemption_reason: None,
            tax_proof_url: None,
            room_id,
            stay_start: start,
            stay_end: end,
            status: CheckInStatus::Pending,
            booking_id: None,
            submitted_utc: Utc::now(),
            reported_to_authorities: false,
            reported_utc: None,
        }
    }

    #[test]
    fn normalization_folds_case_diacritics_and_punctuation() {
        assert_eq!(normalize_name("  María   ROSSI. "), "maria rossi");
        assert_eq!(normalize_name("Jean-Luc"), "jean luc");
        assert_eq!(normalize_name("M. Rossi"), "m rossi");
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn identical_names_score_one() {
        assert_eq!(name_similarity("maria rossi", "maria rossi"), 1.0);
    }

    #[test]
    fn abbreviated_first_name_scores_high_but_below_one() {
        let sim = name_similarity("maria rossi", "m rossi");
        assert!(sim > 0.7, "similarity was {}", sim);
        assert!(sim < 1.0);
    }

    #[test]
    fn unrelated_names_score_low() {
        let sim = name_similarity("maria rossi", "john smith");
        assert!(sim < 0.3, "similarity was {}", sim);
    }

    #[test]
    fn exact_room_and_dates_yield_single_exact_suggestion() {
        let room = Uuid::new_v4();
        let b = booking(room, "Maria Rossi", date(2024, 7, 10), date(2024, 7, 14));
        let ci = check_in(room, "Maria", "Rossi", date(2024, 7, 10), date(2024, 7, 14));

        let suggestions = suggest(&ci, &[b.clone()], &config());
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].match_type, MatchKind::Exact);
        assert_eq!(suggestions[0].score, 100);
        assert_eq!(suggestions[0].booking_id, b.booking_id);
    }

    #[test]
    fn name_match_outranks_property_fallback() {
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        // Same property, overlapping dates, unrelated name: fallback fodder.
        let other = booking(room_b, "John Smith", date(2024, 7, 9), date(2024, 7, 13));
        let named = booking(room_b, "M. Rossi", date(2024, 7, 10), date(2024, 7, 14));
        let ci = check_in(room_a, "Maria", "Rossi", date(2024, 7, 10), date(2024, 7, 14));

        let suggestions = suggest(&ci, &[other, named.clone()], &config());
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].match_type, MatchKind::Name);
        assert_eq!(suggestions[0].booking_id, named.booking_id);
        assert!(suggestions[0].score >= 40 && suggestions[0].score < 100);
    }

    #[test]
    fn property_fallback_only_without_better_candidates() {
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        let other = booking(room_b, "John Smith", date(2024, 7, 9), date(2024, 7, 13));
        let ci = check_in(room_a, "Maria", "Rossi", date(2024, 7, 10), date(2024, 7, 14));

        let suggestions = suggest(&ci, &[other.clone()], &config());
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].match_type, MatchKind::Property);
        assert_eq!(suggestions[0].booking_id, other.booking_id);
    }

    #[test]
    fn far_away_dates_produce_no_fallback() {
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        let other = booking(room_b, "John Smith", date(2024, 9, 1), date(2024, 9, 5));
        let ci = check_in(room_a, "Maria", "Rossi", date(2024, 7, 10), date(2024, 7, 14));

        assert!(suggest(&ci, &[other], &config()).is_empty());
    }

    #[test]
    fn ties_break_on_date_proximity() {
        let room = Uuid::new_v4();
        let near = booking(room, "Maria Rossi", date(2024, 7, 11), date(2024, 7, 15));
        let far = booking(room, "Maria Rossi", date(2024, 7, 20), date(2024, 7, 24));
        let ci = check_in(room, "Maria", "Rossi", date(2024, 7, 10), date(2024, 7, 14));

        let suggestions = suggest(&ci, &[far.clone(), near.clone()], &config());
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].booking_id, near.booking_id);
        assert_eq!(suggestions[1].booking_id, far.booking_id);
    }

    #[test]
    fn cancelled_bookings_are_never_candidates() {
        let room = Uuid::new_v4();
        let mut b = booking(room, "Maria Rossi", date(2024, 7, 10), date(2024, 7, 14));
        b.status = BookingStatus::Cancelled;
        let ci = check_in(room, "Maria", "Rossi", date(2024, 7, 10), date(2024, 7, 14));

        assert!(suggest(&ci, &[b], &config()).is_empty());
    }
}

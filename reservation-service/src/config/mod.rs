//! Configuration module for reservation-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct ReservationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub feed: FeedConfig,
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Upper bound for a single feed fetch. A hung feed must not stall the run.
    pub fetch_timeout_secs: u64,
    pub max_concurrent_fetches: usize,
}

#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Candidates scoring below this are not returned at all.
    pub min_score: u8,
    /// How many days of drift still count as an "exact" date match.
    pub exact_date_tolerance_days: i64,
}

impl ReservationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "reservation-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            feed: FeedConfig {
                fetch_timeout_secs: env::var("FEED_FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
                max_concurrent_fetches: env::var("FEED_MAX_CONCURRENT_FETCHES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(4),
            },
            matching: MatchingConfig {
                min_score: env::var("MATCH_MIN_SCORE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(40),
                exact_date_tolerance_days: env::var("MATCH_EXACT_DATE_TOLERANCE_DAYS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
            },
        })
    }
}

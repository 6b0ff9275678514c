//! Lightweight metrics helpers for scorewall.
//!
//! This module exposes a small set of convenience functions and an RAII timer
//! wrapping the `metrics` crate macros. It does not embed a concrete exporter
//! (the application can install any compatible recorder) while still
//! describing the scorewall-specific metric names.
//!
//! Provided metrics:
//! * `scorewall_requests_processed_total` (counter, by location)
//! * `scorewall_requests_blocked_total` (counter, by location and learning mode)
//! * `scorewall_inspection_duration_seconds` (histogram, by location)
//! * `scorewall_rule_matches_total` (counter, by zone)
//!
//! The per-location counters mirror the atomic counters kept on each scope;
//! the status endpoint reads those, exporters read these.
use std::time::Instant;

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

pub const SCOREWALL_REQUESTS_PROCESSED_TOTAL: &str = "scorewall_requests_processed_total";
pub const SCOREWALL_REQUESTS_BLOCKED_TOTAL: &str = "scorewall_requests_blocked_total";
pub const SCOREWALL_INSPECTION_DURATION_SECONDS: &str = "scorewall_inspection_duration_seconds";
pub const SCOREWALL_RULE_MATCHES_TOTAL: &str = "scorewall_rule_matches_total";

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        SCOREWALL_REQUESTS_PROCESSED_TOTAL,
        Unit::Count,
        "Requests whose inspection completed."
    );
    describe_counter!(
        SCOREWALL_REQUESTS_BLOCKED_TOTAL,
        Unit::Count,
        "Requests whose check rules decided to block (including learning mode)."
    );
    describe_histogram!(
        SCOREWALL_INSPECTION_DURATION_SECONDS,
        Unit::Seconds,
        "Time from pipeline entry to verdict, body delivery included."
    );
    describe_counter!(
        SCOREWALL_RULE_MATCHES_TOTAL,
        Unit::Count,
        "Non-whitelisted rule matches."
    );
});

/// Count a completed inspection.
pub fn increment_processed(location: &str) {
    counter!(SCOREWALL_REQUESTS_PROCESSED_TOTAL, "location" => location.to_string()).increment(1);
}

/// Count a block decision.
pub fn increment_blocked(location: &str, learning: bool) {
    counter!(
        SCOREWALL_REQUESTS_BLOCKED_TOTAL,
        "location" => location.to_string(),
        "learning" => learning.to_string()
    )
    .increment(1);
}

/// Count rule matches found in a zone.
pub fn add_rule_matches(zone: &str, matches: u64) {
    counter!(SCOREWALL_RULE_MATCHES_TOTAL, "zone" => zone.to_string()).increment(matches);
}

pub fn record_inspection_duration(location: &str, duration: std::time::Duration) {
    histogram!(
        SCOREWALL_INSPECTION_DURATION_SECONDS,
        "location" => location.to_string()
    )
    .record(duration.as_secs_f64());
}

/// RAII helper measuring inspection duration.
pub struct InspectionTimer {
    start: Instant,
    location: String,
}

impl InspectionTimer {
    pub fn new(location: &str) -> Self {
        Self {
            start: Instant::now(),
            location: location.to_string(),
        }
    }
}

impl Drop for InspectionTimer {
    fn drop(&mut self) {
        record_inspection_duration(&self.location, self.start.elapsed());
    }
}

/// Initialize metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    tracing::info!("Initializing scorewall metrics");
    Lazy::force(&DESCRIPTIONS);
    Ok(())
}

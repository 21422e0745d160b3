//! Metrics module for the attention-matching engine.
//!
//! Provides Prometheus-compatible metrics for monitoring:
//! - Bid lifecycle (submitted, matched, cancelled, expired)
//! - Match construction latency and active-match population
//! - Session pool availability
//! - Settlement emission
//! - HTTP surface (health/metrics scrape) latency

#![allow(dead_code)]

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Metric names as constants for consistency.
pub mod names {
    // HTTP surface
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Bid lifecycle
    pub const BIDS_SUBMITTED_TOTAL: &str = "bids_submitted_total";
    pub const BIDS_CANCELLED_TOTAL: &str = "bids_cancelled_total";
    pub const BIDS_EXPIRED_TOTAL: &str = "bids_expired_total";

    // Matching
    pub const MATCHES_CREATED_TOTAL: &str = "matches_created_total";
    pub const MATCHES_COMPLETED_TOTAL: &str = "matches_completed_total";
    pub const MATCHES_FAILED_TOTAL: &str = "matches_failed_total";
    pub const MATCH_CONSTRUCTION_DURATION_SECONDS: &str = "match_construction_duration_seconds";
    pub const ACTIVE_MATCHES: &str = "active_matches";
    pub const ORDER_BOOK_SIZE: &str = "order_book_size";
    pub const AVAILABLE_SESSIONS: &str = "available_sessions";

    // Settlement
    pub const SETTLEMENTS_TOTAL: &str = "settlements_total";
    pub const SETTLEMENT_AMOUNT_MICRO_UNITS: &str = "settlement_amount_micro_units";

    // Event bus
    pub const EVENTS_APPENDED_TOTAL: &str = "events_appended_total";
    pub const EVENTS_CONSUMED_TOTAL: &str = "events_consumed_total";
    pub const EVENTS_DROPPED_TOTAL: &str = "events_dropped_total";
}

/// Label keys.
pub mod labels {
    pub const METHOD: &str = "method";
    pub const ENDPOINT: &str = "endpoint";
    pub const STATUS: &str = "status";
    pub const END_REASON: &str = "end_reason";
    pub const STREAM: &str = "stream";
}

/// Initialize the Prometheus exporter with bucket tuning appropriate to
/// this engine's latency budget (match construction is measured in low
/// milliseconds, not the request-scale buckets of a typical HTTP API).
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
        )
        .unwrap()
        .set_buckets_for_metric(
            Matcher::Full(names::MATCH_CONSTRUCTION_DURATION_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5],
        )
        .unwrap();

    builder
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

// ============================================================================
// HTTP metrics
// ============================================================================

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str.clone()
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str
    )
    .record(duration_secs);
}

// ============================================================================
// Bid lifecycle
// ============================================================================

pub fn record_bid_submitted() {
    counter!(names::BIDS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_bid_cancelled() {
    counter!(names::BIDS_CANCELLED_TOTAL).increment(1);
}

pub fn record_bid_expired() {
    counter!(names::BIDS_EXPIRED_TOTAL).increment(1);
}

// ============================================================================
// Matching
// ============================================================================

pub fn record_match_created() {
    counter!(names::MATCHES_CREATED_TOTAL).increment(1);
}

pub fn record_match_ended(end_reason: &str, completed: bool) {
    if completed {
        counter!(names::MATCHES_COMPLETED_TOTAL).increment(1);
    } else {
        counter!(
            names::MATCHES_FAILED_TOTAL,
            labels::END_REASON => end_reason.to_string()
        )
        .increment(1);
    }
}

pub fn record_match_construction_duration(duration_secs: f64) {
    histogram!(names::MATCH_CONSTRUCTION_DURATION_SECONDS).record(duration_secs);
}

pub fn set_active_matches(count: i64) {
    gauge!(names::ACTIVE_MATCHES).set(count as f64);
}

pub fn set_order_book_size(count: i64) {
    gauge!(names::ORDER_BOOK_SIZE).set(count as f64);
}

pub fn set_available_sessions(count: i64) {
    gauge!(names::AVAILABLE_SESSIONS).set(count as f64);
}

// ============================================================================
// Settlement
// ============================================================================

pub fn record_settlement(amount_micro_units: u64) {
    counter!(names::SETTLEMENTS_TOTAL).increment(1);
    counter!(names::SETTLEMENT_AMOUNT_MICRO_UNITS).increment(amount_micro_units);
}

// ============================================================================
// Event bus
// ============================================================================

pub fn record_event_appended(stream: &str) {
    counter!(names::EVENTS_APPENDED_TOTAL, labels::STREAM => stream.to_string()).increment(1);
}

pub fn record_event_consumed(stream: &str) {
    counter!(names::EVENTS_CONSUMED_TOTAL, labels::STREAM => stream.to_string()).increment(1);
}

pub fn record_event_dropped(stream: &str) {
    counter!(names::EVENTS_DROPPED_TOTAL, labels::STREAM => stream.to_string()).increment(1);
}

// ============================================================================
// Timer helper
// ============================================================================

/// Timer for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_secs();
        assert!(elapsed >= 0.01);
        assert!(elapsed < 0.5);
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(names::MATCHES_CREATED_TOTAL, "matches_created_total");
        assert_eq!(names::BIDS_SUBMITTED_TOTAL, "bids_submitted_total");
        assert_eq!(names::SETTLEMENTS_TOTAL, "settlements_total");
    }

    #[test]
    fn test_label_keys() {
        assert_eq!(labels::METHOD, "method");
        assert_eq!(labels::END_REASON, "end_reason");
    }
}

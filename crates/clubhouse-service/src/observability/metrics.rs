//! Metrics definitions for the Clubhouse service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `clubhouse_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: route templates only, unmatched paths become `/other`
//! - `event_type`: the fixed set of event names in `services::events`
//! - `status` / `outcome`: small fixed sets documented per function

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("clubhouse_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Fan-out runs are bounded by FANOUT_TIMEOUT_MS (max 30s)
        .set_buckets_for_metric(
            Matcher::Full("clubhouse_fanout_duration_seconds".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 30.000,
            ],
        )
        .map_err(|e| format!("Failed to set fan-out buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `clubhouse_http_requests_total`, `clubhouse_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let status = categorize_status_code(status_code);

    histogram!("clubhouse_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("clubhouse_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

// ============================================================================
// Event Pipeline Metrics
// ============================================================================

/// Record the final outcome of one `publish` call.
///
/// Metric: `clubhouse_events_published_total`
/// Labels: `event_type`, `status` ("success", "skipped", "error")
pub fn record_event_published(event_type: &'static str, status: &'static str) {
    counter!("clubhouse_events_published_total",
        "event_type" => event_type,
        "status" => status
    )
    .increment(1);
}

/// Record a single broker publish attempt.
///
/// Metric: `clubhouse_publish_attempts_total`
/// Labels: `outcome` ("success", "transport_error", "cancelled", "deadline_exceeded")
pub fn record_publish_attempt(outcome: &'static str) {
    counter!("clubhouse_publish_attempts_total", "outcome" => outcome).increment(1);
}

/// Record how many users a write mentioned after resolution.
///
/// Metric: `clubhouse_mentions_resolved_total`
pub fn record_mentions_resolved(count: usize) {
    counter!("clubhouse_mentions_resolved_total").increment(count as u64);
}

/// Record one fan-out run.
///
/// Metric: `clubhouse_fanout_duration_seconds`
/// Labels: `status` ("success", "partial", "failed")
pub fn record_fanout(status: &'static str, duration: Duration) {
    histogram!("clubhouse_fanout_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

/// Set the number of live registered connections.
///
/// Metric: `clubhouse_ws_connections`
/// Type: Gauge
pub fn set_ws_connections(count: usize) {
    gauge!("clubhouse_ws_connections").set(count as f64);
}

/// Record a connection evicted by a newer one for the same user.
///
/// Metric: `clubhouse_ws_evictions_total`
pub fn record_ws_eviction() {
    counter!("clubhouse_ws_evictions_total").increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(201), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(400), "error");
        assert_eq!(categorize_status_code(404), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(500), "error");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_pipeline_metrics_are_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_event_published("new_comment", "success");
            record_publish_attempt("transport_error");
            record_publish_attempt("success");
            record_mentions_resolved(3);
            record_fanout("success", Duration::from_millis(12));
            set_ws_connections(2);
            record_ws_eviction();
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let names: Vec<&str> = snapshot
            .iter()
            .map(|(key, _, _, _)| key.key().name())
            .collect();

        for expected in [
            "clubhouse_events_published_total",
            "clubhouse_publish_attempts_total",
            "clubhouse_mentions_resolved_total",
            "clubhouse_fanout_duration_seconds",
            "clubhouse_ws_connections",
            "clubhouse_ws_evictions_total",
        ] {
            assert!(names.contains(&expected), "missing metric {expected}");
        }

        let mentions = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "clubhouse_mentions_resolved_total")
            .map(|(_, _, _, value)| value);
        assert_eq!(mentions, Some(&DebugValue::Counter(3)));
    }
}

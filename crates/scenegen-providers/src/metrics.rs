//! Provider metrics collection.
//!
//! Provides standardized metrics for monitoring provider traffic:
//! - Request counters by provider, operation and outcome
//! - Latency histograms
//! - Downloaded byte counters

use metrics::{counter, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Total provider requests by provider, operation and outcome.
    pub const REQUESTS_TOTAL: &str = "provider_requests_total";

    /// Request latency in seconds by provider and operation.
    pub const LATENCY_SECONDS: &str = "provider_latency_seconds";

    /// Bytes written by successful downloads.
    pub const DOWNLOAD_BYTES_TOTAL: &str = "provider_download_bytes_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record metrics for a completed provider request.
pub fn record_request(provider: &str, operation: &str, outcome: &str, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "provider" => provider.to_string(),
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "provider" => provider.to_string(),
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a completed download.
pub fn record_download(provider: &str, bytes: u64) {
    counter!(
        names::DOWNLOAD_BYTES_TOTAL,
        "provider" => provider.to_string()
    )
    .increment(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::REQUESTS_TOTAL.contains("requests"));
        assert!(names::LATENCY_SECONDS.contains("latency"));
        assert!(names::DOWNLOAD_BYTES_TOTAL.contains("download"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_request("sora2", "submit", "ok", 12.0);
        record_download("sora2", 1024);
    }
}

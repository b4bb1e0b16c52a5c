//! Retry policy and retry helpers.
//!
//! [`RetryPolicy`] carries every knob of the scene lifecycle: polling
//! cadence, per-attempt timeouts and attempt ceilings. [`retry_async`] and
//! [`FailureTracker`] are the generic building blocks the lifecycle uses for
//! downloads and for counting unreadable polls.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Scene retry policy
// ============================================================================

/// Retry behaviour of one scene task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between status queries.
    pub poll_interval: Duration,
    /// Delay before resubmitting or retrying a download.
    pub submit_backoff: Duration,
    /// Per-attempt wall-clock budget of an image job.
    pub image_timeout: Duration,
    /// Per-attempt wall-clock budget of a video job.
    pub video_timeout: Duration,
    /// Video resubmissions after the first attempt.
    pub max_retry_on_timeout: u32,
    /// When false, a video gets exactly one attempt.
    pub timeout_retry_enabled: bool,
    /// Consecutive unreadable polls tolerated before abandoning a job.
    pub max_unknown_polls: u32,
    /// Total download attempts of one artifact URL.
    pub download_attempts: u32,
    /// Image submission ceiling; `None` retries until the provider answers.
    pub max_image_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            submit_backoff: Duration::from_secs(10),
            image_timeout: Duration::from_secs(600),
            video_timeout: Duration::from_secs(1800),
            max_retry_on_timeout: 3,
            timeout_retry_enabled: true,
            max_unknown_polls: 10,
            download_attempts: 3,
            max_image_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Maximum number of video submissions for one scene.
    pub fn video_submissions(&self) -> u32 {
        if self.timeout_retry_enabled {
            self.max_retry_on_timeout.saturating_add(1)
        } else {
            1
        }
    }

    /// Whether another image submission is allowed after `attempts`.
    pub fn allows_image_attempt(&self, attempts: u32) -> bool {
        self.max_image_attempts.map_or(true, |max| attempts < max)
    }

    /// Retry settings for downloading one artifact.
    pub fn download_retry(&self) -> RetryConfig {
        RetryConfig::new("download")
            .with_max_retries(self.download_attempts.saturating_sub(1))
            .with_fixed_delay(self.submit_backoff)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_submit_backoff(mut self, backoff: Duration) -> Self {
        self.submit_backoff = backoff;
        self
    }

    pub fn with_timeouts(mut self, image: Duration, video: Duration) -> Self {
        self.image_timeout = image;
        self.video_timeout = video;
        self
    }

    pub fn with_max_retry_on_timeout(mut self, retries: u32) -> Self {
        self.max_retry_on_timeout = retries;
        self
    }

    pub fn with_max_image_attempts(mut self, max: Option<u32>) -> Self {
        self.max_image_attempts = max;
        self
    }
}

// ============================================================================
// Generic retry
// ============================================================================

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Use the same delay before every retry.
    pub fn with_fixed_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self.max_delay = delay;
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Operation failed after all retries exhausted.
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            RetryResult::Success(v) => Some(v),
            RetryResult::Failed { .. } => None,
        }
    }
}

/// Execute an async operation with retry logic.
pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, operation: F) -> RetryResult<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                let delay = config.delay_for_attempt(attempt);
                debug!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    config.operation_name, attempt, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt + 1,
                }
            }
        }
    }
}

// ============================================================================
// Consecutive failure tracking
// ============================================================================

/// Counts consecutive failures of a repeated operation and suppresses log
/// spam once a threshold is passed.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a successful operation (resets failure count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                "Operation recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failed operation.
    ///
    /// Returns `true` if this failure should be logged (not suppressed).
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.max_logged_failures
            );
            false
        } else {
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether the streak has gone past `limit`.
    pub fn exceeds(&self, limit: u32) -> bool {
        self.consecutive_failures > limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_video_submissions() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.video_submissions(), 4);

        let policy = RetryPolicy::default().with_max_retry_on_timeout(0);
        assert_eq!(policy.video_submissions(), 1);

        let policy = RetryPolicy {
            timeout_retry_enabled: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.video_submissions(), 1);
    }

    #[test]
    fn test_image_attempt_ceiling() {
        let unbounded = RetryPolicy::default();
        assert!(unbounded.allows_image_attempt(10_000));

        let bounded = RetryPolicy::default().with_max_image_attempts(Some(2));
        assert!(bounded.allows_image_attempt(1));
        assert!(!bounded.allows_image_attempt(2));
    }

    #[test]
    fn test_fixed_delay() {
        let config = RetryConfig::new("download").with_fixed_delay(Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(10));
    }

    #[test]
    fn test_retry_config_delay_calculation() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(100));

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(config.delay_for_attempt(40), Duration::from_secs(5));
    }

    #[test]
    fn test_failure_tracker() {
        let mut tracker = FailureTracker::new(2);

        assert!(tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(!tracker.record_failure());
        assert!(tracker.exceeds(2));
        assert!(!tracker.exceeds(3));

        tracker.record_success();
        assert_eq!(tracker.failure_count(), 0);
        assert!(tracker.record_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_retry_gives_up_after_attempts() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = retry_async(&policy.download_retry(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("connection reset") }
        })
        .await;

        assert!(matches!(result, RetryResult::Failed { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_async_eventual_success() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = retry_async(&config, || {
            let count = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err("transient error")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.ok(), Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

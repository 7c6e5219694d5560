//! Wait times and retry policy
//!
//! Status classification is a set of pure functions so the policy can be
//! unit-tested without a network. The only async piece is [`DelayPlanner::wait`].

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::job::PageFetchState;
use crate::infrastructure::config::PolitenessConfig;
use crate::infrastructure::http_client::FetchError;

/// How a fetch attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// 429: back off hardest
    RateLimited,
    /// 502 / 503 / 504 or a transient transport failure
    Transient,
    /// 404 and every other non-success status
    Terminal,
    Success,
}

#[derive(Debug, Clone)]
pub struct DelayPlanner {
    min_delay_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
}

impl DelayPlanner {
    pub fn new(config: &PolitenessConfig) -> Self {
        Self {
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms.max(config.min_delay_ms),
            max_attempts: config.max_fetch_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff multiplier applied to the base resolved delay
    pub fn classify(status: Option<u16>) -> f64 {
        match status {
            Some(429) => 3.0,
            Some(503) => 2.0,
            Some(502 | 504) => 1.5,
            _ => 1.0,
        }
    }

    pub fn classify_status(status: u16) -> ErrorClassification {
        match status {
            200..=299 => ErrorClassification::Success,
            429 => ErrorClassification::RateLimited,
            502..=504 => ErrorClassification::Transient,
            _ => ErrorClassification::Terminal,
        }
    }

    pub fn is_retryable_status(status: u16) -> bool {
        matches!(
            Self::classify_status(status),
            ErrorClassification::RateLimited | ErrorClassification::Transient
        )
    }

    /// Whether the page in `state` gets another attempt.
    ///
    /// `transport_error` is the failure of the last attempt when no status
    /// was received.
    pub fn should_retry(&self, state: &PageFetchState, transport_error: Option<&FetchError>) -> bool {
        if state.attempt_count >= self.max_attempts {
            return false;
        }
        match (transport_error, state.last_status) {
            (Some(error), _) => error.is_transient(),
            (None, Some(status)) => Self::is_retryable_status(status),
            (None, None) => false,
        }
    }

    /// Uniform random delay in `[min_delay_ms, max_delay_ms]`
    pub fn jittered_delay_ms(&self) -> u64 {
        fastrand::u64(self.min_delay_ms..=self.max_delay_ms)
    }

    /// `base_ms` scaled by the status multiplier, never below `Retry-After`
    pub fn backoff_ms(base_ms: u64, status: Option<u16>, retry_after: Option<Duration>) -> u64 {
        let scaled = (base_ms as f64 * Self::classify(status)).round() as u64;
        let floor = retry_after.map_or(0, |d| d.as_millis() as u64);
        scaled.max(floor)
    }

    /// Sleep for `ms`, returning `false` if cancelled first
    pub async fn wait(&self, ms: u64, cancel: &CancellationToken) -> bool {
        debug!(delay_ms = ms, "⏳ Politeness wait");
        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(ms)) => true,
            () = cancel.cancelled() => false,
        }
    }
}

//! Retry and backoff policy for catalog API requests.
//!
//! Classifies request outcomes into retryable and fatal kinds and computes
//! the delay before the next attempt. The [`crate::client`] retry loop is
//! the only caller; everything above it treats a request result as final.

use std::time::Duration;

/// HTTP statuses that are worth retrying.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Why an attempt failed, for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Connection failure, timeout, or a body that could not be read.
    Transport,
    /// The server answered with a non-2xx status.
    Status(u16),
    /// A 2xx body that is not valid JSON.
    Decode,
}

impl OutcomeKind {
    /// Whether this kind can ever be retried.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        match self {
            Self::Transport => true,
            Self::Status(status) => RETRYABLE_STATUSES.contains(&status),
            Self::Decode => false,
        }
    }
}

/// Decision returned by [`BackoffPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again.
    RetryAfter(Duration),
    /// Stop retrying and surface the failure.
    GiveUp,
}

/// Random jitter added on top of every backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter; delays are fully deterministic.
    None,
    /// Uniform jitter in `[0, max)`.
    Uniform(Duration),
}

impl Jitter {
    fn sample(self) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Uniform(max) => max.mul_f64(rand::random::<f64>()),
        }
    }
}

/// Exponential backoff capped at `cap`, honouring server-suggested delays.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Number of retries allowed after the first attempt.
    pub max_retries: u32,
    /// Upper bound on the exponential delay.
    pub cap: Duration,
    /// Jitter added to every delay.
    pub jitter: Jitter,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            cap: Duration::from_secs(8),
            jitter: Jitter::Uniform(Duration::from_secs(1)),
        }
    }
}

impl BackoffPolicy {
    /// Decides whether to retry after a failed attempt.
    ///
    /// `attempt` is the zero-based index of the attempt that just failed,
    /// so a policy with `max_retries = 6` allows attempts `0..=6`. The
    /// `server_delay` (usually a `Retry-After` header) replaces the
    /// exponential delay when present.
    #[must_use]
    pub fn decide(
        &self,
        attempt: u32,
        kind: OutcomeKind,
        server_delay: Option<Duration>,
    ) -> RetryDecision {
        if attempt >= self.max_retries || !kind.is_retryable() {
            return RetryDecision::GiveUp;
        }

        let base = server_delay.unwrap_or_else(|| self.exponential(attempt));
        RetryDecision::RetryAfter(base + self.jitter.sample())
    }

    /// `min(2^attempt seconds, cap)`.
    fn exponential(&self, attempt: u32) -> Duration {
        let secs = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.cap)
    }
}

/// Parses a `Retry-After` header given in (possibly fractional) seconds.
///
/// HTTP-date values and negative or non-finite numbers yield `None`, which
/// makes the policy fall back to exponential backoff.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

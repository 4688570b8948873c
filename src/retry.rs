//! Retry policies and predicates for handling transient failures.
//!
//! A call's retry behaviour is configured with [`Retry`], either as a bare
//! count or as a full [`RetryPolicy`]. At send time it is resolved into
//! [`RetrySettings`], which the executor consults after every failed
//! attempt.
//!
//! Waits grow exponentially with the attempt index and carry up to 10% of
//! random jitter, capped at a ceiling:
//!
//! ```text
//! wait(i) = min(delay * 2^i * (1 + 0.1 * U[0, 1)), max_delay)
//! ```

use crate::transport::{ResponseHead, TransportError};
use http::StatusCode;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Retries used when a call configures none.
pub const DEFAULT_MAX_RETRIES: u32 = 0;

/// Base delay before the first retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Ceiling for any single backoff wait.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Status codes retried when no predicate is configured.
pub const DEFAULT_RETRY_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Retry configuration for a call.
///
/// # Examples
///
/// ```
/// use courier::{Retry, RetryPolicy, ShouldRetry};
/// use std::time::Duration;
///
/// // Up to 3 retries with the default delay and status list.
/// let simple: Retry = 3.into();
///
/// // Up to 2 retries, 100ms base delay, only on 500.
/// let custom: Retry = RetryPolicy::new(2)
///     .delay(Duration::from_millis(100))
///     .should_retry(ShouldRetry::statuses([500]))
///     .into();
/// ```
#[derive(Debug, Clone)]
pub enum Retry {
    /// Maximum number of retries, with default delay and status list.
    Count(u32),
    /// A fully specified policy.
    Policy(RetryPolicy),
}

impl From<u32> for Retry {
    fn from(max_retries: u32) -> Self {
        Retry::Count(max_retries)
    }
}

impl From<RetryPolicy> for Retry {
    fn from(policy: RetryPolicy) -> Self {
        Retry::Policy(policy)
    }
}

/// A structured retry policy. Unset fields take the defaults.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Retries after the first attempt, so `max_retries + 1` attempts total.
    pub max_retries: u32,
    pub delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    pub should_retry: Option<ShouldRetry>,
}

impl RetryPolicy {
    /// Creates a policy with the default delay and retryable statuses.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Sets the base delay before the first retry.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the ceiling for a single backoff wait.
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Sets the retry decision.
    pub fn should_retry(mut self, should_retry: ShouldRetry) -> Self {
        self.should_retry = Some(should_retry);
        self
    }
}

/// What went wrong on a failed attempt.
#[derive(Debug, Clone, Copy)]
pub enum AttemptFailure<'a> {
    /// The transport answered with a non-2xx status.
    Response(&'a ResponseHead),
    /// The transport failed without a response.
    Error(&'a TransportError),
}

impl AttemptFailure<'_> {
    /// The response status, when the attempt produced a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AttemptFailure::Response(head) => Some(head.status),
            AttemptFailure::Error(_) => None,
        }
    }
}

/// Trait for deciding whether a failed attempt should be retried.
///
/// `attempt` is the zero-based index of the attempt that just failed.
///
/// # Examples
///
/// ```
/// use courier::{AttemptFailure, RetryPredicate};
///
/// struct RetryOnRateLimit;
///
/// impl RetryPredicate for RetryOnRateLimit {
///     fn should_retry(&self, failure: &AttemptFailure<'_>, _attempt: u32) -> bool {
///         failure.status().map_or(false, |status| status.as_u16() == 429)
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    fn should_retry(&self, failure: &AttemptFailure<'_>, attempt: u32) -> bool;
}

struct FnPredicate<F>(F);

impl<F> RetryPredicate for FnPredicate<F>
where
    F: Fn(&AttemptFailure<'_>, u32) -> bool + Send + Sync,
{
    fn should_retry(&self, failure: &AttemptFailure<'_>, attempt: u32) -> bool {
        (self.0)(failure, attempt)
    }
}

/// The retry decision: a fixed status set or an arbitrary predicate.
///
/// The status-set form retries responses whose status is in the set, and
/// retries every transport error except aborts. That is broader than the
/// set itself, so non-idempotent calls (POST) may be repeated after a
/// connection failure. Use a predicate to be stricter.
#[derive(Clone)]
pub enum ShouldRetry {
    Statuses(Vec<u16>),
    Predicate(Arc<dyn RetryPredicate>),
}

impl ShouldRetry {
    /// Retries the given statuses and any transport failure other than an abort.
    pub fn statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
        ShouldRetry::Statuses(statuses.into_iter().collect())
    }

    /// Wraps a closure as a predicate.
    ///
    /// ```
    /// use courier::{AttemptFailure, ShouldRetry};
    ///
    /// // Retry connection failures only, never HTTP statuses.
    /// let should_retry = ShouldRetry::predicate(|failure, _attempt| {
    ///     matches!(failure, AttemptFailure::Error(_))
    /// });
    /// ```
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&AttemptFailure<'_>, u32) -> bool + Send + Sync + 'static,
    {
        ShouldRetry::Predicate(Arc::new(FnPredicate(f)))
    }

    /// Wraps a [`RetryPredicate`] implementation.
    pub fn custom(predicate: impl RetryPredicate + 'static) -> Self {
        ShouldRetry::Predicate(Arc::new(predicate))
    }

    /// Single dispatch point for both forms.
    pub fn should_retry(&self, failure: &AttemptFailure<'_>, attempt: u32) -> bool {
        match self {
            ShouldRetry::Statuses(statuses) => match failure {
                AttemptFailure::Response(head) => statuses.contains(&head.status.as_u16()),
                AttemptFailure::Error(error) => !error.is_abort(),
            },
            ShouldRetry::Predicate(predicate) => predicate.should_retry(failure, attempt),
        }
    }
}

impl Default for ShouldRetry {
    fn default() -> Self {
        ShouldRetry::Statuses(DEFAULT_RETRY_STATUSES.to_vec())
    }
}

impl fmt::Debug for ShouldRetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShouldRetry::Statuses(statuses) => f.debug_tuple("Statuses").field(statuses).finish(),
            ShouldRetry::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Combine multiple retry predicates with OR logic.
///
/// Retries if ANY of the predicates return `true`.
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    /// Creates a new `OrPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, failure: &AttemptFailure<'_>, attempt: u32) -> bool {
        self.predicates
            .iter()
            .any(|p| p.should_retry(failure, attempt))
    }
}

/// Combine multiple retry predicates with AND logic.
///
/// Retries only if ALL of the predicates return `true`.
pub struct AndPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl AndPredicate {
    /// Creates a new `AndPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for AndPredicate {
    fn should_retry(&self, failure: &AttemptFailure<'_>, attempt: u32) -> bool {
        self.predicates
            .iter()
            .all(|p| p.should_retry(failure, attempt))
    }
}

/// Retry configuration with every default filled in.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub delay: Duration,
    pub max_delay: Duration,
    pub should_retry: ShouldRetry,
}

impl RetrySettings {
    /// Resolves a call's retry configuration.
    ///
    /// A bare count keeps the default delay and status list, a policy
    /// overrides whatever it sets, and no configuration at all yields
    /// [`DEFAULT_MAX_RETRIES`].
    pub fn resolve(retry: Option<&Retry>) -> Self {
        match retry {
            Some(Retry::Count(max_retries)) => Self {
                max_retries: *max_retries,
                ..Self::default()
            },
            Some(Retry::Policy(policy)) => Self {
                max_retries: policy.max_retries,
                delay: policy.delay.unwrap_or(DEFAULT_RETRY_DELAY),
                max_delay: policy.max_delay.unwrap_or(DEFAULT_MAX_DELAY),
                should_retry: policy.should_retry.clone().unwrap_or_default(),
            },
            None => Self::default(),
        }
    }

    /// Total transport invocations allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns the wait after the attempt with zero-based index `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff(attempt, rand::thread_rng().gen::<f64>())
    }

    /// `sample` is the jitter draw in `[0, 1)`.
    fn backoff(&self, attempt: u32, sample: f64) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        let base = self.delay.saturating_mul(multiplier);
        let jitter = base.mul_f64(0.1 * sample.clamp(0.0, 1.0));
        base.saturating_add(jitter).min(self.max_delay)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            should_retry: ShouldRetry::default(),
        }
    }
}

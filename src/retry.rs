//! Retry policies and predicates for transient transport failures.
//!
//! A [`RetryPolicy`] bounds how many attempts one call may make and how long
//! to sleep between them. A [`RetryPredicate`] decides whether a particular
//! attempt outcome is worth another try; it is told whether the call is
//! idempotent, because repeating a write after the server may already have
//! acted on it can duplicate side effects.

use crate::transport::TransportFailure;
use http::StatusCode;
use rand::Rng;
use std::time::Duration;

/// The delay schedule between attempts.
///
/// # Examples
///
/// ```
/// use mysale_client::retry::Backoff;
/// use std::time::Duration;
///
/// // 100ms, 200ms, 400ms, ... capped at 5s
/// let backoff = Backoff::Exponential {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(5),
///     jitter: false,
/// };
/// assert_eq!(backoff.delay_for_retry(3), Some(Duration::from_millis(400)));
/// ```
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Retry immediately.
    Immediate,

    /// Wait the same amount before every retry.
    Fixed(Duration),

    /// Wait `initial_delay * 2^(retry - 1)`, capped at `max_delay`.
    ///
    /// With `jitter`, each delay is scaled by a random factor in `[0.5, 1.0]`
    /// so that clients failing together do not retry together.
    Exponential {
        initial_delay: Duration,
        max_delay: Duration,
        jitter: bool,
    },

    /// Takes the retry number (1 = first retry) and returns the delay, or
    /// `None` to stop retrying early.
    Custom(fn(retry: usize) -> Option<Duration>),
}

impl Backoff {
    /// Returns the delay before the given retry (1-indexed), or `None` to stop.
    pub fn delay_for_retry(&self, retry: usize) -> Option<Duration> {
        match self {
            Backoff::Immediate => Some(Duration::ZERO),
            Backoff::Fixed(delay) => Some(*delay),
            Backoff::Exponential {
                initial_delay,
                max_delay,
                jitter,
            } => {
                let multiplier = 2u32.saturating_pow(retry.saturating_sub(1) as u32);
                let delay = initial_delay.saturating_mul(multiplier).min(*max_delay);

                if *jitter {
                    let factor = rand::thread_rng().gen_range(0.5..=1.0);
                    Some(delay.mul_f64(factor))
                } else {
                    Some(delay)
                }
            }
            Backoff::Custom(delay_fn) => delay_fn(retry),
        }
    }
}

/// How many attempts a call may make and how to space them.
///
/// `max_attempts` counts the first attempt, so `max_attempts: 1` disables
/// retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Upper bound on attempts, including the first.
    pub max_attempts: usize,

    /// Delay schedule between attempts.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Three attempts, exponential backoff from 200ms capped at 5s, with jitter.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                initial_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(5),
                jitter: true,
            },
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// A single attempt, never retried.
    pub fn none() -> Self {
        Self::new(1, Backoff::Immediate)
    }

    /// Returns the delay before the next attempt, given how many attempts have
    /// already been made, or `None` if the budget is spent.
    pub fn delay_after(&self, attempts_made: usize) -> Option<Duration> {
        if attempts_made >= self.max_attempts {
            return None;
        }
        self.backoff.delay_for_retry(attempts_made)
    }

    /// Checks the policy invariants.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `max_attempts` is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_attempts == 0 {
            return Err(crate::Error::Configuration(
                "retry policy must allow at least one attempt".to_string(),
            ));
        }
        Ok(())
    }
}

/// The outcome of a single attempt, as seen by a [`RetryPredicate`].
#[derive(Debug)]
pub enum AttemptOutcome<'a> {
    /// No HTTP response was obtained.
    Failed(&'a TransportFailure),

    /// The server answered with a non-2xx status.
    Responded(StatusCode),
}

/// Decides whether an attempt should be repeated.
///
/// # Examples
///
/// ```
/// use mysale_client::retry::{AttemptOutcome, RetryPredicate};
///
/// /// Also retries 429 on reads.
/// struct RetryOnTooManyRequests;
///
/// impl RetryPredicate for RetryOnTooManyRequests {
///     fn should_retry(&self, outcome: &AttemptOutcome<'_>, idempotent: bool, _attempt: usize) -> bool {
///         idempotent && matches!(outcome, AttemptOutcome::Responded(s) if s.as_u16() == 429)
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` to try again.
    ///
    /// # Arguments
    ///
    /// * `outcome` - What happened on this attempt
    /// * `idempotent` - Whether the call is safe to repeat
    /// * `attempt` - The attempt number (1-indexed)
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, idempotent: bool, attempt: usize) -> bool;
}

/// The default predicate.
///
/// - Connection failures and resets before any response (see
///   [`TransportFailure::is_pre_send`]) are retried for every call.
/// - Timeouts, other network errors and 5xx responses are retried only for
///   idempotent calls.
/// - 4xx responses are never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTransient;

impl RetryPredicate for RetryOnTransient {
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, idempotent: bool, _attempt: usize) -> bool {
        match outcome {
            AttemptOutcome::Failed(failure) => failure.is_pre_send() || idempotent,
            AttemptOutcome::Responded(status) => idempotent && status.is_server_error(),
        }
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy)]
pub struct NeverRetry;

impl RetryPredicate for NeverRetry {
    fn should_retry(&self, _outcome: &AttemptOutcome<'_>, _idempotent: bool, _attempt: usize) -> bool {
        false
    }
}

/// Retries the listed statuses on idempotent calls.
#[derive(Debug, Clone)]
pub struct RetryOnStatus(pub Vec<StatusCode>);

impl RetryPredicate for RetryOnStatus {
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, idempotent: bool, _attempt: usize) -> bool {
        idempotent && matches!(outcome, AttemptOutcome::Responded(s) if self.0.contains(s))
    }
}

/// Combine multiple retry predicates with OR logic.
///
/// # Examples
///
/// ```
/// use http::StatusCode;
/// use mysale_client::retry::{OrPredicate, RetryOnStatus, RetryOnTransient};
///
/// let predicate = OrPredicate::new(vec![
///     Box::new(RetryOnTransient),
///     Box::new(RetryOnStatus(vec![StatusCode::TOO_MANY_REQUESTS])),
/// ]);
/// ```
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, idempotent: bool, attempt: usize) -> bool {
        self.predicates
            .iter()
            .any(|p| p.should_retry(outcome, idempotent, attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_delays() {
        let backoff = Backoff::Exponential {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay_for_retry(1), Some(Duration::from_millis(100)));
        assert_eq!(backoff.delay_for_retry(2), Some(Duration::from_millis(200)));
        assert_eq!(backoff.delay_for_retry(4), Some(Duration::from_millis(800)));
        assert_eq!(backoff.delay_for_retry(5), Some(Duration::from_secs(1)));
        assert_eq!(backoff.delay_for_retry(64), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_jitter_stays_within_half_to_full_delay() {
        let backoff = Backoff::Exponential {
            initial_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(10),
            jitter: true,
        };

        for _ in 0..100 {
            let delay = backoff.delay_for_retry(1).unwrap();
            assert!(delay >= Duration::from_millis(200) && delay <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_policy_counts_first_attempt() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(10)));

        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(10)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(10)));
        assert_eq!(policy.delay_after(3), None);

        assert_eq!(RetryPolicy::none().delay_after(1), None);
        assert!(RetryPolicy::new(0, Backoff::Immediate).validate().is_err());
    }

    #[test]
    fn test_custom_backoff_can_stop_early() {
        fn only_once(retry: usize) -> Option<Duration> {
            (retry == 1).then_some(Duration::from_millis(5))
        }

        let policy = RetryPolicy::new(10, Backoff::Custom(only_once));
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(5)));
        assert_eq!(policy.delay_after(2), None);
    }

    #[test]
    fn test_transient_predicate_respects_idempotency() {
        let p = RetryOnTransient;
        let connect = TransportFailure::Connect("connection refused".into());
        let reset = TransportFailure::Reset("connection reset by peer".into());
        let dropped = TransportFailure::Network("connection closed mid-body".into());
        let timeout = TransportFailure::Timeout(Duration::from_secs(1));

        assert!(p.should_retry(&AttemptOutcome::Failed(&connect), false, 1));
        assert!(p.should_retry(&AttemptOutcome::Failed(&connect), true, 1));
        assert!(p.should_retry(&AttemptOutcome::Failed(&reset), false, 1));
        assert!(p.should_retry(&AttemptOutcome::Failed(&reset), true, 1));
        assert!(!p.should_retry(&AttemptOutcome::Failed(&dropped), false, 1));
        assert!(p.should_retry(&AttemptOutcome::Failed(&dropped), true, 1));
        assert!(!p.should_retry(&AttemptOutcome::Failed(&timeout), false, 1));

        let unavailable = AttemptOutcome::Responded(StatusCode::SERVICE_UNAVAILABLE);
        assert!(p.should_retry(&unavailable, true, 1));
        assert!(!p.should_retry(&unavailable, false, 1));

        let not_found = AttemptOutcome::Responded(StatusCode::NOT_FOUND);
        assert!(!p.should_retry(&not_found, true, 1));
    }

    #[test]
    fn test_or_predicate() {
        let p = OrPredicate::new(vec![
            Box::new(NeverRetry),
            Box::new(RetryOnStatus(vec![StatusCode::TOO_MANY_REQUESTS])),
        ]);

        let limited = AttemptOutcome::Responded(StatusCode::TOO_MANY_REQUESTS);
        assert!(p.should_retry(&limited, true, 1));
        assert!(!p.should_retry(&limited, false, 1));
    }
}

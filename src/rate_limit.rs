//! Client-side rate limiting and server rate-limit hints.
//!
//! [`TokenBucket`] is the local throttle every outbound call passes through:
//! a continuous token bucket holding at most `capacity` tokens and refilling
//! at `refill_rate` tokens per second. Refill is computed lazily from the time
//! elapsed since the previous acquisition decision, so no background timer is
//! needed.
//!
//! [`RateLimitInfo`] captures what the server said about its own limits
//! (`Retry-After`, `X-RateLimit-*` headers) so callers can back off after a
//! 429.
//!
//! # Fairness
//!
//! Waiters are not queued. When several tasks wait for tokens, whichever task
//! the scheduler wakes first after a refill wins; there is no FIFO guarantee.

use http::HeaderMap;
use parking_lot::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

// Absorbs floating point drift so a waiter woken exactly at its deadline is
// granted instead of looping on a sub-nanosecond shortfall.
const EPSILON: f64 = 1e-9;

const MIN_WAIT: Duration = Duration::from_millis(1);

// Longest single sleep; a waiter re-checks the bucket at least this often.
const MAX_WAIT: Duration = Duration::from_secs(3600);

/// What `acquire` does when the bucket is short of tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Suspend until enough tokens have refilled.
    #[default]
    Wait,
    /// Fail immediately with [`AcquireError::Exhausted`].
    FailFast,
}

/// Parameters of the local token bucket.
///
/// # Examples
///
/// ```
/// use mysale_client::rate_limit::{RateLimitConfig, WaitPolicy};
///
/// let config = RateLimitConfig::builder()
///     .capacity(20)
///     .refill_rate(5.0)
///     .wait_policy(WaitPolicy::Wait)
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum number of tokens the bucket holds, i.e. the largest burst.
    pub capacity: u32,

    /// Tokens added per second.
    pub refill_rate: f64,

    /// Behavior when tokens are short.
    pub wait_policy: WaitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_rate: 5.0,
            wait_policy: WaitPolicy::Wait,
        }
    }
}

impl RateLimitConfig {
    /// Creates a waiting bucket configuration.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            wait_policy: WaitPolicy::Wait,
        }
    }

    /// Creates a new builder starting from the defaults.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::default()
    }

    /// Checks the bucket invariants.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the capacity is zero or the refill
    /// rate is not a positive finite number.
    pub fn validate(&self) -> crate::Result<()> {
        if self.capacity == 0 {
            return Err(crate::Error::Configuration(
                "rate limit capacity must be at least 1".to_string(),
            ));
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(crate::Error::Configuration(format!(
                "rate limit refill rate must be a positive number, got {}",
                self.refill_rate
            )));
        }
        Ok(())
    }
}

/// Builder for `RateLimitConfig`.
#[derive(Default)]
pub struct RateLimitConfigBuilder {
    capacity: Option<u32>,
    refill_rate: Option<f64>,
    wait_policy: Option<WaitPolicy>,
}

impl RateLimitConfigBuilder {
    /// Sets the bucket capacity.
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Sets the refill rate in tokens per second.
    pub fn refill_rate(mut self, tokens_per_second: f64) -> Self {
        self.refill_rate = Some(tokens_per_second);
        self
    }

    /// Sets the wait policy.
    pub fn wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.wait_policy = Some(policy);
        self
    }

    /// Builds the `RateLimitConfig`.
    pub fn build(self) -> RateLimitConfig {
        let default = RateLimitConfig::default();
        RateLimitConfig {
            capacity: self.capacity.unwrap_or(default.capacity),
            refill_rate: self.refill_rate.unwrap_or(default.refill_rate),
            wait_policy: self.wait_policy.unwrap_or(default.wait_policy),
        }
    }
}

/// Why a token acquisition was refused.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum AcquireError {
    /// The request costs more than the bucket can ever hold.
    #[error("cost of {cost} tokens exceeds bucket capacity of {capacity}")]
    CostExceedsCapacity { cost: u32, capacity: u32 },

    /// Tokens were short and the bucket is configured not to wait.
    #[error("{cost} tokens requested but only {available:.2} available")]
    Exhausted { cost: u32, available: f64 },
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, capacity: f64, rate: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(capacity);
        self.last_refill = now;
    }
}

/// A continuous token bucket shared by every call of one client.
///
/// The bucket starts full. Each acquisition decision (refill, compare, debit)
/// happens under a single lock, and tokens are debited only at the moment
/// they are granted, so dropping a waiting `acquire` future leaves the bucket
/// untouched.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_rate: f64,
    wait_policy: WaitPolicy,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` fails [`RateLimitConfig::validate`].
    pub fn new(config: &RateLimitConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            capacity: config.capacity,
            refill_rate: config.refill_rate,
            wait_policy: config.wait_policy,
            state: Mutex::new(BucketState {
                tokens: f64::from(config.capacity),
                last_refill: Instant::now(),
            }),
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Tokens available right now, without mutating the bucket.
    pub fn available(&self) -> f64 {
        let state = self.state.lock();
        let elapsed = Instant::now().saturating_duration_since(state.last_refill);
        (state.tokens + elapsed.as_secs_f64() * self.refill_rate).min(f64::from(self.capacity))
    }

    /// Waits until `cost` tokens are available, then debits them.
    ///
    /// `acquire(0)` returns immediately and leaves the bucket unchanged.
    ///
    /// # Errors
    ///
    /// - [`AcquireError::CostExceedsCapacity`] if `cost` can never be satisfied.
    /// - [`AcquireError::Exhausted`] if tokens are short under [`WaitPolicy::FailFast`].
    pub async fn acquire(&self, cost: u32) -> Result<(), AcquireError> {
        if cost == 0 {
            return Ok(());
        }
        if cost > self.capacity {
            return Err(AcquireError::CostExceedsCapacity {
                cost,
                capacity: self.capacity,
            });
        }

        let needed = f64::from(cost);
        loop {
            let wait = {
                let mut state = self.state.lock();
                state.refill(f64::from(self.capacity), self.refill_rate, Instant::now());

                if state.tokens + EPSILON >= needed {
                    state.tokens = (state.tokens - needed).max(0.0);
                    return Ok(());
                }

                if self.wait_policy == WaitPolicy::FailFast {
                    return Err(AcquireError::Exhausted {
                        cost,
                        available: state.tokens,
                    });
                }

                Duration::try_from_secs_f64((needed - state.tokens) / self.refill_rate)
                    .unwrap_or(MAX_WAIT)
                    .clamp(MIN_WAIT, MAX_WAIT)
            };

            tracing::debug!(
                cost = cost,
                wait_ms = wait.as_millis() as u64,
                "Waiting for rate limit tokens"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// Rate limit information the server attached to a response.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitInfo {
    /// When the server-side window resets (`X-RateLimit-Reset` / `RateLimit-Reset`).
    pub reset_at: Option<SystemTime>,

    /// How long the server asked us to wait (`Retry-After`).
    pub retry_after: Option<Duration>,

    /// Requests left in the current server-side window.
    pub remaining: Option<u64>,
}

impl RateLimitInfo {
    /// Extracts rate limit information from response headers.
    ///
    /// `Retry-After` is accepted both as delay-seconds and as an HTTP date.
    ///
    /// # Examples
    ///
    /// ```
    /// use mysale_client::rate_limit::RateLimitInfo;
    /// use http::HeaderMap;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "60".parse().unwrap());
    ///
    /// let info = RateLimitInfo::from_headers(&headers);
    /// assert_eq!(info.retry_after, Some(std::time::Duration::from_secs(60)));
    /// assert!(info.is_rate_limited());
    /// ```
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            reset_at: parse_reset(headers),
            retry_after: parse_retry_after(headers),
            remaining: header_u64(headers, "x-ratelimit-remaining"),
        }
    }

    /// Recommended delay before trying again, capped at `max_wait`.
    ///
    /// Prefers `Retry-After`; falls back to the time until `reset_at`.
    pub fn delay(&self, max_wait: Duration) -> Option<Duration> {
        if let Some(retry_after) = self.retry_after {
            return Some(retry_after.min(max_wait));
        }
        let until_reset = self.reset_at?.duration_since(SystemTime::now()).ok()?;
        Some(until_reset.min(max_wait))
    }

    /// `true` if the server signalled an active limit.
    pub fn is_rate_limited(&self) -> bool {
        self.retry_after.is_some() || self.remaining == Some(0)
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(seconds) = header_u64(headers, "retry-after") {
        return Some(Duration::from_secs(seconds));
    }
    let date = httpdate::parse_http_date(headers.get("retry-after")?.to_str().ok()?).ok()?;
    date.duration_since(SystemTime::now()).ok()
}

fn parse_reset(headers: &HeaderMap) -> Option<SystemTime> {
    ["x-ratelimit-reset", "ratelimit-reset"]
        .iter()
        .find_map(|name| header_u64(headers, name))
        .map(|timestamp| UNIX_EPOCH + Duration::from_secs(timestamp))
}

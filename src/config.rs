//! Client configuration.
//!
//! Everything the client needs is passed in explicitly through
//! [`ClientConfig`]; nothing is read from the environment. Loading these
//! values from files or secrets stores is the application's job.

use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryPolicy;
use http::{HeaderMap, HeaderValue};
use std::fmt;
use std::time::Duration;
use url::Url;

/// An API bearer token.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Reveals the raw token.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The `Authorization` header value, marked sensitive.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the token is empty or contains
    /// characters that are not allowed in a header.
    pub fn authorization(&self) -> crate::Result<HeaderValue> {
        if self.0.trim().is_empty() {
            return Err(crate::Error::Configuration("API token is empty".to_string()));
        }
        let mut value = HeaderValue::try_from(format!("Bearer {}", self.0)).map_err(|_| {
            crate::Error::Configuration("API token contains invalid characters".to_string())
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(****)")
    }
}

impl From<&str> for ApiToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for ApiToken {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

/// The full, immutable configuration of a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root URL every endpoint path is appended to.
    pub base_url: Url,

    /// Credential sent with every request.
    pub credential: ApiToken,

    /// Timeout applied to each individual attempt. `None` waits indefinitely.
    pub timeout: Option<Duration>,

    /// Attempt budget and backoff schedule.
    pub retry_policy: RetryPolicy,

    /// Local token bucket parameters.
    pub rate_limit: RateLimitConfig,

    /// Headers added to every request, before per-call headers.
    pub default_headers: HeaderMap,
}

impl ClientConfig {
    /// Default per-attempt timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// A configuration with default timeout, retry and rate-limit settings.
    pub fn new(base_url: Url, credential: impl Into<ApiToken>) -> Self {
        Self {
            base_url,
            credential: credential.into(),
            timeout: Some(Self::DEFAULT_TIMEOUT),
            retry_policy: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            default_headers: HeaderMap::new(),
        }
    }

    /// Checks every nested invariant.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found.
    pub fn validate(&self) -> crate::Result<()> {
        self.credential.authorization()?;
        self.retry_policy.validate()?;
        self.rate_limit.validate()?;
        if self.timeout == Some(Duration::ZERO) {
            return Err(crate::Error::Configuration(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_redacted() {
        let token = ApiToken::new("super-secret");
        assert_eq!(format!("{:?}", token), "ApiToken(****)");

        let config = ClientConfig::new(Url::parse("https://api.example.com").unwrap(), token);
        assert!(!format!("{:?}", config).contains("super-secret"));
    }

    #[test]
    fn test_authorization_header() {
        let value = ApiToken::new("abc").authorization().unwrap();
        assert_eq!(value, "Bearer abc");
        assert!(value.is_sensitive());

        assert!(ApiToken::new("  ").authorization().is_err());
        assert!(ApiToken::new("bad\ntoken").authorization().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = ClientConfig::new(Url::parse("https://api.example.com").unwrap(), "t");
        assert!(config.validate().is_ok());

        config.timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}

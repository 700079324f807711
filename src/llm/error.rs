//! Chat-completion errors and the retry policy applied to them.
//!
//! Transient failures (rate limits, 5xx, network) are retried inside the client with
//! backoff; everything else surfaces to the caller on the first attempt.

use std::time::Duration;

/// Upper bound on a single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Error from a chat-completions endpoint.
#[derive(Debug)]
pub struct LlmError {
    pub kind: LlmErrorKind,
    /// HTTP status, when the server answered
    pub status_code: Option<u16>,
    pub message: String,
    /// From the `Retry-After` header
    pub retry_after: Option<Duration>,
}

impl LlmError {
    fn new(kind: LlmErrorKind, status_code: Option<u16>, message: String) -> Self {
        Self {
            kind,
            status_code,
            message,
            retry_after: None,
        }
    }

    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(LlmErrorKind::RateLimited, Some(429), message)
        }
    }

    /// Error for a non-success HTTP status.
    pub fn from_status(status_code: u16, message: String, retry_after: Option<Duration>) -> Self {
        match classify_http_status(status_code) {
            LlmErrorKind::RateLimited => Self::rate_limited(message, retry_after),
            kind => Self::new(kind, Some(status_code), message),
        }
    }

    pub fn network_error(message: String) -> Self {
        Self::new(LlmErrorKind::NetworkError, None, message)
    }

    pub fn parse_error(message: String) -> Self {
        Self::new(LlmErrorKind::ParseError, None, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Delay before retry `attempt` (0-based).
    ///
    /// A server-provided `Retry-After` wins; otherwise exponential backoff from a
    /// per-kind base, capped at one minute.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(retry_after) = self.retry_after {
            return retry_after;
        }

        let base = match self.kind {
            LlmErrorKind::RateLimited => Duration::from_secs(5),
            LlmErrorKind::ServerError => Duration::from_secs(2),
            _ => Duration::from_secs(1),
        };
        base.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_DELAY)
    }
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for LlmError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// 429
    RateLimited,
    /// 5xx
    ServerError,
    /// Other 4xx: bad request, auth, unknown model
    ClientError,
    /// Connection failures and request timeouts
    NetworkError,
    /// The body was not a chat completion
    ParseError,
}

impl LlmErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmErrorKind::RateLimited | LlmErrorKind::ServerError | LlmErrorKind::NetworkError
        )
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmErrorKind::RateLimited => write!(f, "Rate limited"),
            LlmErrorKind::ServerError => write!(f, "Server error"),
            LlmErrorKind::ClientError => write!(f, "Client error"),
            LlmErrorKind::NetworkError => write!(f, "Network error"),
            LlmErrorKind::ParseError => write!(f, "Parse error"),
        }
    }
}

/// How hard the client tries before giving up.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Wall-clock budget across all attempts
    pub max_retry_duration: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_duration: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    pub fn should_retry(&self, error: &LlmError, attempt: u32) -> bool {
        error.is_transient() && attempt < self.max_retries
    }
}

pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_classification() {
        assert_eq!(classify_http_status(429), LlmErrorKind::RateLimited);
        assert_eq!(classify_http_status(500), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(503), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(401), LlmErrorKind::ClientError);
        assert_eq!(classify_http_status(404), LlmErrorKind::ClientError);
    }

    #[test]
    fn test_retry_policy() {
        let config = RetryConfig::default();
        let limited = LlmError::from_status(429, "slow down".to_string(), None);
        let unauthorized = LlmError::from_status(401, "bad key".to_string(), None);

        assert!(config.should_retry(&limited, 0));
        assert!(!config.should_retry(&limited, 3));
        assert!(!config.should_retry(&unauthorized, 0));
        assert!(!config.should_retry(&LlmError::parse_error("{".to_string()), 0));
    }

    #[test]
    fn test_exponential_backoff() {
        let error = LlmError::from_status(502, "bad gateway".to_string(), None);
        assert_eq!(error.suggested_delay(0), Duration::from_secs(2));
        assert_eq!(error.suggested_delay(1), Duration::from_secs(4));
        assert_eq!(error.suggested_delay(2), Duration::from_secs(8));
        assert_eq!(error.suggested_delay(10), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_after_respected() {
        let error = LlmError::from_status(429, "slow down".to_string(), Some(Duration::from_secs(30)));
        assert_eq!(error.kind, LlmErrorKind::RateLimited);
        assert_eq!(error.suggested_delay(0), Duration::from_secs(30));
        assert_eq!(error.suggested_delay(5), Duration::from_secs(30));
    }
}

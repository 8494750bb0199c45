//! HTTP client error types.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::Response;

/// Result type for HTTP client operations.
pub type Result<T> = std::result::Result<T, HttpClientError>;

/// Boxed error produced by a custom transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// Every permitted attempt failed.
    ///
    /// `errors` lists one entry per attempt, oldest first. `response` is the
    /// response of the last attempt, if it produced one (e.g. a final 500).
    #[error("request failed after {attempts} {}: {errors}", attempt_noun(.attempts))]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Errors of all attempts, in order.
        #[source]
        errors: MultiError,
        /// Last response received, if any.
        response: Option<Box<Response>>,
    },

    /// The call was cancelled through its cancellation token.
    #[error("request cancelled")]
    Cancelled {
        /// Last response received before cancellation, if any.
        response: Option<Box<Response>>,
    },

    /// The server answered with a retryable status (>= 500 or 429).
    #[error("server error: {status}")]
    ServerError {
        /// HTTP status code.
        status: u16,
    },

    /// Circuit breaker is open for the command, request rejected.
    #[error("circuit breaker open for command '{command}'")]
    CircuitOpen {
        /// Breaker command name.
        command: String,
    },

    /// Breaker refused the call because the command's concurrency ceiling was hit.
    #[error("max concurrency reached for command '{command}'")]
    MaxConcurrency {
        /// Breaker command name.
        command: String,
    },

    /// Breaker gave up waiting on the guarded call.
    #[error("command '{command}' timed out after {timeout:?}")]
    CommandTimeout {
        /// Breaker command name.
        command: String,
        /// Configured command timeout.
        timeout: Duration,
    },

    /// Fallback function failed.
    #[error("fallback failed with '{error}', run error was '{run_error}'")]
    Fallback {
        /// Error returned by the fallback.
        error: String,
        /// Error that triggered the fallback.
        run_error: String,
    },

    /// A fallback suppressed the failure but the attempt produced no response.
    #[error("failure suppressed by fallback but no response was received")]
    NoResponse,

    /// The URL scheme cannot be sent by the transport.
    #[error("unsupported protocol scheme \"{0}\"")]
    UnsupportedScheme(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Error raised by a custom transport.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// Invalid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Request building error.
    #[error("failed to build request: {0}")]
    RequestBuild(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Response body is not valid UTF-8.
    #[error("decode error: {0}")]
    Decode(String),

    /// Underlying HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpClientError {
    /// Wrap an arbitrary transport error.
    pub fn transport(error: impl Into<BoxError>) -> Self {
        Self::Transport(error.into())
    }

    /// Check if this error ended the call because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check if this error was raised by the circuit breaker rather than the transport.
    pub fn is_breaker(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen { .. }
                | Self::MaxConcurrency { .. }
                | Self::CommandTimeout { .. }
                | Self::Fallback { .. }
        )
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CommandTimeout { .. })
            || matches!(self, Self::Http(e) if e.is_timeout())
    }

    /// Check if this is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_)) || matches!(self, Self::Http(e) if e.is_connect())
    }

    /// Get the HTTP status code carried by this error, if any.
    ///
    /// For [`HttpClientError::Exhausted`] this is the status of the last
    /// response received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ServerError { status } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Exhausted { response, .. } | Self::Cancelled { response } => {
                response.as_ref().map(|r| r.status().as_u16())
            }
            _ => None,
        }
    }

    /// The last response received before the call failed, if any.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Exhausted { response, .. } | Self::Cancelled { response } => response.as_deref(),
            _ => None,
        }
    }

    /// Consume the error and return the last response received, if any.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Exhausted { response, .. } | Self::Cancelled { response } => {
                response.map(|r| *r)
            }
            _ => None,
        }
    }

    /// Per-attempt errors of an exhausted call.
    pub fn attempt_errors(&self) -> &[HttpClientError] {
        match self {
            Self::Exhausted { errors, .. } => errors.errors(),
            _ => &[],
        }
    }
}

fn attempt_noun(attempts: &u32) -> &'static str {
    if *attempts == 1 { "attempt" } else { "attempts" }
}

/// Ordered collection of errors, one per failed attempt.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<HttpClientError>,
}

impl MultiError {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error.
    pub fn push(&mut self, error: HttpClientError) {
        self.errors.push(error);
    }

    /// Check whether no error was recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// All errors, the first one at the front.
    pub fn errors(&self) -> &[HttpClientError] {
        &self.errors
    }

    /// The first recorded error.
    pub fn first(&self) -> Option<&HttpClientError> {
        self.errors.first()
    }

    /// The most recent error.
    pub fn last(&self) -> Option<&HttpClientError> {
        self.errors.last()
    }

    /// Consume the collection.
    pub fn into_errors(self) -> Vec<HttpClientError> {
        self.errors
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.first().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<Vec<HttpClientError>> for MultiError {
    fn from(errors: Vec<HttpClientError>) -> Self {
        Self { errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_error_joins_messages() {
        let errors = MultiError::from(vec![
            HttpClientError::ServerError { status: 500 },
            HttpClientError::Connection("connection refused".to_string()),
            HttpClientError::ServerError { status: 503 },
        ]);

        assert_eq!(
            errors.to_string(),
            "server error: 500, connection error: connection refused, server error: 503"
        );
        assert_eq!(errors.len(), 3);
        assert!(matches!(
            errors.first(),
            Some(HttpClientError::ServerError { status: 500 })
        ));
        assert!(matches!(
            errors.last(),
            Some(HttpClientError::ServerError { status: 503 })
        ));
    }

    #[test]
    fn test_empty_multi_error() {
        let errors = MultiError::new();
        assert!(errors.is_empty());
        assert_eq!(errors.to_string(), "");
        assert!(std::error::Error::source(&errors).is_none());
    }

    #[test]
    fn test_exhausted_display() {
        let err = HttpClientError::Exhausted {
            attempts: 2,
            errors: MultiError::from(vec![
                HttpClientError::ServerError { status: 500 },
                HttpClientError::ServerError { status: 429 },
            ]),
            response: None,
        };

        assert_eq!(
            err.to_string(),
            "request failed after 2 attempts: server error: 500, server error: 429"
        );
        assert_eq!(err.attempt_errors().len(), 2);
        assert!(err.response().is_none());
    }

    #[test]
    fn test_single_attempt_display() {
        let err = HttpClientError::Exhausted {
            attempts: 1,
            errors: MultiError::from(vec![HttpClientError::ServerError { status: 502 }]),
            response: None,
        };

        assert_eq!(err.to_string(), "request failed after 1 attempt: server error: 502");
    }

    #[test]
    fn test_breaker_classification() {
        assert!(
            HttpClientError::CircuitOpen {
                command: "users".into()
            }
            .is_breaker()
        );
        assert!(
            HttpClientError::Fallback {
                error: "nope".into(),
                run_error: "server error: 500".into(),
            }
            .is_breaker()
        );
        assert!(!HttpClientError::ServerError { status: 500 }.is_breaker());
        assert!(HttpClientError::Cancelled { response: None }.is_cancelled());
    }

    #[test]
    fn test_unsupported_scheme_display() {
        let err = HttpClientError::UnsupportedScheme("ftp".to_string());
        assert_eq!(err.to_string(), "unsupported protocol scheme \"ftp\"");
    }
}

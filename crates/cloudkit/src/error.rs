//! Error types for remote API calls.
//!
//! Errors are categorized to enable retry logic and to map each failure
//! onto the sync engine's taxonomy: absent, transient or fatal.

use thiserror::Error;

/// Message the API returns when a caller is throttled.
pub const RATE_EXCEEDED: &str = "Rate exceeded";

/// Categories of API errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection, DNS or timeout failure (transient, retryable)
    Network,
    /// The API asked the caller to slow down (retryable)
    Throttled,
    /// The addressed object does not exist
    NotFound,
    /// The API rejected the request
    Rejected,
    /// The API failed internally (transient)
    Server,
    /// The response body could not be decoded
    Decode,
    /// Host or token is missing
    Settings,
}

impl ErrorCategory {
    /// Whether the client should retry the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Throttled)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Throttled => "Request rate exceeded",
            Self::NotFound => "Object not found",
            Self::Rejected => "Request rejected",
            Self::Server => "Remote server error",
            Self::Decode => "Unreadable response",
            Self::Settings => "Provider settings incomplete",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the host URL and your connection, then try again",
            Self::Throttled => "Wait a moment and try again",
            Self::NotFound => "Verify the identifier, or import the resource again",
            Self::Rejected => "Check the request details in the error message",
            Self::Server => "Try again later",
            Self::Decode => "Check that the host points at the management API",
            Self::Settings => "Set CLOUDSYNC_HOST and CLOUDSYNC_TOKEN, or `host` and `token` in the config file",
        }
    }
}

/// Errors that can occur while talking to the management API.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-related error (connection, timeout, DNS, etc.)
    #[error("network error calling {path}: {message}")]
    Network {
        /// API path that was called
        path: String,
        /// Detailed error message
        message: String,
    },

    /// The API answered with a non-success status
    #[error("{path} returned HTTP {status}: {message}")]
    Http {
        /// API path that was called
        path: String,
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The response body is not the JSON that was expected
    #[error("cannot decode response from {path}: {message}")]
    Decode {
        /// API path that was called
        path: String,
        /// Parser message
        message: String,
    },

    /// Host or token missing
    #[error("missing provider settings: {message}")]
    Settings {
        /// What is missing
        message: String,
    },
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::Http { .. } if self.is_rate_exceeded() => ErrorCategory::Throttled,
            Error::Http { status: 404, .. } => ErrorCategory::NotFound,
            Error::Http { status, .. } if *status >= 500 => ErrorCategory::Server,
            Error::Http { .. } => ErrorCategory::Rejected,
            Error::Decode { .. } => ErrorCategory::Decode,
            Error::Settings { .. } => ErrorCategory::Settings,
        }
    }

    /// Whether this error is worth retrying immediately.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether the API reported throttling, either by status or by message.
    pub fn is_rate_exceeded(&self) -> bool {
        match self {
            Error::Http { status, message, .. } => *status == 429 || message.contains(RATE_EXCEEDED),
            _ => false,
        }
    }

    /// HTTP status code, if the API answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<Error> for declarative::Error {
    fn from(err: Error) -> Self {
        let status = err.status();
        match err.category() {
            ErrorCategory::NotFound => declarative::Error::RemoteNotFound {
                resource: match &err {
                    Error::Http { path, .. } => path.clone(),
                    other => other.to_string(),
                },
            },
            ErrorCategory::Network | ErrorCategory::Throttled | ErrorCategory::Server => {
                declarative::Error::RemoteTransient {
                    message: err.to_string(),
                    status,
                }
            }
            ErrorCategory::Rejected | ErrorCategory::Decode | ErrorCategory::Settings => {
                declarative::Error::RemoteFatal {
                    message: err.to_string(),
                    status,
                }
            }
        }
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, message: &str) -> Error {
        Error::Http {
            path: "v3/subscriptions/t/aws/cloudFrontDistribution".to_string(),
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_error_category() {
        assert_eq!(http(404, "").category(), ErrorCategory::NotFound);
        assert_eq!(http(400, "bad origin").category(), ErrorCategory::Rejected);
        assert_eq!(http(503, "").category(), ErrorCategory::Server);
        assert_eq!(http(429, "").category(), ErrorCategory::Throttled);
        assert_eq!(
            http(400, r#"{"Message":"Rate exceeded"}"#).category(),
            ErrorCategory::Throttled
        );
    }

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::Throttled.is_retryable());
        assert!(!ErrorCategory::Server.is_retryable());
        assert!(!ErrorCategory::Rejected.is_retryable());
    }

    #[test]
    fn test_conversion_into_taxonomy() {
        let err: declarative::Error = http(404, "").into();
        assert!(err.is_not_found());

        let err: declarative::Error = http(502, "bad gateway").into();
        assert!(matches!(err, declarative::Error::RemoteTransient { status: Some(502), .. }));

        let err: declarative::Error = Error::Network {
            path: "x".into(),
            message: "connection refused".into(),
        }
        .into();
        assert!(err.is_retryable());

        let err: declarative::Error = http(409, "conflict").into();
        assert!(matches!(err, declarative::Error::RemoteFatal { status: Some(409), .. }));

        let err: declarative::Error = Error::Decode {
            path: "x".into(),
            message: "eof".into(),
        }
        .into();
        assert!(matches!(err, declarative::Error::RemoteFatal { status: None, .. }));
    }
}

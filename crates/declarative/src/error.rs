//! Error types for the synchronization engine.
//!
//! Errors are categorized so callers can decide whether to retry, treat a
//! resource as absent, or surface a configuration problem immediately.

use std::fmt;
use std::time::Duration;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of engine errors for retry and reporting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The user configuration is contradictory, incomplete or ill-typed.
    Config,
    /// A composite identifier could not be parsed.
    Identifier,
    /// The remote resource does not exist.
    NotFound,
    /// Network blip, throttling or server-side failure.
    Transient,
    /// The remote API rejected the request or answered with garbage.
    Fatal,
    /// A waiter ran out of time.
    Timeout,
    /// The operation was cancelled by the caller.
    Cancelled,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Whether a read may treat this error as "resource absent".
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Config => "Invalid configuration",
            Self::Identifier => "Malformed resource identifier",
            Self::NotFound => "Resource not found",
            Self::Transient => "Temporary remote failure",
            Self::Fatal => "Remote request rejected",
            Self::Timeout => "Timed out waiting for the resource",
            Self::Cancelled => "Operation cancelled",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Config => "Fix the configuration file and run again",
            Self::Identifier => "Check the identifier format for this resource kind",
            Self::NotFound => "The resource may have been deleted outside of cloudsync",
            Self::Transient => "Check connectivity to the management API and try again",
            Self::Fatal => "Check the error details returned by the management API",
            Self::Timeout => "The resource is left in the reported state; rerun to keep waiting",
            Self::Cancelled => "The resource is left in its last observed state",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors produced while transforming, diffing or waiting on resources.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two mutually exclusive field groups are both populated.
    #[error("conflicting configuration: `{first}` and `{second}` cannot both be set")]
    ConfigConflict {
        /// First populated group.
        first: String,
        /// Second populated group.
        second: String,
    },

    /// A required field or field group is unset and has no default.
    #[error("incomplete configuration: {what}")]
    ConfigIncomplete {
        /// What is missing.
        what: String,
    },

    /// A value has the wrong type or fails validation.
    #[error("invalid value at `{path}`: {message}")]
    InvalidValue {
        /// Dotted path of the offending value.
        path: String,
        /// What is wrong with it.
        message: String,
    },

    /// A path does not resolve against a value tree.
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath {
        /// The path as written.
        path: String,
        /// Why it does not resolve.
        reason: String,
    },

    /// A composite identifier does not match its template.
    #[error("invalid identifier `{id}`: expected {expected}")]
    InvalidIdentifier {
        /// The identifier as given.
        id: String,
        /// The expected format.
        expected: String,
    },

    /// The remote resource does not exist.
    #[error("{resource} not found")]
    RemoteNotFound {
        /// Kind and id of the missing resource.
        resource: String,
    },

    /// Network failure, throttling or a 5xx answer.
    #[error("temporary remote failure: {message}")]
    RemoteTransient {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// A 4xx answer other than 404, or a malformed response.
    #[error("remote request failed: {message}")]
    RemoteFatal {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// A waiter observed a status outside its pending and target sets.
    #[error("unexpected status `{status}` while waiting for {target}")]
    UnexpectedStatus {
        /// The status that was observed.
        status: String,
        /// The statuses being waited for.
        target: String,
    },

    /// A waiter's deadline elapsed while the resource was still pending.
    #[error("timed out after {timeout:?} waiting for {target} (last status: {})", .last_status.as_deref().unwrap_or("none observed"))]
    WaitTimeout {
        /// The statuses being waited for.
        target: String,
        /// The overall timeout.
        timeout: Duration,
        /// The last status seen before the deadline.
        last_status: Option<String>,
    },

    /// The caller cancelled a wait.
    #[error("cancelled while waiting for {target} (last status: {})", .last_status.as_deref().unwrap_or("none observed"))]
    WaitCancelled {
        /// The statuses being waited for.
        target: String,
        /// The last status seen before cancellation.
        last_status: Option<String>,
    },
}

impl Error {
    /// Create an invalid value error.
    pub fn invalid_value(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid path error.
    pub fn invalid_path(path: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::RemoteFatal {
            message: message.into(),
            status: None,
        }
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ConfigConflict { .. }
            | Error::ConfigIncomplete { .. }
            | Error::InvalidValue { .. }
            | Error::InvalidPath { .. } => ErrorCategory::Config,
            Error::InvalidIdentifier { .. } => ErrorCategory::Identifier,
            Error::RemoteNotFound { .. } => ErrorCategory::NotFound,
            Error::RemoteTransient { .. } => ErrorCategory::Transient,
            Error::RemoteFatal { .. } | Error::UnexpectedStatus { .. } => ErrorCategory::Fatal,
            Error::WaitTimeout { .. } => ErrorCategory::Timeout,
            Error::WaitCancelled { .. } => ErrorCategory::Cancelled,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error means the remote resource is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.category().is_absent()
    }

    /// The last status a failed wait observed, if any.
    #[must_use]
    pub fn last_status(&self) -> Option<&str> {
        match self {
            Error::WaitTimeout { last_status, .. } | Error::WaitCancelled { last_status, .. } => {
                last_status.as_deref()
            }
            Error::UnexpectedStatus { status, .. } => Some(status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::Config.is_retryable());
        assert!(!ErrorCategory::Identifier.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Fatal.is_retryable());
        assert!(!ErrorCategory::Timeout.is_retryable());
        assert!(!ErrorCategory::Cancelled.is_retryable());
    }

    #[test]
    fn test_error_category_advice() {
        assert!(!ErrorCategory::Config.advice().is_empty());
        assert!(!ErrorCategory::Timeout.advice().is_empty());
        assert!(format!("{}", ErrorCategory::Transient).contains("Temporary"));
    }

    #[test]
    fn test_conflict_names_both_groups() {
        let err = Error::ConfigConflict {
            first: "viewer_certificate.acm_certificate".to_string(),
            second: "viewer_certificate.iam_certificate".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("acm_certificate"));
        assert!(display.contains("iam_certificate"));
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_wait_timeout_reports_last_status() {
        let err = Error::WaitTimeout {
            target: "[ready]".to_string(),
            timeout: Duration::from_secs(5),
            last_status: Some("pending".to_string()),
        };
        assert!(err.to_string().contains("last status: pending"));
        assert_eq!(err.last_status(), Some("pending"));
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }

    #[test]
    fn test_wait_cancelled_without_status() {
        let err = Error::WaitCancelled {
            target: "[ready]".to_string(),
            last_status: None,
        };
        assert!(err.to_string().contains("none observed"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_remote_categories() {
        let transient = Error::RemoteTransient {
            message: "connection reset".to_string(),
            status: None,
        };
        assert!(transient.is_retryable());

        let fatal = Error::malformed("expected object");
        assert_eq!(fatal.category(), ErrorCategory::Fatal);

        let missing = Error::RemoteNotFound {
            resource: "cosmosdb_account t/cosmosdb/account/x".to_string(),
        };
        assert!(missing.is_not_found());
    }
}

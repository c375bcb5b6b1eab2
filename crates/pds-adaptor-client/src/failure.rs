//! Classified upstream failures.
//!
//! Every error raised while talking to PDS FHIR is turned into exactly one
//! [`UpstreamFailure`] before it leaves this crate. Callers match on
//! [`FailureKind`] instead of inspecting HTTP details.

use std::fmt;

/// Boxed error used as the underlying cause of a failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome categories for upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 401/403 from the upstream, or the token endpoint refused us.
    AuthFailure,
    /// 404, the patient does not exist.
    NotFound,
    /// 429 from the upstream.
    RateLimited,
    /// 5xx or a network failure. The only kind the retry loop consumes.
    RetryableServerError,
    /// Any other 4xx.
    ClientError,
    /// 400 because the patch would not change the record.
    NoOpPatch,
    /// A success response whose body could not be understood.
    UnexpectedResponseShape,
    /// The private key could not be used to sign an assertion.
    SigningConfigurationError,
    /// Anything not recognised above.
    UnexpectedError,
}

impl FailureKind {
    /// Returns `true` if the retry coordinator may attempt the operation again.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RetryableServerError)
    }

    /// Stable name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthFailure => "auth_failure",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::RetryableServerError => "retryable_server_error",
            Self::ClientError => "client_error",
            Self::NoOpPatch => "no_op_patch",
            Self::UnexpectedResponseShape => "unexpected_response_shape",
            Self::SigningConfigurationError => "signing_configuration_error",
            Self::UnexpectedError => "unexpected_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure of an upstream operation.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamFailure {
    /// What went wrong.
    pub kind: FailureKind,
    /// Human readable description.
    pub message: String,
    /// Upstream HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Underlying error, if any.
    #[source]
    pub cause: Option<BoxError>,
}

impl UpstreamFailure {
    /// Creates a failure with no status or cause.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            cause: None,
        }
    }

    /// Attaches the upstream HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches the underlying error.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Creates a `RetryableServerError` failure.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RetryableServerError, message)
    }

    /// Creates an `UnexpectedError` failure.
    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::UnexpectedError, message)
    }

    /// Returns `true` if the retry coordinator may attempt the operation again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns `true` if this failure has the given kind.
    #[must_use]
    pub fn is(&self, kind: FailureKind) -> bool {
        self.kind == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_only_server_errors_are_retryable() {
        let kinds = [
            FailureKind::AuthFailure,
            FailureKind::NotFound,
            FailureKind::RateLimited,
            FailureKind::ClientError,
            FailureKind::NoOpPatch,
            FailureKind::UnexpectedResponseShape,
            FailureKind::SigningConfigurationError,
            FailureKind::UnexpectedError,
        ];
        for kind in kinds {
            assert!(!kind.is_retryable(), "{kind} must not be retryable");
        }
        assert!(FailureKind::RetryableServerError.is_retryable());
    }

    #[test]
    fn test_failure_keeps_status_and_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let failure = UpstreamFailure::retryable("network failure")
            .with_status(503)
            .with_cause(cause);

        assert_eq!(failure.to_string(), "network failure");
        assert_eq!(failure.status, Some(503));
        assert!(failure.is_retryable());
        assert_eq!(failure.source().unwrap().to_string(), "reset by peer");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(FailureKind::NoOpPatch.to_string(), "no_op_patch");
        assert!(UpstreamFailure::unexpected("x").is(FailureKind::UnexpectedError));
    }
}

//! Error types for assertion signing and access token acquisition.

use std::fmt;

/// Errors that can occur while obtaining an access token for the upstream.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The configured private key is empty, malformed, or rejected by the signer.
    ///
    /// A bad key does not become good on retry, so callers must never retry this.
    #[error("Signing configuration error: {message}")]
    SigningConfiguration {
        /// Description of what is wrong with the key material.
        message: String,
    },

    /// The token endpoint answered with a 4xx/5xx status, or could not be reached.
    #[error("Access token request failed: {message}")]
    TokenRequest {
        /// HTTP status returned by the token endpoint, `None` for network failures.
        status: Option<u16>,
        /// Description of the failure.
        message: String,
    },

    /// The token endpoint answered 2xx but the body carried no usable `access_token`.
    #[error("Invalid token response: {message}")]
    InvalidTokenResponse {
        /// Description of what was wrong with the body.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `SigningConfiguration` error.
    #[must_use]
    pub fn signing_configuration(message: impl Into<String>) -> Self {
        Self::SigningConfiguration {
            message: message.into(),
        }
    }

    /// Creates a new `TokenRequest` error for an HTTP status answer.
    #[must_use]
    pub fn token_request(status: u16, message: impl Into<String>) -> Self {
        Self::TokenRequest {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates a new `TokenRequest` error for a transport-level failure.
    #[must_use]
    pub fn token_transport(message: impl Into<String>) -> Self {
        Self::TokenRequest {
            status: None,
            message: message.into(),
        }
    }

    /// Creates a new `InvalidTokenResponse` error.
    #[must_use]
    pub fn invalid_token_response(message: impl Into<String>) -> Self {
        Self::InvalidTokenResponse {
            message: message.into(),
        }
    }

    /// Returns `true` if the key material itself is at fault.
    #[must_use]
    pub fn is_signing_error(&self) -> bool {
        matches!(self, Self::SigningConfiguration { .. })
    }

    /// HTTP status reported by the token endpoint, if any.
    #[must_use]
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::TokenRequest { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SigningConfiguration { .. } => ErrorCategory::Configuration,
            Self::TokenRequest { status: None, .. } => ErrorCategory::Transport,
            Self::TokenRequest { .. } => ErrorCategory::TokenEndpoint,
            Self::InvalidTokenResponse { .. } => ErrorCategory::Protocol,
        }
    }
}

/// Categories of token acquisition errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Local key material or signer setup.
    Configuration,
    /// The token endpoint answered with an error status.
    TokenEndpoint,
    /// The token endpoint could not be reached.
    Transport,
    /// The token endpoint answered with an unusable body.
    Protocol,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::TokenEndpoint => write!(f, "token_endpoint"),
            Self::Transport => write!(f, "transport"),
            Self::Protocol => write!(f, "protocol"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::signing_configuration("private key is empty");
        assert_eq!(
            err.to_string(),
            "Signing configuration error: private key is empty"
        );

        let err = AuthError::token_request(500, "status 500");
        assert_eq!(err.to_string(), "Access token request failed: status 500");
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::signing_configuration("bad key");
        assert!(err.is_signing_error());
        assert_eq!(err.upstream_status(), None);

        let err = AuthError::token_transport("connection refused");
        assert!(!err.is_signing_error());
        assert_eq!(err.upstream_status(), None);

        let err = AuthError::token_request(401, "unauthorized");
        assert_eq!(err.upstream_status(), Some(401));

        let err = AuthError::invalid_token_response("missing access_token");
        assert!(!err.is_signing_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::signing_configuration("x").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            AuthError::token_request(503, "x").category(),
            ErrorCategory::TokenEndpoint
        );
        assert_eq!(
            AuthError::token_transport("x").category(),
            ErrorCategory::Transport
        );
        assert_eq!(
            AuthError::invalid_token_response("x").category().to_string(),
            "protocol"
        );
    }
}

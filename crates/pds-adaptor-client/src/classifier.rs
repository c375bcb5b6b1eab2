//! Mapping of raw upstream errors onto [`FailureKind`].
//!
//! Rules, first match wins:
//!
//! | input | kind |
//! |-------|------|
//! | 401, 403 | `AuthFailure` |
//! | 404 | `NotFound` |
//! | 429 | `RateLimited` |
//! | 5xx | `RetryableServerError` |
//! | connect/timeout/reset | `RetryableServerError` |
//! | unparseable 2xx body | `UnexpectedResponseShape` |
//! | 400 with no-change diagnostics | `NoOpPatch` |
//! | other 4xx | `ClientError` |
//! | already classified | unchanged |
//! | anything else | `UnexpectedError` |
//!
//! 401 and 403 are deliberately conflated: a 403 on a business request is
//! reported the same way as a token endpoint refusal. Only 401 makes the
//! executor re-authenticate, see [`FailureClassifier::triggers_reauthentication`].

use pds_adaptor_auth::AuthError;
use serde::Deserialize;

use crate::failure::{BoxError, FailureKind, UpstreamFailure};

/// Diagnostic text PDS FHIR uses when a patch would not change the record.
pub const NO_OP_PATCH_MARKER: &str = "Provided patch made no changes to the resource";

/// An upstream error before classification.
#[derive(Debug)]
pub enum RawFailure {
    /// The upstream answered with a non-success status.
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: Vec<u8>,
    },
    /// The request never produced a response.
    Transport(reqwest::Error),
    /// A success response whose body could not be decoded.
    MalformedBody(serde_json::Error),
    /// Obtaining an access token failed.
    Token(AuthError),
    /// A failure that was already classified further down.
    Classified(UpstreamFailure),
    /// Anything else.
    Other(BoxError),
}

impl From<UpstreamFailure> for RawFailure {
    fn from(failure: UpstreamFailure) -> Self {
        Self::Classified(failure)
    }
}

impl From<AuthError> for RawFailure {
    fn from(err: AuthError) -> Self {
        Self::Token(err)
    }
}

impl From<reqwest::Error> for RawFailure {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err)
    }
}

impl From<serde_json::Error> for RawFailure {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedBody(err)
    }
}

/// Classifies upstream errors. Logs once per classification.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureClassifier;

impl FailureClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether a response with `status` should make the executor mint a new
    /// token and try once more.
    #[must_use]
    pub fn triggers_reauthentication(&self, status: u16) -> bool {
        status == 401
    }

    /// Turns `failure` into an [`UpstreamFailure`].
    ///
    /// `description` names the operation in progress, e.g. `"retrieving"`.
    pub fn classify(&self, description: &str, failure: RawFailure) -> UpstreamFailure {
        match failure {
            RawFailure::Classified(failure) => failure,
            RawFailure::Status { status, body } => self.classify_status(description, status, &body),
            RawFailure::Transport(err) => self.classify_transport(description, err),
            RawFailure::MalformedBody(err) => {
                tracing::error!(
                    error = ?err,
                    operation = description,
                    "PDS FHIR returned unexpected response body"
                );
                UpstreamFailure::new(
                    FailureKind::UnexpectedResponseShape,
                    format!("PDS FHIR returned unexpected response body when {description} PDS Record"),
                )
                .with_cause(err)
            }
            RawFailure::Token(err) => classify_token_error(err),
            RawFailure::Other(err) => {
                tracing::warn!(error = ?err, operation = description, "Unexpected exception");
                UpstreamFailure::unexpected(format!("Unexpected error when {description} PDS Record: {err}"))
                    .with_cause(err)
            }
        }
    }

    fn classify_status(&self, description: &str, status: u16, body: &[u8]) -> UpstreamFailure {
        if (500..=599).contains(&status) {
            tracing::warn!(status, operation = description, "PDS FHIR server error");
            return UpstreamFailure::retryable(format!(
                "PDS FHIR request failed status code: {status}. reason {}",
                reason_phrase(status)
            ))
            .with_status(status);
        }

        if !(400..=499).contains(&status) {
            tracing::warn!(status, operation = description, "Unexpected status from PDS FHIR");
            return UpstreamFailure::unexpected(format!(
                "PDS FHIR returned unexpected status {status} when {description} PDS Record"
            ))
            .with_status(status);
        }

        tracing::error!(status, operation = description, "Received 4xx HTTP Error from PDS FHIR");

        let failure = match status {
            401 | 403 => UpstreamFailure::new(FailureKind::AuthFailure, "Access token request failed"),
            404 => UpstreamFailure::new(
                FailureKind::NotFound,
                "PDS FHIR Request failed - Patient not found 404",
            ),
            429 => UpstreamFailure::new(
                FailureKind::RateLimited,
                "Rate limit exceeded for PDS FHIR - too many requests",
            ),
            400 if is_no_op_patch_rejection(body) => UpstreamFailure::new(
                FailureKind::NoOpPatch,
                format!("PDS FHIR request failed status code: 400. reason {NO_OP_PATCH_MARKER}"),
            ),
            _ => UpstreamFailure::new(
                FailureKind::ClientError,
                format!(
                    "Received {status} error from PDS FHIR: error: {}",
                    String::from_utf8_lossy(body)
                ),
            ),
        };
        failure.with_status(status)
    }

    fn classify_transport(&self, description: &str, err: reqwest::Error) -> UpstreamFailure {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            tracing::warn!(error = %err, operation = description, "PDS FHIR request had network failure");
            return UpstreamFailure::retryable(format!("PDS FHIR request had network failure: {err}"))
                .with_cause(err);
        }
        if err.is_decode() {
            tracing::error!(error = ?err, operation = description, "PDS FHIR returned unexpected response body");
            return UpstreamFailure::new(
                FailureKind::UnexpectedResponseShape,
                format!("PDS FHIR returned unexpected response body when {description} PDS Record"),
            )
            .with_cause(err);
        }
        tracing::warn!(error = ?err, operation = description, "Unexpected exception");
        UpstreamFailure::unexpected(format!("Unexpected error when {description} PDS Record: {err}"))
            .with_cause(err)
    }
}

fn classify_token_error(err: AuthError) -> UpstreamFailure {
    if err.is_signing_error() {
        tracing::error!(category = %err.category(), "Unable to sign JWT");
        return UpstreamFailure::new(FailureKind::SigningConfigurationError, "Unable to sign JWT")
            .with_cause(err);
    }
    tracing::warn!(
        category = %err.category(),
        status = ?err.upstream_status(),
        "Access token request failed"
    );
    let mut failure = UpstreamFailure::new(FailureKind::AuthFailure, "Access token request failed");
    if let Some(status) = err.upstream_status() {
        failure = failure.with_status(status);
    }
    failure.with_cause(err)
}

#[derive(Deserialize)]
struct OperationOutcomeBody {
    #[serde(default)]
    issue: Vec<OperationOutcomeIssue>,
}

#[derive(Deserialize)]
struct OperationOutcomeIssue {
    diagnostics: Option<String>,
}

/// Looks at `issue[0].diagnostics` of a rejection body for the no-change marker.
fn is_no_op_patch_rejection(body: &[u8]) -> bool {
    match serde_json::from_slice::<OperationOutcomeBody>(body) {
        Ok(outcome) => outcome
            .issue
            .first()
            .and_then(|issue| issue.diagnostics.as_deref())
            .is_some_and(|d| d.contains(NO_OP_PATCH_MARKER)),
        Err(_) => {
            tracing::debug!("Patch rejection has no diagnostics");
            false
        }
    }
}

fn reason_phrase(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, body: &str) -> RawFailure {
        RawFailure::Status {
            status,
            body: body.as_bytes().to_vec(),
        }
    }

    fn classify(failure: RawFailure) -> UpstreamFailure {
        FailureClassifier::new().classify("retrieving", failure)
    }

    #[test]
    fn test_auth_statuses() {
        for code in [401, 403] {
            let failure = classify(status(code, ""));
            assert_eq!(failure.kind, FailureKind::AuthFailure);
            assert_eq!(failure.status, Some(code));
        }
    }

    #[test]
    fn test_not_found_is_terminal() {
        let failure = classify(status(404, r#"{"issue":[]}"#));
        assert_eq!(failure.kind, FailureKind::NotFound);
        assert!(!failure.is_retryable());
    }

    #[test]
    fn test_rate_limited() {
        assert_eq!(classify(status(429, "")).kind, FailureKind::RateLimited);
    }

    #[test]
    fn test_server_errors_are_retryable() {
        for code in [500, 502, 503, 504] {
            let failure = classify(status(code, ""));
            assert_eq!(failure.kind, FailureKind::RetryableServerError);
            assert!(failure.is_retryable());
        }
        assert_eq!(
            classify(status(503, "")).message,
            "PDS FHIR request failed status code: 503. reason Service Unavailable"
        );
    }

    #[test]
    fn test_no_op_patch_detected_from_diagnostics() {
        let body = r#"{
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": "error",
                "code": "structure",
                "diagnostics": "Invalid update with error - Provided patch made no changes to the resource"
            }]
        }"#;
        let failure = classify(status(400, body));
        assert_eq!(failure.kind, FailureKind::NoOpPatch);
        assert_eq!(
            failure.message,
            "PDS FHIR request failed status code: 400. reason Provided patch made no changes to the resource"
        );
    }

    #[test]
    fn test_bad_request_without_marker_is_client_error() {
        let body = r#"{"issue":[{"diagnostics":"Invalid patch - missing value"}]}"#;
        assert_eq!(classify(status(400, body)).kind, FailureKind::ClientError);
        assert_eq!(classify(status(400, "not json")).kind, FailureKind::ClientError);
        assert_eq!(classify(status(412, "")).kind, FailureKind::ClientError);
    }

    #[test]
    fn test_marker_only_counts_on_bad_request() {
        let body = format!(r#"{{"issue":[{{"diagnostics":"{NO_OP_PATCH_MARKER}"}}]}}"#);
        assert_eq!(classify(status(422, &body)).kind, FailureKind::ClientError);
    }

    #[test]
    fn test_malformed_body() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let failure = classify(RawFailure::MalformedBody(err));
        assert_eq!(failure.kind, FailureKind::UnexpectedResponseShape);
        assert!(failure.cause.is_some());
    }

    #[test]
    fn test_classified_failure_passes_through() {
        let original = UpstreamFailure::new(FailureKind::NotFound, "gone")
            .with_status(404)
            .with_cause(std::io::Error::other("root"));
        let failure = classify(RawFailure::Classified(original));

        assert_eq!(failure.kind, FailureKind::NotFound);
        assert_eq!(failure.message, "gone");
        assert_eq!(failure.cause.unwrap().to_string(), "root");
    }

    #[test]
    fn test_token_errors() {
        let failure = classify(AuthError::signing_configuration("bad key").into());
        assert_eq!(failure.kind, FailureKind::SigningConfigurationError);

        let failure = classify(AuthError::token_request(500, "down").into());
        assert_eq!(failure.kind, FailureKind::AuthFailure);
        assert_eq!(failure.status, Some(500));

        let failure = classify(AuthError::token_transport("refused").into());
        assert_eq!(failure.kind, FailureKind::AuthFailure);
    }

    #[test]
    fn test_unknown_error_is_unexpected() {
        let failure = classify(RawFailure::Other("boom".into()));
        assert_eq!(failure.kind, FailureKind::UnexpectedError);
    }

    #[test]
    fn test_only_401_triggers_reauthentication() {
        let classifier = FailureClassifier::new();
        assert!(classifier.triggers_reauthentication(401));
        assert!(!classifier.triggers_reauthentication(403));
        assert!(!classifier.triggers_reauthentication(500));
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:1/Patient/9691927179")
            .send()
            .await
            .unwrap_err();
        let failure = classify(RawFailure::Transport(err));
        assert_eq!(failure.kind, FailureKind::RetryableServerError);
        assert!(failure.message.starts_with("PDS FHIR request had network failure"));
    }
}

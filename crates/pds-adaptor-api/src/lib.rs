use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use pds_adaptor_client::{FailureKind, UpstreamFailure};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod patient;

pub use patient::{PatientTraceInformation, SuspendedPatientStatus, UpdateManagingOrganisationRequest};

/// Length of an NHS number.
pub const NHS_NUMBER_LENGTH: usize = 10;

/// Minimal FHIR OperationOutcome used for every error body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutcome {
    #[serde(rename = "resourceType")]
    pub resource_type: &'static str, // always "OperationOutcome"
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutcomeIssue {
    /// fatal | error | warning | information
    pub severity: &'static str,
    /// FHIR issue type code: invalid | not-found | throttled | transient | exception | security
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl OperationOutcome {
    pub fn single(
        severity: &'static str,
        code: &'static str,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: "OperationOutcome",
            issue: vec![OperationOutcomeIssue {
                severity,
                code,
                diagnostics: Some(diagnostics.into()),
            }],
        }
    }
}

/// Errors surfaced to callers of the adaptor API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_operation_outcome(&self) -> OperationOutcome {
        match self {
            ApiError::BadRequest(msg) => OperationOutcome::single("error", "invalid", msg),
            ApiError::NotFound(msg) => OperationOutcome::single("error", "not-found", msg),
            ApiError::ServiceUnavailable(msg) => {
                OperationOutcome::single("error", "transient", msg)
            }
            ApiError::Internal(msg) => OperationOutcome::single("fatal", "exception", msg),
        }
    }
}

impl From<UpstreamFailure> for ApiError {
    fn from(failure: UpstreamFailure) -> Self {
        let message = failure.message;
        match failure.kind {
            FailureKind::NotFound => ApiError::NotFound(message),
            FailureKind::ClientError | FailureKind::NoOpPatch => ApiError::BadRequest(message),
            FailureKind::SigningConfigurationError => ApiError::Internal(message),
            FailureKind::AuthFailure
            | FailureKind::RateLimited
            | FailureKind::RetryableServerError
            | FailureKind::UnexpectedResponseShape
            | FailureKind::UnexpectedError => ApiError::ServiceUnavailable(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::to_vec(&self.to_operation_outcome()).unwrap_or_else(|_| {
            let fallback = OperationOutcome::single("fatal", "exception", "Serialization failure");
            serde_json::to_vec(&fallback).unwrap_or_else(|_| b"{}".to_vec())
        });

        (
            status,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/fhir+json"),
            )],
            body,
        )
            .into_response()
    }
}

/// An NHS number is exactly ten ASCII digits.
pub fn validate_nhs_number(nhs_number: &str) -> Result<(), ApiError> {
    if nhs_number.len() == NHS_NUMBER_LENGTH && nhs_number.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "Invalid NHS number '{nhs_number}': must be {NHS_NUMBER_LENGTH} digits"
        )))
    }
}

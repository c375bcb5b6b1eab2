//! Authenticated, retrying client for the PDS FHIR Patient API.
//!
//! The request pipeline, innermost first:
//!
//! - [`classifier::FailureClassifier`] maps raw HTTP and transport errors onto
//!   [`failure::FailureKind`].
//! - [`executor::AuthenticatingExecutor`] attaches the bearer token and
//!   re-authenticates once on 401.
//! - [`retry::RetryCoordinator`] repeats an operation on retryable failures.
//! - [`client::RetryingPdsFhirClient`] exposes patient reads and managing
//!   organisation updates, keeping one request id across retried writes.

pub mod classifier;
pub mod client;
pub mod executor;
pub mod failure;
pub mod model;
pub mod retry;

pub use classifier::{FailureClassifier, NO_OP_PATCH_MARKER, RawFailure};
pub use client::{PdsFhirClient, RequestCorrelationId, RetryingPdsFhirClient};
pub use executor::{AuthenticatingExecutor, UpstreamRequest, UpstreamResponse};
pub use failure::{FailureKind, UpstreamFailure};
pub use model::{ManagingOrganisationUpdate, PatientRecord, PdsFhirPatient};
pub use retry::RetryCoordinator;

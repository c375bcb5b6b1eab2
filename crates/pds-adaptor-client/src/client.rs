//! PDS FHIR patient operations.
//!
//! [`PdsFhirClient`] performs one attempt of each operation through the
//! [`AuthenticatingExecutor`]. [`RetryingPdsFhirClient`] wraps it with the
//! [`RetryCoordinator`] and owns the correlation id of mutating operations.

use std::fmt;

use reqwest::header::{CONTENT_TYPE, ETAG, HeaderName, HeaderValue, IF_MATCH};
use url::Url;
use uuid::Uuid;

use crate::classifier::RawFailure;
use crate::executor::{AuthenticatingExecutor, UpstreamRequest, UpstreamResponse};
use crate::failure::{FailureKind, UpstreamFailure};
use crate::model::{ManagingOrganisationUpdate, PatchRequest, PatientRecord, PdsFhirPatient};
use crate::retry::RetryCoordinator;

/// Header carrying the request id the upstream uses to deduplicate writes.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Content type of PDS FHIR patch bodies.
pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// Identifier shared by every attempt of one logical write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestCorrelationId(Uuid);

impl RequestCorrelationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    fn header_value(&self) -> HeaderValue {
        // A hyphenated UUID is always a valid header value.
        HeaderValue::from_str(&self.0.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("invalid-request-id"))
    }
}

impl Default for RequestCorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestCorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One-attempt PDS FHIR operations.
#[derive(Clone)]
pub struct PdsFhirClient {
    executor: AuthenticatingExecutor,
    fhir_endpoint: Url,
}

impl PdsFhirClient {
    pub fn new(executor: AuthenticatingExecutor, fhir_endpoint: Url) -> Self {
        Self {
            executor,
            fhir_endpoint,
        }
    }

    /// `GET {fhir}/Patient/{nhs_number}` with a fresh request id.
    pub async fn request_patient(&self, nhs_number: &str) -> Result<PatientRecord, UpstreamFailure> {
        const DESCRIPTION: &str = "retrieving";

        let request_id = RequestCorrelationId::new();
        tracing::info!(request_id = %request_id, "Sending request to PDS FHIR to retrieve patient");

        let request = UpstreamRequest::get(self.patient_url(nhs_number)?)
            .with_header(REQUEST_ID_HEADER, request_id.header_value());

        let response = self.executor.execute(DESCRIPTION, &request).await?;
        tracing::info!("Successful request of PDS record");
        self.patient_record(DESCRIPTION, &response)
    }

    /// `PATCH {fhir}/Patient/{nhs_number}` setting the managing organisation,
    /// conditional on `update.record_etag`.
    pub async fn update_managing_organisation(
        &self,
        nhs_number: &str,
        update: &ManagingOrganisationUpdate,
        request_id: RequestCorrelationId,
    ) -> Result<PatientRecord, UpstreamFailure> {
        const DESCRIPTION: &str = "updating";

        tracing::info!(request_id = %request_id, "Sending patch request to PDS FHIR to update managing organisation");

        let body = serde_json::to_vec(&PatchRequest::managing_organisation(&update.ods_code))
            .map_err(|e| UpstreamFailure::unexpected(format!("failed to encode patch: {e}")).with_cause(e))?;
        let if_match = HeaderValue::from_str(&update.record_etag).map_err(|e| {
            UpstreamFailure::new(
                FailureKind::ClientError,
                format!("record etag is not a valid header value: {e}"),
            )
        })?;

        let request = UpstreamRequest::patch(self.patient_url(nhs_number)?)
            .with_header(REQUEST_ID_HEADER, request_id.header_value())
            .with_header(IF_MATCH, if_match)
            .with_header(CONTENT_TYPE, HeaderValue::from_static(JSON_PATCH_CONTENT_TYPE))
            .with_body(body);

        let response = self.executor.execute(DESCRIPTION, &request).await?;
        tracing::info!("Successful updated managing organisation on PDS record");
        self.patient_record(DESCRIPTION, &response)
    }

    fn patient_url(&self, nhs_number: &str) -> Result<Url, UpstreamFailure> {
        let mut url = self.fhir_endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamFailure::unexpected("PDS FHIR endpoint cannot be a base URL"))?
            .pop_if_empty()
            .push("Patient")
            .push(nhs_number);
        Ok(url)
    }

    fn patient_record(
        &self,
        description: &str,
        response: &UpstreamResponse,
    ) -> Result<PatientRecord, UpstreamFailure> {
        let patient: PdsFhirPatient = response
            .json()
            .map_err(|e| self.executor.classifier().classify(description, RawFailure::MalformedBody(e)))?;
        let etag = response
            .header_str(ETAG.as_str())
            .map(|v| v.replace("--gzip", ""));
        Ok(PatientRecord { patient, etag })
    }
}

/// PDS FHIR operations with bounded retry on server errors.
#[derive(Clone)]
pub struct RetryingPdsFhirClient {
    client: PdsFhirClient,
    retries: RetryCoordinator,
}

impl RetryingPdsFhirClient {
    pub fn new(client: PdsFhirClient, retries: RetryCoordinator) -> Self {
        Self { client, retries }
    }

    /// Reads a patient. Each attempt carries its own request id.
    pub async fn request_patient(&self, nhs_number: &str) -> Result<PatientRecord, UpstreamFailure> {
        let client = &self.client;
        self.retries
            .with_retries("retrieving", move |_| client.request_patient(nhs_number))
            .await
    }

    /// Updates the managing organisation. Every attempt carries the same
    /// request id so the upstream can recognise a repeated write.
    pub async fn update_managing_organisation(
        &self,
        nhs_number: &str,
        update: &ManagingOrganisationUpdate,
    ) -> Result<PatientRecord, UpstreamFailure> {
        let request_id = RequestCorrelationId::new();
        let client = &self.client;
        self.retries
            .with_retries("updating", move |_| {
                client.update_managing_organisation(nhs_number, update, request_id)
            })
            .await
    }
}

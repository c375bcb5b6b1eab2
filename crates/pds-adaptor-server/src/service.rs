//! Maps PDS FHIR records onto the adaptor's response shapes.

use std::sync::Arc;

use pds_adaptor_api::{PatientTraceInformation, SuspendedPatientStatus};
use pds_adaptor_auth::{AccessTokenStore, AccessTokenStoreConfig, AssertionSigner, SignerSettings};
use pds_adaptor_client::{
    AuthenticatingExecutor, FailureKind, ManagingOrganisationUpdate, PdsFhirClient,
    RetryCoordinator, RetryingPdsFhirClient, UpstreamFailure,
};
use time::OffsetDateTime;

use crate::config::PdsConfig;

#[derive(Clone)]
pub struct PdsService {
    client: RetryingPdsFhirClient,
    treat_no_op_patch_as_success: bool,
}

impl PdsService {
    pub fn new(client: RetryingPdsFhirClient, treat_no_op_patch_as_success: bool) -> Self {
        Self {
            client,
            treat_no_op_patch_as_success,
        }
    }

    /// Wires the signer, token store, executor and retrying client from
    /// configuration. Token and FHIR calls share one HTTP client.
    pub fn from_config(cfg: &PdsConfig) -> anyhow::Result<Self> {
        let token_endpoint = cfg.access_token_url().map_err(anyhow::Error::msg)?;
        let fhir_endpoint = cfg.fhir_url().map_err(anyhow::Error::msg)?;

        let http_client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()?;

        let signer = AssertionSigner::new(SignerSettings {
            private_key: cfg.jwt_private_key.clone(),
            api_key: cfg.jwt_api_key.clone(),
            key_id: cfg.jwt_key_id.clone(),
            audience: token_endpoint.to_string(),
        });
        let store = AccessTokenStore::with_client(
            http_client.clone(),
            AccessTokenStoreConfig::new(token_endpoint).with_request_timeout(cfg.request_timeout()),
            signer,
        );

        tracing::info!(
            token_endpoint = %store.token_endpoint(),
            fhir_endpoint = %fhir_endpoint,
            key_id = %cfg.jwt_key_id,
            max_attempts = cfg.max_update_retries,
            "PDS FHIR client configured"
        );

        let executor = AuthenticatingExecutor::new(http_client, Arc::new(store));
        let client = RetryingPdsFhirClient::new(
            PdsFhirClient::new(executor, fhir_endpoint),
            RetryCoordinator::new(cfg.max_update_retries),
        );
        Ok(Self::new(client, cfg.treat_no_op_patch_as_success))
    }

    pub async fn get_patient_gp_status(
        &self,
        nhs_number: &str,
    ) -> Result<SuspendedPatientStatus, UpstreamFailure> {
        let record = self.client.request_patient(nhs_number).await?;
        Ok(SuspendedPatientStatus::from_record(nhs_number, &record))
    }

    pub async fn update_patient_managing_organisation(
        &self,
        nhs_number: &str,
        update: ManagingOrganisationUpdate,
    ) -> Result<SuspendedPatientStatus, UpstreamFailure> {
        match self.client.update_managing_organisation(nhs_number, &update).await {
            Ok(record) => Ok(SuspendedPatientStatus::from_record(nhs_number, &record)),
            Err(failure)
                if self.treat_no_op_patch_as_success && failure.is(FailureKind::NoOpPatch) =>
            {
                tracing::info!("Patch made no changes to the PDS record, reading current state");
                self.get_patient_gp_status(nhs_number).await
            }
            Err(failure) => Err(failure),
        }
    }

    pub async fn get_patient_trace_information(
        &self,
        nhs_number: &str,
    ) -> Result<PatientTraceInformation, UpstreamFailure> {
        let record = self.client.request_patient(nhs_number).await?;
        let today = OffsetDateTime::now_utc().date();
        let trace = PatientTraceInformation::from_record(nhs_number, &record, today);

        if trace.given_name.is_none() && trace.family_name.is_none() {
            tracing::warn!("PDS record has no current usual name");
        }
        if trace.postal_code.is_none() {
            tracing::warn!("PDS record has no current home address");
        }
        Ok(trace)
    }
}

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use pds_adaptor_api::{
    ApiError, PatientTraceInformation, SuspendedPatientStatus, UpdateManagingOrganisationRequest,
    validate_nhs_number,
};
use pds_adaptor_auth::ApiKeyCaller;
use serde::Serialize;

use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn get_patient_gp_status(
    State(state): State<AppState>,
    caller: ApiKeyCaller,
    Path(nhs_number): Path<String>,
) -> Result<Json<SuspendedPatientStatus>, ApiError> {
    validate_nhs_number(&nhs_number)?;
    tracing::info!(caller = %caller.name, "Request for pds record received");

    let status = state.service.get_patient_gp_status(&nhs_number).await?;
    Ok(Json(status))
}

pub async fn update_patient_managing_organisation(
    State(state): State<AppState>,
    caller: ApiKeyCaller,
    Path(nhs_number): Path<String>,
    Json(request): Json<UpdateManagingOrganisationRequest>,
) -> Result<Json<SuspendedPatientStatus>, ApiError> {
    validate_nhs_number(&nhs_number)?;
    request.validate()?;
    tracing::info!(caller = %caller.name, "Update request for pds record received");

    let status = state
        .service
        .update_patient_managing_organisation(&nhs_number, request.into_update())
        .await?;
    Ok(Json(status))
}

pub async fn get_patient_trace_information(
    State(state): State<AppState>,
    caller: ApiKeyCaller,
    Path(nhs_number): Path<String>,
) -> Result<Json<PatientTraceInformation>, ApiError> {
    validate_nhs_number(&nhs_number)?;
    tracing::info!(caller = %caller.name, "Request for patient trace information received");

    let trace = state.service.get_patient_trace_information(&nhs_number).await?;
    Ok(Json(trace))
}

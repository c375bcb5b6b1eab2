//! Response and request bodies of the adaptor endpoints.
//!
//! Absent values are serialized as `null`; consumers rely on every key
//! being present.

use pds_adaptor_client::{ManagingOrganisationUpdate, PatientRecord};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::ApiError;

/// GP registration status of a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspendedPatientStatus {
    pub nhs_number: String,
    /// `None` when the patient is deceased.
    pub is_suspended: Option<bool>,
    pub current_ods_code: Option<String>,
    pub managing_organisation: Option<String>,
    #[serde(rename = "recordETag")]
    pub record_etag: Option<String>,
    pub is_deceased: bool,
}

impl SuspendedPatientStatus {
    pub fn suspended(
        nhs_number: impl Into<String>,
        managing_organisation: Option<String>,
        record_etag: Option<String>,
    ) -> Self {
        Self {
            nhs_number: nhs_number.into(),
            is_suspended: Some(true),
            current_ods_code: None,
            managing_organisation,
            record_etag,
            is_deceased: false,
        }
    }

    pub fn registered(
        nhs_number: impl Into<String>,
        current_ods_code: impl Into<String>,
        managing_organisation: Option<String>,
        record_etag: Option<String>,
    ) -> Self {
        Self {
            nhs_number: nhs_number.into(),
            is_suspended: Some(false),
            current_ods_code: Some(current_ods_code.into()),
            managing_organisation,
            record_etag,
            is_deceased: false,
        }
    }

    pub fn deceased(nhs_number: impl Into<String>, record_etag: Option<String>) -> Self {
        Self {
            nhs_number: nhs_number.into(),
            is_suspended: None,
            current_ods_code: None,
            managing_organisation: None,
            record_etag,
            is_deceased: true,
        }
    }

    /// Derives the status of `record`. `requested` is used when the record
    /// carries no id.
    pub fn from_record(requested: &str, record: &PatientRecord) -> Self {
        let patient = &record.patient;
        let nhs_number = patient.id.as_deref().unwrap_or(requested);
        let etag = record.etag.clone();

        if patient.is_deceased() {
            return Self::deceased(nhs_number, etag);
        }
        let managing = patient.managing_organisation_ods_code().map(str::to_string);
        match patient.current_gp_ods_code() {
            Some(ods_code) => Self::registered(nhs_number, ods_code, managing, etag),
            None => Self::suspended(nhs_number, managing, etag),
        }
    }
}

/// Body of `PUT /suspended-patient-status/{nhsNumber}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManagingOrganisationRequest {
    #[serde(default)]
    pub previous_gp: String,
    #[serde(rename = "recordETag", default)]
    pub record_etag: String,
}

impl UpdateManagingOrganisationRequest {
    /// Both fields must be present and non-blank.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.previous_gp.trim().is_empty() {
            return Err(ApiError::bad_request("previousGp must not be blank"));
        }
        if self.record_etag.trim().is_empty() {
            return Err(ApiError::bad_request("recordETag must not be blank"));
        }
        Ok(())
    }

    pub fn into_update(self) -> ManagingOrganisationUpdate {
        ManagingOrganisationUpdate {
            ods_code: self.previous_gp,
            record_etag: self.record_etag,
        }
    }
}

/// Demographics used to trace a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientTraceInformation {
    pub nhs_number: String,
    pub given_name: Option<Vec<String>>,
    pub family_name: Option<String>,
    pub birthdate: Option<String>,
    pub postal_code: Option<String>,
}

impl PatientTraceInformation {
    /// Uses the current usual name and current home address as of `today`.
    pub fn from_record(requested: &str, record: &PatientRecord, today: Date) -> Self {
        let patient = &record.patient;
        let name = patient.current_usual_name(today);
        Self {
            nhs_number: patient.id.clone().unwrap_or_else(|| requested.to_string()),
            given_name: name.map(|n| n.given.clone()),
            family_name: name.and_then(|n| n.family.clone()),
            birthdate: patient.birth_date.clone(),
            postal_code: patient
                .current_home_address(today)
                .and_then(|a| a.postal_code.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pds_adaptor_client::PdsFhirPatient;
    use serde_json::json;
    use time::macros::date;

    fn record(patient: serde_json::Value, etag: &str) -> PatientRecord {
        PatientRecord {
            patient: serde_json::from_value::<PdsFhirPatient>(patient).unwrap(),
            etag: Some(etag.to_string()),
        }
    }

    #[test]
    fn registered_patient_is_not_suspended() {
        let record = record(
            json!({
                "id": "9691927179",
                "generalPractitioner": [{"identifier": {"value": "A20047"}}]
            }),
            "W/\"6\"",
        );

        let status = SuspendedPatientStatus::from_record("9691927179", &record);
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({
                "nhsNumber": "9691927179",
                "isSuspended": false,
                "currentOdsCode": "A20047",
                "managingOrganisation": null,
                "recordETag": "W/\"6\"",
                "isDeceased": false
            })
        );
    }

    #[test]
    fn patient_without_gp_is_suspended() {
        let record = record(
            json!({
                "id": "9691927179",
                "managingOrganization": {"identifier": {"value": "B1234"}}
            }),
            "W/\"2\"",
        );

        let status = SuspendedPatientStatus::from_record("9691927179", &record);
        assert_eq!(status.is_suspended, Some(true));
        assert_eq!(status.current_ods_code, None);
        assert_eq!(status.managing_organisation.as_deref(), Some("B1234"));
        assert!(!status.is_deceased);
    }

    #[test]
    fn deceased_patient_hides_registration_details() {
        let record = record(
            json!({
                "id": "9691927179",
                "deceasedDateTime": "2020-01-01T00:00:00+00:00",
                "generalPractitioner": [{"identifier": {"value": "A20047"}}],
                "managingOrganization": {"identifier": {"value": "B1234"}}
            }),
            "W/\"9\"",
        );

        let status = SuspendedPatientStatus::from_record("9691927179", &record);
        assert_eq!(status, SuspendedPatientStatus::deceased("9691927179", Some("W/\"9\"".into())));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isSuspended"], serde_json::Value::Null);
        assert_eq!(json["currentOdsCode"], serde_json::Value::Null);
        assert_eq!(json["isDeceased"], true);
    }

    #[test]
    fn requested_number_used_when_record_has_no_id() {
        let record = record(json!({}), "W/\"1\"");
        let status = SuspendedPatientStatus::from_record("9000000009", &record);
        assert_eq!(status.nhs_number, "9000000009");
    }

    #[test]
    fn update_request_uses_etag_field_name() {
        let request: UpdateManagingOrganisationRequest =
            serde_json::from_value(json!({"previousGp": "B1234", "recordETag": "W/\"6\""})).unwrap();
        assert!(request.validate().is_ok());

        let update = request.into_update();
        assert_eq!(update.ods_code, "B1234");
        assert_eq!(update.record_etag, "W/\"6\"");
    }

    #[test]
    fn update_request_rejects_blank_fields() {
        let missing_gp: UpdateManagingOrganisationRequest =
            serde_json::from_value(json!({"recordETag": "W/\"6\""})).unwrap();
        assert!(missing_gp.validate().is_err());

        let blank_etag: UpdateManagingOrganisationRequest =
            serde_json::from_value(json!({"previousGp": "B1234", "recordETag": "  "})).unwrap();
        assert!(blank_etag.validate().is_err());
    }

    #[test]
    fn trace_information_from_current_name_and_address() {
        let record = record(
            json!({
                "id": "9691927179",
                "birthDate": "1990-02-14",
                "name": [
                    {"use": "usual", "period": {"start": "2000-01-01", "end": "2010-01-01"}, "given": ["Old"], "family": "Former"},
                    {"use": "usual", "period": {"start": "2010-01-01"}, "given": ["Jane", "Anne"], "family": "Smith"}
                ],
                "address": [{"use": "home", "postalCode": "LS1 6AE"}]
            }),
            "W/\"3\"",
        );

        let trace = PatientTraceInformation::from_record("9691927179", &record, date!(2024 - 06 - 01));
        assert_eq!(
            serde_json::to_value(&trace).unwrap(),
            json!({
                "nhsNumber": "9691927179",
                "givenName": ["Jane", "Anne"],
                "familyName": "Smith",
                "birthdate": "1990-02-14",
                "postalCode": "LS1 6AE"
            })
        );
    }

    #[test]
    fn trace_information_without_usual_name() {
        let record = record(
            json!({"id": "9691927179", "name": [{"use": "nickname", "given": ["Jo"]}]}),
            "W/\"3\"",
        );

        let trace = PatientTraceInformation::from_record("9691927179", &record, date!(2024 - 06 - 01));
        assert_eq!(trace.given_name, None);
        assert_eq!(trace.family_name, None);
        assert_eq!(trace.postal_code, None);
    }
}

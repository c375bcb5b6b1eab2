//! PDS FHIR wire model.
//!
//! Only the parts of the Patient resource the adaptor reads are modelled;
//! unknown fields are ignored.

use serde::{Deserialize, Serialize};
use time::Date;

/// ODS organisation code system used in managing organisation patches.
pub const ODS_ORGANISATION_CODE_SYSTEM: &str = "https://fhir.nhs.uk/Id/ods-organization-code";

time::serde::format_description!(fhir_date, Date, "[year]-[month]-[day]");

/// A patient as returned by `GET /Patient/{id}` or `PATCH /Patient/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdsFhirPatient {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub general_practitioner: Vec<Reference>,
    #[serde(default)]
    pub managing_organization: Option<Reference>,
    #[serde(default)]
    pub deceased_date_time: Option<String>,
    #[serde(default)]
    pub name: Vec<HumanName>,
    #[serde(default)]
    pub address: Vec<Address>,
    #[serde(default)]
    pub birth_date: Option<String>,
}

impl PdsFhirPatient {
    /// ODS code of the first registered general practice.
    pub fn current_gp_ods_code(&self) -> Option<&str> {
        self.general_practitioner
            .first()
            .and_then(Reference::identifier_value)
    }

    /// ODS code of the managing organisation.
    pub fn managing_organisation_ods_code(&self) -> Option<&str> {
        self.managing_organization
            .as_ref()
            .and_then(Reference::identifier_value)
    }

    pub fn is_deceased(&self) -> bool {
        self.deceased_date_time.is_some()
    }

    /// First `usual` name whose period covers `today`.
    pub fn current_usual_name(&self, today: Date) -> Option<&HumanName> {
        self.name.iter().find(|name| {
            name.usage
                .as_deref()
                .is_some_and(|u| u.eq_ignore_ascii_case("usual"))
                && Period::covers(name.period.as_ref(), today)
        })
    }

    /// First `home` address whose period covers `today`.
    pub fn current_home_address(&self, today: Date) -> Option<&Address> {
        self.address.iter().find(|address| {
            address.usage.as_deref() == Some("home") && Period::covers(address.period.as_ref(), today)
        })
    }
}

/// A FHIR reference carrying a business identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Identifier>,
}

impl Reference {
    /// Reference to an organisation by ODS code.
    pub fn organisation(ods_code: impl Into<String>) -> Self {
        Self {
            reference_type: Some("Organization".to_string()),
            identifier: Some(Identifier {
                system: Some(ODS_ORGANISATION_CODE_SYSTEM.to_string()),
                value: Some(ods_code.into()),
            }),
        }
    }

    fn identifier_value(&self) -> Option<&str> {
        self.identifier.as_ref()?.value.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HumanName {
    #[serde(rename = "use", default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default)]
    pub given: Vec<String>,
    #[serde(default)]
    pub family: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(rename = "use", default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// Validity period of a name or address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Period {
    #[serde(default, with = "fhir_date::option")]
    pub start: Option<Date>,
    #[serde(default, with = "fhir_date::option")]
    pub end: Option<Date>,
}

impl Period {
    /// Started before `today` and not yet ended. A missing start is open-ended.
    pub fn is_current(&self, today: Date) -> bool {
        self.start.is_none_or(|start| start < today) && self.end.is_none_or(|end| end > today)
    }

    fn covers(period: Option<&Period>, today: Date) -> bool {
        period.is_none_or(|p| p.is_current(today))
    }
}

/// A patient record together with its concurrency token.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientRecord {
    pub patient: PdsFhirPatient,
    /// `ETag` response header with any `--gzip` suffix removed.
    pub etag: Option<String>,
}

/// Body of `PATCH /Patient/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchRequest {
    pub patches: Vec<PatchOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    pub value: Reference,
}

impl PatchRequest {
    /// Sets the managing organisation to `ods_code`.
    pub fn managing_organisation(ods_code: impl Into<String>) -> Self {
        Self {
            patches: vec![PatchOperation {
                op: "add".to_string(),
                path: "/managingOrganization".to_string(),
                value: Reference::organisation(ods_code),
            }],
        }
    }
}

/// A conditional managing organisation update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagingOrganisationUpdate {
    /// ODS code of the new managing organisation.
    pub ods_code: String,
    /// Entity tag the update is conditional on.
    pub record_etag: String,
}

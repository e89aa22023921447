//! Patient demographics as shown in the viewer banner.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder for demographics the server did not provide.
pub const UNKNOWN: &str = "Unknown";

/// Display-ready summary of a FHIR Patient resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    /// Logical id of the Patient resource.
    pub id: Option<String>,
    /// First recorded name.
    pub name: PatientName,
    /// Administrative gender, `Unknown` when absent.
    pub gender: String,
    /// Birth date, `Unknown` when absent.
    pub birth_date: String,
    /// First recorded address.
    pub address: PatientAddress,
    /// First phone contact point.
    pub phone: String,
    /// First email contact point.
    pub email: String,
    /// Marital status text.
    pub marital_status: String,
    /// Preferred communication language text.
    pub language: String,
    /// The resource as returned by the server.
    pub raw: Value,
}

/// Patient name parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientName {
    /// Given names joined with spaces.
    pub given: String,
    /// Family name.
    pub family: String,
    /// `given family`, trimmed.
    pub full: String,
}

/// Patient address parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientAddress {
    /// Street lines joined with `, `.
    pub line: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    /// Non-empty parts joined with `, `.
    pub full: String,
}

impl PatientSummary {
    /// Builds a summary from a Patient resource.
    #[must_use]
    pub fn from_resource(patient: &Value) -> Self {
        Self {
            id: str_at(patient, "/id").map(str::to_string),
            name: patient
                .pointer("/name/0")
                .map(PatientName::from_human_name)
                .unwrap_or_default(),
            gender: str_at(patient, "/gender").unwrap_or(UNKNOWN).to_string(),
            birth_date: str_at(patient, "/birthDate").unwrap_or(UNKNOWN).to_string(),
            address: patient
                .pointer("/address/0")
                .map(PatientAddress::from_address)
                .unwrap_or_default(),
            phone: telecom(patient, "phone"),
            email: telecom(patient, "email"),
            marital_status: str_at(patient, "/maritalStatus/text")
                .unwrap_or_default()
                .to_string(),
            language: str_at(patient, "/communication/0/language/text")
                .unwrap_or_default()
                .to_string(),
            raw: patient.clone(),
        }
    }

    /// Name to display, falling back to the resource id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if !self.name.full.is_empty() {
            &self.name.full
        } else {
            self.id.as_deref().unwrap_or(UNKNOWN)
        }
    }
}

impl PatientName {
    fn from_human_name(name: &Value) -> Self {
        let given = join_strings(name.get("given"), " ");
        let family = str_at(name, "/family").unwrap_or_default().to_string();
        let full = format!("{given} {family}").trim().to_string();
        Self { given, family, full }
    }
}

impl PatientAddress {
    fn from_address(address: &Value) -> Self {
        let line = join_strings(address.get("line"), ", ");
        let city = str_at(address, "/city").unwrap_or_default().to_string();
        let state = str_at(address, "/state").unwrap_or_default().to_string();
        let postal_code = str_at(address, "/postalCode").unwrap_or_default().to_string();
        let full = [&line, &city, &state, &postal_code]
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            line,
            city,
            state,
            postal_code,
            full,
        }
    }
}

/// Returns the Patient from a read response, or the first entry of a
/// searchset Bundle.
#[must_use]
pub fn extract_patient(body: &Value) -> Option<&Value> {
    if body.get("resourceType").and_then(Value::as_str) == Some("Bundle") {
        body.pointer("/entry/0/resource")
    } else if body.is_object() {
        Some(body)
    } else {
        None
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn join_strings(value: Option<&Value>, separator: &str) -> String {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(separator)
        })
        .unwrap_or_default()
}

fn telecom(patient: &Value, system: &str) -> String {
    patient
        .get("telecom")
        .and_then(Value::as_array)
        .and_then(|points| {
            points
                .iter()
                .find(|p| p.get("system").and_then(Value::as_str) == Some(system))
        })
        .and_then(|p| p.get("value"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

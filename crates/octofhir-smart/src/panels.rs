//! Dashboard panel data.
//!
//! Each panel is loaded independently and degrades to empty on any failure,
//! so one unavailable resource type never hides the others.

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::client::{ClientError, FhirClient};

/// Shown for a vital sign without a usable observation.
pub const NO_DATA: &str = "No data";

const HEIGHT: &[&str] = &["8302-2"];
const WEIGHT: &[&str] = &["29463-7"];
const BLOOD_PRESSURE: &[&str] = &["85354-9", "55284-4"];
const TEMPERATURE: &[&str] = &["8310-5", "8331-1"];
const SYSTOLIC: &str = "8480-6";
const DIASTOLIC: &str = "8462-4";

/// One row of a list panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelRow {
    pub title: String,
    /// `YYYY-MM-DD`, empty when unknown.
    pub date: String,
    pub detail: String,
}

/// Latest value of each tracked vital sign, formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSigns {
    pub height: String,
    pub weight: String,
    pub blood_pressure: String,
    pub temperature: String,
}

impl Default for VitalSigns {
    fn default() -> Self {
        Self {
            height: NO_DATA.to_string(),
            weight: NO_DATA.to_string(),
            blood_pressure: NO_DATA.to_string(),
            temperature: NO_DATA.to_string(),
        }
    }
}

impl VitalSigns {
    /// Builds the vital signs from the latest observations.
    #[must_use]
    pub fn from_observations(observations: &[Value]) -> Self {
        let find = |codes: &[&str]| {
            observations
                .iter()
                .find(|obs| primary_code(obs).is_some_and(|c| codes.contains(&c)))
        };
        Self {
            height: find(HEIGHT).and_then(quantity_text).unwrap_or_else(no_data),
            weight: find(WEIGHT).and_then(quantity_text).unwrap_or_else(no_data),
            blood_pressure: find(BLOOD_PRESSURE)
                .and_then(blood_pressure_text)
                .unwrap_or_else(no_data),
            temperature: find(TEMPERATURE)
                .and_then(quantity_text)
                .unwrap_or_else(no_data),
        }
    }
}

/// Latest diagnostic report and its result observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReportPanel {
    pub report: PanelRow,
    pub results: Vec<PanelRow>,
}

/// Everything the dashboard shows below the patient banner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub vitals: VitalSigns,
    pub medications: Vec<PanelRow>,
    pub immunizations: Vec<PanelRow>,
    pub report: Option<DiagnosticReportPanel>,
}

impl Dashboard {
    /// Loads every panel concurrently. Panels are empty when no patient is in
    /// context.
    pub async fn load(client: &FhirClient) -> Self {
        let Some(patient_id) = client.patient_id() else {
            tracing::warn!("No patient in context, dashboard panels are empty");
            return Self::default();
        };

        let (vitals, medications, immunizations, report) = tokio::join!(
            load_vitals(client, patient_id),
            degrade("medications", load_medications(client, patient_id)),
            degrade("immunizations", load_immunizations(client, patient_id)),
            degrade("diagnostic reports", load_latest_report(client, patient_id)),
        );

        Self {
            vitals,
            medications,
            immunizations,
            report,
        }
    }
}

async fn degrade<T: Default>(
    panel: &str,
    load: impl Future<Output = Result<T, ClientError>>,
) -> T {
    load.await.unwrap_or_else(|e| {
        tracing::warn!("Failed to load {}: {}", panel, e);
        T::default()
    })
}

/// Fetches the latest observation of each vital sign code. Codes that fail
/// are skipped.
pub async fn load_vitals(client: &FhirClient, patient_id: &str) -> VitalSigns {
    let codes = HEIGHT
        .iter()
        .chain(WEIGHT)
        .chain(BLOOD_PRESSURE)
        .chain(TEMPERATURE);
    let requests = codes.map(|code| async move {
        let params = [
            ("patient", patient_id),
            ("code", *code),
            ("_sort", "-date"),
            ("_count", "1"),
        ];
        match client.search("Observation", &params).await {
            Ok(bundle) => bundle_resources(&bundle),
            Err(e) => {
                tracing::warn!("Failed to load vital sign {}: {}", code, e);
                Vec::new()
            }
        }
    });
    let observations: Vec<Value> = join_all(requests).await.into_iter().flatten().collect();
    VitalSigns::from_observations(&observations)
}

pub async fn load_medications(
    client: &FhirClient,
    patient_id: &str,
) -> Result<Vec<PanelRow>, ClientError> {
    let bundle = client
        .search(
            "MedicationRequest",
            &[("patient", patient_id), ("_sort", "-_lastUpdated")],
        )
        .await?;
    Ok(bundle_resources(&bundle)
        .iter()
        .map(|med| PanelRow {
            title: text_or(med, "/medicationCodeableConcept/text", "Unnamed Medication"),
            date: date_at(med, "/authoredOn"),
            detail: text_or(med, "/dosageInstruction/0/text", ""),
        })
        .collect())
}

pub async fn load_immunizations(
    client: &FhirClient,
    patient_id: &str,
) -> Result<Vec<PanelRow>, ClientError> {
    let bundle = client
        .search(
            "Immunization",
            &[("patient", patient_id), ("_sort", "-date")],
        )
        .await?;
    Ok(bundle_resources(&bundle)
        .iter()
        .map(|imm| PanelRow {
            title: text_or(imm, "/vaccineCode/text", "Unnamed Vaccine"),
            date: date_at(imm, "/occurrenceDateTime"),
            detail: text_or(imm, "/note/0/text", ""),
        })
        .collect())
}

/// Loads the latest diagnostic report and reads each of its results.
///
/// A result that cannot be read is left out.
pub async fn load_latest_report(
    client: &FhirClient,
    patient_id: &str,
) -> Result<Option<DiagnosticReportPanel>, ClientError> {
    let bundle = client
        .search(
            "DiagnosticReport",
            &[("patient", patient_id), ("_sort", "-date")],
        )
        .await?;
    let Some(report) = bundle_resources(&bundle).into_iter().next() else {
        return Ok(None);
    };

    let references: Vec<&str> = report
        .get("result")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|r| r.get("reference").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let reads = references.iter().map(|reference| async move {
        match client.read_reference(reference).await {
            Ok(obs) => Some(result_row(&obs)),
            Err(e) => {
                tracing::warn!("Failed to read report result {}: {}", reference, e);
                None
            }
        }
    });
    let results = join_all(reads).await.into_iter().flatten().collect();

    Ok(Some(DiagnosticReportPanel {
        report: PanelRow {
            title: text_or(&report, "/code/text", "Unnamed Report"),
            date: date_at(&report, "/effectiveDateTime"),
            detail: text_or(&report, "/conclusion", ""),
        },
        results,
    }))
}

fn result_row(observation: &Value) -> PanelRow {
    PanelRow {
        title: text_or(observation, "/code/text", "Unknown Test"),
        date: date_at(observation, "/effectiveDateTime"),
        detail: observation
            .pointer("/valueQuantity/value")
            .and_then(number_value)
            .map(|value| {
                let unit = text_or(observation, "/valueQuantity/unit", "");
                format!("{value:.2} {unit}").trim().to_string()
            })
            .unwrap_or_else(|| "N/A".to_string()),
    }
}

/// Resources of a searchset Bundle, in entry order.
#[must_use]
pub fn bundle_resources(bundle: &Value) -> Vec<Value> {
    bundle
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.get("resource").cloned())
                .collect()
        })
        .unwrap_or_default()
}

fn primary_code(observation: &Value) -> Option<&str> {
    observation
        .pointer("/code/coding/0/code")
        .and_then(Value::as_str)
}

fn quantity_text(observation: &Value) -> Option<String> {
    let value = observation
        .pointer("/valueQuantity/value")
        .and_then(Value::as_f64)
        .filter(|v| *v != 0.0)?;
    let unit = text_or(observation, "/valueQuantity/unit", "");
    Some(format!("{value:.2} {unit}").trim().to_string())
}

fn blood_pressure_text(observation: &Value) -> Option<String> {
    let component = |code: &str| {
        observation
            .get("component")?
            .as_array()?
            .iter()
            .find(|c| primary_code(c) == Some(code))?
            .pointer("/valueQuantity/value")?
            .as_f64()
            .filter(|v| *v != 0.0)
    };
    let systolic = component(SYSTOLIC)?;
    let diastolic = component(DIASTOLIC)?;
    Some(format!("{systolic:.2}/{diastolic:.2} mmHg"))
}

/// Numeric value of a JSON number or numeric string.
fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_or(resource: &Value, pointer: &str, default: &str) -> String {
    resource
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn date_at(resource: &Value, pointer: &str) -> String {
    resource
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(|d| d.chars().take(10).collect())
        .unwrap_or_default()
}

fn no_data() -> String {
    NO_DATA.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observation(code: &str, value: f64, unit: &str) -> Value {
        json!({
            "resourceType": "Observation",
            "code": {"coding": [{"system": "http://loinc.org", "code": code}]},
            "valueQuantity": {"value": value, "unit": unit}
        })
    }

    #[test]
    fn test_vitals_formatting() {
        let bp = json!({
            "resourceType": "Observation",
            "code": {"coding": [{"code": "55284-4"}]},
            "component": [
                {"code": {"coding": [{"code": "8480-6"}]}, "valueQuantity": {"value": 120}},
                {"code": {"coding": [{"code": "8462-4"}]}, "valueQuantity": {"value": 80.5}}
            ]
        });
        let vitals = VitalSigns::from_observations(&[
            observation("8302-2", 170.0, "cm"),
            observation("8331-1", 36.6, "Cel"),
            bp,
        ]);

        assert_eq!(vitals.height, "170.00 cm");
        assert_eq!(vitals.weight, NO_DATA);
        assert_eq!(vitals.blood_pressure, "120.00/80.50 mmHg");
        assert_eq!(vitals.temperature, "36.60 Cel");
    }

    #[test]
    fn test_vitals_incomplete_blood_pressure() {
        let bp = json!({
            "code": {"coding": [{"code": "85354-9"}]},
            "component": [
                {"code": {"coding": [{"code": "8480-6"}]}, "valueQuantity": {"value": 120}}
            ]
        });
        let vitals = VitalSigns::from_observations(&[bp]);
        assert_eq!(vitals.blood_pressure, NO_DATA);
        assert_eq!(VitalSigns::default(), VitalSigns::from_observations(&[]));
    }

    #[test]
    fn test_result_row() {
        let row = result_row(&json!({
            "code": {"text": "Hemoglobin"},
            "valueQuantity": {"value": 13.5, "unit": "g/dL"},
            "effectiveDateTime": "2024-03-01T10:00:00Z"
        }));
        assert_eq!(row.title, "Hemoglobin");
        assert_eq!(row.detail, "13.50 g/dL");
        assert_eq!(row.date, "2024-03-01");

        let row = result_row(&json!({
            "code": {"text": "Potassium"},
            "valueQuantity": {"value": "4.1", "unit": "mmol/L"}
        }));
        assert_eq!(row.detail, "4.10 mmol/L");

        let row = result_row(&json!({"valueQuantity": {"value": "high"}}));
        assert_eq!(row.detail, "N/A");

        let row = result_row(&json!({"resourceType": "Observation"}));
        assert_eq!(row.title, "Unknown Test");
        assert_eq!(row.detail, "N/A");
        assert_eq!(row.date, "");
    }

    #[test]
    fn test_bundle_resources() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"id": "a"}},
                {"fullUrl": "urn:uuid:x"},
                {"resource": {"id": "b"}}
            ]
        });
        let ids: Vec<_> = bundle_resources(&bundle)
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(bundle_resources(&json!({"resourceType": "Bundle"})).is_empty());
    }
}

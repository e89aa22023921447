use octofhir_smart::panels::NO_DATA;
use octofhir_smart::{ClientError, Dashboard, FhirClient};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, patient: Option<&str>) -> FhirClient {
    FhirClient::new(
        reqwest::Client::new(),
        &server.uri(),
        "abc123",
        patient.map(str::to_string),
    )
}

fn bundle(resources: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "entry": resources.into_iter().map(|r| json!({"resource": r})).collect::<Vec<_>>()
    })
}

#[tokio::test]
async fn current_patient_reads_patient_in_context() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Patient/p1"))
        .and(header("authorization", "Bearer abc123"))
        .and(header("accept", "application/json+fhir"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Patient",
            "id": "p1",
            "gender": "female"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let patient = client(&server, Some("p1")).current_patient().await.unwrap();
    assert_eq!(patient.id.as_deref(), Some("p1"));
    assert_eq!(patient.gender, "female");
    assert_eq!(patient.birth_date, "Unknown");
}

#[tokio::test]
async fn current_patient_without_context_takes_first_search_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Patient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(vec![
            json!({"resourceType": "Patient", "id": "first"}),
            json!({"resourceType": "Patient", "id": "second"}),
        ])))
        .mount(&server)
        .await;

    let patient = client(&server, None).current_patient().await.unwrap();
    assert_eq!(patient.id.as_deref(), Some("first"));
}

#[tokio::test]
async fn empty_search_is_no_patient() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Patient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(vec![])))
        .mount(&server)
        .await;

    let err = client(&server, None).current_patient().await.unwrap_err();
    assert!(matches!(err, ClientError::NoPatient));
}

#[tokio::test]
async fn error_statuses_are_classified() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Patient/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "error", "code": "not-found", "diagnostics": "Patient/gone not found"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Patient/secret"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = client(&server, None);

    match client.patient("gone").await.unwrap_err() {
        ClientError::HttpStatus { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Patient/gone not found");
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }

    let err = client.patient("secret").await.unwrap_err();
    assert!(err.is_credential_invalid());
}

#[tokio::test]
async fn dashboard_loads_every_panel() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Observation"))
        .and(query_param("patient", "p1"))
        .and(query_param("code", "29463-7"))
        .and(query_param("_count", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(vec![json!({
            "resourceType": "Observation",
            "code": {"coding": [{"system": "http://loinc.org", "code": "29463-7"}]},
            "valueQuantity": {"value": 72.456, "unit": "kg"}
        })])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/MedicationRequest"))
        .and(query_param("_sort", "-_lastUpdated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(vec![
            json!({
                "resourceType": "MedicationRequest",
                "medicationCodeableConcept": {"text": "Lisinopril 10 MG"},
                "authoredOn": "2024-01-15T09:30:00Z",
                "dosageInstruction": [{"text": "Once daily"}]
            }),
            json!({"resourceType": "MedicationRequest"}),
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Immunization"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/DiagnosticReport"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(vec![json!({
            "resourceType": "DiagnosticReport",
            "code": {"text": "Basic Metabolic Panel"},
            "effectiveDateTime": "2024-02-01",
            "conclusion": "Within normal limits",
            "result": [{"reference": "Observation/glucose"}, {"reference": "Observation/missing"}]
        })])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Observation/glucose"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Observation",
            "code": {"text": "Glucose"},
            "valueQuantity": {"value": 95, "unit": "mg/dL"},
            "effectiveDateTime": "2024-02-01T08:00:00Z"
        })))
        .mount(&server)
        .await;

    let dashboard = Dashboard::load(&client(&server, Some("p1"))).await;

    assert_eq!(dashboard.vitals.weight, "72.46 kg");
    assert_eq!(dashboard.vitals.height, NO_DATA);

    assert_eq!(dashboard.medications.len(), 2);
    assert_eq!(dashboard.medications[0].title, "Lisinopril 10 MG");
    assert_eq!(dashboard.medications[0].date, "2024-01-15");
    assert_eq!(dashboard.medications[0].detail, "Once daily");
    assert_eq!(dashboard.medications[1].title, "Unnamed Medication");

    // Failing panel degrades to empty
    assert!(dashboard.immunizations.is_empty());

    let report = dashboard.report.unwrap();
    assert_eq!(report.report.title, "Basic Metabolic Panel");
    assert_eq!(report.report.detail, "Within normal limits");
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].title, "Glucose");
    assert_eq!(report.results[0].detail, "95.00 mg/dL");
}

#[tokio::test]
async fn dashboard_without_patient_is_empty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dashboard = Dashboard::load(&client(&server, None)).await;
    assert_eq!(dashboard, Dashboard::default());
}

use anyhow::Result;
use octofhir_smart::{
    Dashboard, FhirClient, RestoreOutcome, SmartError, SmartLauncher, SubjectSource,
};
use serde_json::json;

use crate::cli::OutputFormat;
use crate::output::{
    print_json, print_patient_banner, print_report, print_rows, print_vitals, print_warning,
};

pub async fn dashboard(
    launcher: &SmartLauncher,
    http: &reqwest::Client,
    source: &dyn SubjectSource,
    format: OutputFormat,
) -> Result<()> {
    let (session, subject) = match launcher.restore(source).await? {
        RestoreOutcome::Authenticated { session, subject } => (session, subject),
        RestoreOutcome::Unauthenticated => {
            return Err(SmartError::not_authenticated(
                "no valid session, run `octofhir-viewer launch` to sign in",
            )
            .into());
        }
    };

    let client = FhirClient::from_session(http.clone(), &session)?;
    let dashboard = Dashboard::load(&client).await;

    if matches!(format, OutputFormat::Json) {
        return print_json(&json!({
            "patient": subject,
            "dashboard": dashboard,
        }));
    }

    match &subject {
        Some(patient) => print_patient_banner(patient),
        None => print_warning("Patient details are unavailable"),
    }
    print_vitals(&dashboard.vitals);
    print_rows(
        "Medications",
        ["Medication", "Prescribed", "Instructions"],
        &dashboard.medications,
        "No medications found.",
    );
    print_rows(
        "Immunizations",
        ["Vaccine", "Date", "Notes"],
        &dashboard.immunizations,
        "No immunizations found.",
    );
    print_report(dashboard.report.as_ref());
    Ok(())
}

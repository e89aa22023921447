use anyhow::Result;
use octofhir_smart::{SessionContext, SmartLauncher};
use serde_json::json;

use crate::cli::OutputFormat;
use crate::output::{print_field, print_json, print_success, token_preview};

pub async fn status(launcher: &SmartLauncher, profile: &str, format: OutputFormat) -> Result<()> {
    let session = launcher.session().await?;
    let phase = session.phase();

    if matches!(format, OutputFormat::Json) {
        return print_json(&json!({
            "profile": profile,
            "phase": phase.to_string(),
            "fhirBaseUrl": session.fhir_base_url,
            "patientId": session.patient_id,
            "issuer": session.issuer,
            "token": session.access_token.as_deref().map(token_preview),
        }));
    }

    print_field("Profile", profile);
    print_field("Phase", &phase.to_string());
    print_optional("Server", &session, |s| s.fhir_base_url.as_deref());
    print_optional("Issuer", &session, |s| s.issuer.as_deref());
    print_optional("Patient", &session, |s| s.patient_id.as_deref());
    if let Some(subject) = &session.current_subject {
        print_field("Patient Name", subject.display_name());
    }
    if let Some(token) = &session.access_token {
        print_field("Token", &token_preview(token));
    }
    Ok(())
}

fn print_optional(
    label: &str,
    session: &SessionContext,
    get: impl Fn(&SessionContext) -> Option<&str>,
) {
    if let Some(value) = get(session) {
        print_field(label, value);
    }
}

pub async fn logout(launcher: &SmartLauncher, profile: &str) -> Result<()> {
    if launcher.session().await?.is_empty() {
        println!("No session found for profile \"{profile}\"");
        return Ok(());
    }
    launcher.logout().await?;
    print_success("Logged out (session cleared)");
    Ok(())
}

use anyhow::Result;
use colored::Colorize;
use octofhir_smart::panels::DiagnosticReportPanel;
use octofhir_smart::{PanelRow, PatientSummary, VitalSigns};
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_field(label: &str, value: &str) {
    println!("{}: {}", label.cyan(), value);
}

/// Shortens a bearer token to its first and last 8 characters.
pub fn token_preview(token: &str) -> String {
    if token.len() > 20 && token.is_ascii() {
        format!("{}...{}", &token[..8], &token[token.len() - 8..])
    } else {
        "*".repeat(token.len().min(8))
    }
}

pub fn print_patient_banner(patient: &PatientSummary) {
    println!("{}", patient.display_name().bold());
    print_field("Patient ID", patient.id.as_deref().unwrap_or("-"));
    print_field("Gender", &patient.gender);
    print_field("Birth Date", &patient.birth_date);
    for (label, value) in [
        ("Address", &patient.address.full),
        ("Phone", &patient.phone),
        ("Email", &patient.email),
        ("Marital Status", &patient.marital_status),
        ("Language", &patient.language),
    ] {
        if !value.is_empty() {
            print_field(label, value);
        }
    }
}

pub fn print_vitals(vitals: &VitalSigns) {
    section("Vital Signs");
    let mut builder = Builder::default();
    builder.push_record(["Height", "Weight", "Blood Pressure", "Temperature"]);
    builder.push_record([
        vitals.height.as_str(),
        vitals.weight.as_str(),
        vitals.blood_pressure.as_str(),
        vitals.temperature.as_str(),
    ]);
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn print_rows(title: &str, headers: [&str; 3], rows: &[PanelRow], empty: &str) {
    section(title);
    if rows.is_empty() {
        println!("{empty}");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(headers);
    for row in rows {
        builder.push_record([row.title.as_str(), dash(&row.date), dash(&row.detail)]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn print_report(report: Option<&DiagnosticReportPanel>) {
    let Some(report) = report else {
        section("Clinical Data");
        println!("No diagnostic reports found.");
        return;
    };
    print_rows(
        "Clinical Data",
        ["Report", "Date", "Conclusion"],
        std::slice::from_ref(&report.report),
        "",
    );
    print_rows(
        "Results",
        ["Test", "Date", "Value"],
        &report.results,
        "No results.",
    );
}

fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

fn dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use octofhir_smart::ViewerConfig;
use octofhir_smart::config::loader::{DEFAULT_CONFIG_FILE, ENV_PREFIX};

use crate::cli::OutputFormat;
use crate::output::{print_field, print_json};

pub fn show(config: &ViewerConfig, source: Option<&Path>, format: OutputFormat) -> Result<()> {
    if matches!(format, OutputFormat::Json) {
        return print_json(config);
    }

    let file = match source {
        Some(path) => path.display().to_string(),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => DEFAULT_CONFIG_FILE.to_string(),
        None => "(built-in defaults)".to_string(),
    };
    print_field("Config file", &file);
    print_field("Env overrides", &format!("{ENV_PREFIX}__<SECTION>__<KEY>"));
    println!();

    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    for line in rendered.lines() {
        if line.starts_with('[') {
            println!("{}", line.cyan());
        } else {
            println!("{line}");
        }
    }
    Ok(())
}

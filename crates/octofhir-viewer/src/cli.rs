use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "octofhir-viewer")]
#[command(about = "OctoFHIR Viewer: SMART on FHIR clinical data viewer")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Session profile name
    #[arg(
        short,
        long,
        global = true,
        env = "OCTOFHIR_VIEWER_PROFILE",
        default_value = "default"
    )]
    pub profile: String,

    /// Configuration file (defaults to ./octofhir-viewer.toml when present)
    #[arg(short, long, global = true, env = "OCTOFHIR_VIEWER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter (overrides logging.level; RUST_LOG takes precedence)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an authorization (standalone, or EHR launch with --launch/--iss)
    Launch(LaunchArgs),
    /// Complete an authorization from the URL the browser was redirected to
    Callback(CallbackArgs),
    /// Handle a navigation URL: restore, launch or callback
    Open(OpenArgs),
    /// Show the current session
    Status,
    /// Clear the current session
    Logout,
    /// Show the patient banner and clinical panels
    Dashboard,
    /// Inspect viewer configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct LaunchArgs {
    /// EHR launch URL carrying `launch` and `iss` query parameters
    #[arg(long, conflicts_with_all = ["launch", "iss"])]
    pub url: Option<String>,
    /// Opaque EHR launch token
    #[arg(long, requires = "iss")]
    pub launch: Option<String>,
    /// FHIR server issuing the launch
    #[arg(long)]
    pub iss: Option<String>,
    /// Print the authorization URL without waiting for the callback
    #[arg(long)]
    pub no_listen: bool,
}

#[derive(clap::Args)]
pub struct CallbackArgs {
    /// Redirect URL including `code` and `state`
    pub url: String,
}

#[derive(clap::Args)]
pub struct OpenArgs {
    /// Navigation URL (launch URL or redirect URL)
    pub url: String,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
}

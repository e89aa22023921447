mod callback;
mod cli;
mod commands;
mod observability;
mod output;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use octofhir_smart::config::loader::load_config;
use octofhir_smart::{
    CurrentPatientSource, FileSessionStore, SmartError, SmartLauncher, build_http_client,
};

use cli::{Cli, Commands, ConfigCommands};
use output::{print_error, print_warning};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        if e
            .downcast_ref::<SmartError>()
            .is_some_and(SmartError::is_authentication_failure)
        {
            print_warning("Authorization failed; run `octofhir-viewer launch` to start over");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let profile = &cli.profile;
    let format = cli.format.unwrap_or_default();

    let config = load_config(cli.config.as_deref())?;
    observability::init_tracing_with_level(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
    );

    if let Commands::Config(args) = &cli.command {
        match args.command {
            ConfigCommands::Show => {
                commands::config::show(&config, cli.config.as_deref(), format)?;
            }
        }
        return Ok(());
    }

    let http = build_http_client(&config.http)?;
    let store = Arc::new(FileSessionStore::for_profile(profile)?);
    tracing::debug!("Using session file {}", store.path().display());
    let launcher = SmartLauncher::new(config.smart.clone(), http.clone(), store);
    let source = CurrentPatientSource::new(http.clone());

    match &cli.command {
        Commands::Launch(args) => {
            commands::launch::launch(&launcher, args, config.http.callback_timeout, &source)
                .await?;
        }
        Commands::Callback(args) => {
            commands::launch::complete(&launcher, &args.url, &source).await?;
        }
        Commands::Open(args) => {
            commands::launch::open(&launcher, &args.url, &source).await?;
        }
        Commands::Status => {
            commands::session::status(&launcher, profile, format).await?;
        }
        Commands::Logout => {
            commands::session::logout(&launcher, profile).await?;
        }
        Commands::Dashboard => {
            commands::dashboard::dashboard(&launcher, &http, &source, format).await?;
        }
        // Handled before the session is opened
        Commands::Config(_) => {}
    }

    Ok(())
}

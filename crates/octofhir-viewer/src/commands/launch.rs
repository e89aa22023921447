use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use octofhir_smart::{
    EndpointSource, LaunchParams, Navigation, NavigationOutcome, PatientSummary,
    PendingAuthorization, RestoreOutcome, SmartError, SmartLauncher, SubjectSource, TokenResponse,
};

use crate::callback::CallbackListener;
use crate::cli::LaunchArgs;
use crate::output::{print_field, print_success, print_warning};

pub async fn launch(
    launcher: &SmartLauncher,
    args: &LaunchArgs,
    callback_timeout: Duration,
    source: &dyn SubjectSource,
) -> Result<()> {
    let params = match &args.url {
        Some(url) => {
            let nav = Navigation::parse(url).with_context(|| format!("Invalid launch URL: {url}"))?;
            if !nav.is_ehr_launch() {
                anyhow::bail!("Launch URL must carry both `launch` and `iss` parameters");
            }
            nav.launch_params()
        }
        None => LaunchParams {
            launch: args.launch.clone(),
            iss: args.iss.clone(),
        },
    };

    // Bind before initiating so a busy port fails before any state is stored
    let listener = if args.no_listen {
        None
    } else {
        Some(CallbackListener::bind(&launcher.config().redirect_uri).await?)
    };

    let pending = launcher.initiate(&params).await?;
    print_pending(&pending, params.iss.is_some());

    match listener {
        Some(listener) => {
            println!(
                "Waiting for the authorization callback on {}...",
                launcher.config().redirect_uri.cyan()
            );
            let redirect = listener.wait(callback_timeout).await?;
            complete(launcher, redirect.as_str(), source).await
        }
        None => {
            println!(
                "After authorizing, run: {} {}",
                "octofhir-viewer callback".bold(),
                "'<redirect url>'".dimmed()
            );
            Ok(())
        }
    }
}

/// Completes an authorization from the URL the browser was redirected to.
pub async fn complete(
    launcher: &SmartLauncher,
    url: &str,
    source: &dyn SubjectSource,
) -> Result<()> {
    let nav = Navigation::parse(url).with_context(|| format!("Invalid redirect URL: {url}"))?;

    if let Some(error) = nav.error {
        launcher.logout().await?;
        return Err(SmartError::AuthorizationDenied {
            error,
            description: nav.error_description,
        }
        .into());
    }

    let callback = nav
        .callback()
        .context("Redirect URL carries no `code` and `state` parameters")?;
    let token = launcher
        .complete_callback(&callback.code, &callback.state)
        .await?;
    print_authenticated(launcher, &token, source).await
}

pub async fn open(launcher: &SmartLauncher, url: &str, source: &dyn SubjectSource) -> Result<()> {
    match launcher.handle_navigation(url, source).await? {
        NavigationOutcome::Restored(RestoreOutcome::Authenticated { session, subject }) => {
            print_success("Session restored");
            print_field("Server", session.fhir_base_url.as_deref().unwrap_or("-"));
            if let Some(subject) = subject {
                print_field("Patient", subject.display_name());
            }
        }
        NavigationOutcome::Restored(RestoreOutcome::Unauthenticated) => {
            print_warning("Stored credentials were rejected; the session was cleared");
        }
        NavigationOutcome::Redirect(pending) => {
            print_pending(&pending, true);
            println!(
                "After authorizing, run: {} {}",
                "octofhir-viewer callback".bold(),
                "'<redirect url>'".dimmed()
            );
        }
        NavigationOutcome::Authenticated(token) => {
            print_authenticated(launcher, &token, source).await?;
        }
        NavigationOutcome::Idle => {
            println!(
                "Nothing to do. Run {} to sign in.",
                "octofhir-viewer launch".bold()
            );
        }
    }
    Ok(())
}

fn print_pending(pending: &PendingAuthorization, ehr_launch: bool) {
    if ehr_launch && pending.endpoint_source == EndpointSource::Configured {
        print_warning("Endpoint discovery failed; using the configured authorization server");
    }
    println!("Open this URL in your browser to authorize:");
    println!();
    println!("  {}", pending.authorization_url.underline());
    println!();
}

async fn print_authenticated(
    launcher: &SmartLauncher,
    token: &TokenResponse,
    source: &dyn SubjectSource,
) -> Result<()> {
    let session = launcher.session().await?;
    print_success(&format!(
        "Authorized against {}",
        session.fhir_base_url.as_deref().unwrap_or("-").cyan()
    ));
    match attach_subject(launcher, source).await {
        Some(subject) => print_field("Patient", subject.display_name()),
        None => {
            if let Some(patient) = &token.patient {
                print_field("Patient", patient);
            }
            print_warning("Patient details are unavailable");
        }
    }
    if let Some(scope) = &token.scope {
        print_field("Scope", scope);
    }
    Ok(())
}

/// Fetches the current patient of a fresh session and caches it. Failures
/// are logged and leave the session authenticated.
async fn attach_subject(
    launcher: &SmartLauncher,
    source: &dyn SubjectSource,
) -> Option<PatientSummary> {
    let session = match launcher.session().await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Failed to read session: {}", e);
            return None;
        }
    };
    let subject = match source.fetch_subject(&session).await {
        Ok(subject) => subject,
        Err(e) => {
            tracing::warn!("Failed to fetch current patient: {}", e);
            return None;
        }
    };
    if let Err(e) = launcher.remember_subject(subject.clone()).await {
        tracing::warn!("Failed to cache current patient: {}", e);
    }
    Some(subject)
}

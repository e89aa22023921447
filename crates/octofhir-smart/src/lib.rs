//! # octofhir-smart
//!
//! SMART on FHIR app launch client for the OctoFHIR viewer.
//!
//! This crate provides:
//! - OAuth endpoint discovery (`.well-known/smart-configuration`, then the
//!   CapabilityStatement security extension)
//! - The two-phase authorization code flow for EHR and standalone launches
//! - Session context persistence with an explicit `load`/`save`/`clear` lifecycle
//! - A small bearer-authenticated FHIR client for the dashboard panels
//!
//! ## Overview
//!
//! A launch starts with [`SmartLauncher::initiate`], which returns a
//! [`PendingAuthorization`] carrying the authorization URL the user agent must
//! visit. When the authorization server redirects back, the `code` and `state`
//! parameters are passed to [`SmartLauncher::complete_callback`], which verifies
//! the anti-forgery state, exchanges the code and persists the session.
//!
//! ## Modules
//!
//! - [`config`] - Client configuration and layered loading
//! - [`discovery`] - OAuth endpoint resolver strategies
//! - [`launch`] - Navigation parameters, state generation, authorization URLs
//! - [`flow`] - The launch orchestrator
//! - [`session`] - Session context and stores
//! - [`client`] - FHIR resource client
//! - [`patient`] - Patient demographics formatting
//! - [`panels`] - Dashboard panel data loading

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod flow;
pub mod launch;
pub mod panels;
pub mod patient;
pub mod session;

pub use client::{ClientError, CurrentPatientSource, FhirClient, build_http_client};
pub use config::{ConfigError, HttpConfig, LoggingConfig, SmartClientConfig, ViewerConfig};
pub use discovery::{
    CapabilityStatementResolver, DiscoveryError, EndpointDiscoverer, EndpointResolver,
    OAuthEndpoints, SmartConfigurationResolver,
};
pub use error::SmartError;
pub use flow::{NavigationOutcome, RestoreOutcome, SmartLauncher, SubjectSource, TokenResponse};
pub use launch::{
    CallbackParams, EndpointSource, LaunchParams, Navigation, PendingAuthorization,
    generate_state,
};
pub use panels::{Dashboard, PanelRow, VitalSigns};
pub use patient::PatientSummary;
pub use session::{
    FileSessionStore, MemorySessionStore, SessionContext, SessionField, SessionPhase,
    SessionStore,
};

/// Type alias for launch and session results.
pub type SmartResult<T> = Result<T, SmartError>;

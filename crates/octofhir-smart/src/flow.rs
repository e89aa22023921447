//! SMART launch orchestrator.
//!
//! [`SmartLauncher`] drives one viewer profile through the authorization code
//! flow:
//!
//! ```text
//! Unauthenticated --initiate--> AwaitingCallback --complete_callback--> Authenticated
//! Unauthenticated --restore (valid token)--> Authenticated
//! AwaitingCallback --state mismatch | exchange failure--> Unauthenticated
//! Authenticated --logout | token rejected--> Unauthenticated
//! ```
//!
//! The phase is never stored; it is derived from the session context (see
//! [`SessionContext::phase`]).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::SmartResult;
use crate::client::ClientError;
use crate::config::SmartClientConfig;
use crate::discovery::{EndpointDiscoverer, OAuthEndpoints};
use crate::error::SmartError;
use crate::launch::{
    AuthorizationRequest, EndpointSource, LaunchParams, Navigation, PendingAuthorization,
    generate_state,
};
use crate::patient::PatientSummary;
use crate::session::{SessionContext, SessionPhase, SessionStore};

/// Response of the token endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for FHIR requests.
    pub access_token: String,

    /// Usually `Bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Lifetime of the access token in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Scopes actually granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Patient in context, when the launch carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,

    /// Encounter in context, when the launch carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<String>,

    /// OpenID Connect identity token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Returned by some servers; never used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Any additional launch context fields.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Fetches the "current subject" of an authenticated session.
///
/// Used by [`SmartLauncher::restore`] to check that a persisted token is
/// still accepted.
#[async_trait]
pub trait SubjectSource: Send + Sync {
    async fn fetch_subject(&self, session: &SessionContext) -> Result<PatientSummary, ClientError>;
}

/// Result of restoring a persisted session.
#[derive(Debug, Clone)]
pub enum RestoreOutcome {
    /// A token is stored. `subject` is `None` when it could not be fetched
    /// for a reason other than rejected credentials.
    Authenticated {
        session: SessionContext,
        subject: Option<PatientSummary>,
    },
    /// No usable token is stored.
    Unauthenticated,
}

/// What a navigation URL resolved to.
#[derive(Debug, Clone)]
pub enum NavigationOutcome {
    /// A stored session was restored (or found invalid and cleared).
    Restored(RestoreOutcome),
    /// An EHR launch was initiated; the user agent must visit the URL.
    Redirect(PendingAuthorization),
    /// A callback was completed.
    Authenticated(TokenResponse),
    /// Nothing to do: no session and no launch or callback parameters.
    Idle,
}

/// Orchestrates launch, callback, restore and logout for one profile.
pub struct SmartLauncher {
    config: SmartClientConfig,
    http: reqwest::Client,
    discoverer: EndpointDiscoverer,
    store: Arc<dyn SessionStore>,
}

impl SmartLauncher {
    /// Creates a launcher with the standard discovery chain.
    pub fn new(
        config: SmartClientConfig,
        http: reqwest::Client,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            discoverer: EndpointDiscoverer::new(http.clone()),
            config,
            http,
            store,
        }
    }

    pub fn config(&self) -> &SmartClientConfig {
        &self.config
    }

    /// Current phase of the profile.
    pub async fn phase(&self) -> SmartResult<SessionPhase> {
        Ok(self.store.load().await?.phase())
    }

    /// Current session context.
    pub async fn session(&self) -> SmartResult<SessionContext> {
        self.store.load().await
    }

    /// Starts an authorization: generates the anti-forgery state, resolves
    /// the endpoints and builds the authorization URL.
    ///
    /// Any previous session of the profile is replaced. Discovery failures
    /// fall back to the configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns `SmartError::Initiation` if the authorization URL cannot be
    /// built or the pending state cannot be stored.
    pub async fn initiate(&self, params: &LaunchParams) -> SmartResult<PendingAuthorization> {
        let state = generate_state();
        let mut session = SessionContext {
            pending_state: Some(state.clone()),
            ..Default::default()
        };

        let mut endpoints = OAuthEndpoints {
            authorization_endpoint: self.config.authorize_url.clone(),
            token_endpoint: self.config.token_url.clone(),
        };
        let mut endpoint_source = EndpointSource::Configured;
        let mut fhir_base_url = self.config.fhir_base_url.clone();

        if let Some(iss) = &params.iss {
            session.issuer = Some(iss.clone());
            session.fhir_base_url = Some(iss.clone());
            fhir_base_url = iss.clone();

            match self.discoverer.discover_endpoints(iss).await {
                Ok(discovered) => {
                    session.authorization_endpoint = Some(discovered.authorization_endpoint.clone());
                    session.token_endpoint = Some(discovered.token_endpoint.clone());
                    endpoints = discovered;
                    endpoint_source = EndpointSource::Discovered;
                }
                Err(e) => {
                    tracing::warn!(
                        "Endpoint discovery failed for {}, using configured endpoints: {}",
                        iss,
                        e
                    );
                }
            }
        }

        let request = AuthorizationRequest {
            client_id: &self.config.client_id,
            redirect_uri: &self.config.redirect_uri,
            scope: &self.config.scope,
            state: &state,
            aud: &fhir_base_url,
            launch: params.launch.as_deref(),
        };
        let authorization_url = request
            .to_url(&endpoints.authorization_endpoint)
            .map_err(|e| {
                SmartError::initiation(format!(
                    "invalid authorization endpoint {}: {e}",
                    endpoints.authorization_endpoint
                ))
            })?;

        self.store
            .save(&session)
            .await
            .map_err(|e| SmartError::initiation(format!("failed to store pending state: {e}")))?;

        tracing::info!(
            source = ?endpoint_source,
            ehr_launch = params.launch.is_some(),
            "Authorization request prepared for {}",
            fhir_base_url
        );

        Ok(PendingAuthorization {
            authorization_url: authorization_url.to_string(),
            state,
            fhir_base_url,
            endpoints,
            endpoint_source,
            launch: params.launch.clone(),
        })
    }

    /// Completes an authorization: verifies the returned state, exchanges
    /// the code and persists the authenticated session.
    ///
    /// The pending state is consumed on every path. On failure the whole
    /// session is cleared.
    ///
    /// # Errors
    ///
    /// - `SmartError::StateMismatch` if no state is pending or it differs
    /// - `SmartError::TokenExchange` if the token endpoint answers non-2xx
    /// - `SmartError::InvalidTokenResponse` if the body is not a token response
    /// - `SmartError::Http` on transport failures
    pub async fn complete_callback(
        &self,
        code: &str,
        returned_state: &str,
    ) -> SmartResult<TokenResponse> {
        let session = self.store.load().await?;

        if session.pending_state.as_deref() != Some(returned_state) {
            self.discard_session().await;
            return Err(SmartError::StateMismatch);
        }

        let token_endpoint = match &session.token_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                if let Some(issuer) = &session.issuer {
                    tracing::warn!(
                        "No token endpoint was discovered for {}, using the configured one",
                        issuer
                    );
                }
                self.config.token_url.clone()
            }
        };

        let token = match self.exchange_code(&token_endpoint, code).await {
            Ok(token) => token,
            Err(e) => {
                self.discard_session().await;
                return Err(e);
            }
        };

        let authenticated = SessionContext {
            access_token: Some(token.access_token.clone()),
            fhir_base_url: Some(
                session
                    .issuer
                    .clone()
                    .unwrap_or_else(|| self.config.fhir_base_url.clone()),
            ),
            patient_id: token.patient.clone(),
            pending_state: None,
            token_endpoint: session.token_endpoint,
            authorization_endpoint: session.authorization_endpoint,
            issuer: session.issuer,
            current_subject: None,
        };
        if let Err(e) = self.store.save(&authenticated).await {
            self.discard_session().await;
            return Err(e);
        }

        tracing::info!(
            patient = token.patient.as_deref().unwrap_or("-"),
            "Authorization completed"
        );
        Ok(token)
    }

    async fn exchange_code(&self, token_endpoint: &str, code: &str) -> SmartResult<TokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| SmartError::http(format!("Token request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(SmartError::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| SmartError::InvalidTokenResponse {
                message: e.to_string(),
            })?;
        if token.access_token.is_empty() {
            return Err(SmartError::InvalidTokenResponse {
                message: "empty access_token".to_string(),
            });
        }
        Ok(token)
    }

    /// Restores a persisted session.
    ///
    /// Uses the cached subject when present, otherwise asks `source` for it.
    /// Rejected credentials clear the session.
    pub async fn restore(&self, source: &dyn SubjectSource) -> SmartResult<RestoreOutcome> {
        let mut session = self.store.load().await?;
        if session.access_token.is_none() {
            return Ok(RestoreOutcome::Unauthenticated);
        }

        if let Some(subject) = session.current_subject.clone() {
            return Ok(RestoreOutcome::Authenticated {
                session,
                subject: Some(subject),
            });
        }

        match source.fetch_subject(&session).await {
            Ok(subject) => {
                session.current_subject = Some(subject.clone());
                self.store.save(&session).await?;
                Ok(RestoreOutcome::Authenticated {
                    session,
                    subject: Some(subject),
                })
            }
            Err(e) if e.is_credential_invalid() => {
                tracing::info!("Stored access token was rejected, clearing session: {}", e);
                self.store.clear().await?;
                Ok(RestoreOutcome::Unauthenticated)
            }
            Err(e) => {
                tracing::warn!("Failed to fetch current patient: {}", e);
                Ok(RestoreOutcome::Authenticated {
                    session,
                    subject: None,
                })
            }
        }
    }

    /// Caches a subject snapshot on the session, so later restores skip
    /// the fetch.
    pub async fn remember_subject(&self, subject: PatientSummary) -> SmartResult<()> {
        let mut session = self.store.load().await?;
        if session.access_token.is_none() {
            return Err(SmartError::not_authenticated("no session to attach a patient to"));
        }
        session.current_subject = Some(subject);
        self.store.save(&session).await
    }

    /// Clears every session field.
    pub async fn logout(&self) -> SmartResult<()> {
        self.store.clear().await?;
        tracing::info!("Session cleared");
        Ok(())
    }

    /// Routes a navigation URL: a stored token is restored, `launch` and
    /// `iss` initiate an EHR launch, `code` and `state` complete a callback.
    ///
    /// # Errors
    ///
    /// Returns `SmartError::AuthorizationDenied` when the URL carries an
    /// OAuth `error`, and propagates initiation and callback errors.
    pub async fn handle_navigation(
        &self,
        url: &str,
        source: &dyn SubjectSource,
    ) -> SmartResult<NavigationOutcome> {
        let nav = Navigation::parse(url)
            .map_err(|e| SmartError::initiation(format!("invalid navigation URL {url}: {e}")))?;

        let session = self.store.load().await?;
        if session.access_token.is_some() {
            return Ok(NavigationOutcome::Restored(self.restore(source).await?));
        }

        if let Some(error) = nav.error {
            self.discard_session().await;
            return Err(SmartError::AuthorizationDenied {
                error,
                description: nav.error_description,
            });
        }

        if nav.is_ehr_launch() {
            let pending = self.initiate(&nav.launch_params()).await?;
            return Ok(NavigationOutcome::Redirect(pending));
        }

        if let Some(callback) = nav.callback() {
            let token = self
                .complete_callback(&callback.code, &callback.state)
                .await?;
            return Ok(NavigationOutcome::Authenticated(token));
        }

        Ok(NavigationOutcome::Idle)
    }

    async fn discard_session(&self) {
        if let Err(e) = self.store.clear().await {
            tracing::warn!("Failed to clear session: {}", e);
        }
    }
}

//! SMART launch parameters and authorization requests.
//!
//! # Flow
//!
//! 1. The EHR opens the app with `?launch=<token>&iss=<fhir base>` (EHR
//!    launch), or the user starts the app directly (standalone launch)
//! 2. The app builds an authorization request carrying a fresh anti-forgery
//!    `state` and hands the user agent the resulting URL
//! 3. The authorization server redirects back to the app's redirect URI with
//!    `?code=...&state=...`
//!
//! [`Navigation`] parses the URL of steps 1 and 3. [`PendingAuthorization`] is
//! the serializable record of step 2, kept while the redirect round-trip is in
//! flight.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::discovery::OAuthEndpoints;

/// Scope token requesting EHR launch context.
pub const LAUNCH_SCOPE: &str = "launch";

// ============================================================================
// Navigation parameters
// ============================================================================

/// Query parameters of a navigation URL the app was opened with.
///
/// Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Opaque EHR launch token.
    pub launch: Option<String>,
    /// Issuer (FHIR base URL) of an EHR launch.
    pub iss: Option<String>,
    /// Authorization code on callback.
    pub code: Option<String>,
    /// Anti-forgery state on callback.
    pub state: Option<String>,
    /// OAuth error code on a failed callback.
    pub error: Option<String>,
    /// OAuth error description on a failed callback.
    pub error_description: Option<String>,
}

impl Navigation {
    /// Parses a navigation URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not an absolute URL.
    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::from_url(&Url::parse(url)?))
    }

    /// Extracts the launch and callback parameters from a URL.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let mut nav = Self::default();
        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "launch" => &mut nav.launch,
                "iss" => &mut nav.iss,
                "code" => &mut nav.code,
                "state" => &mut nav.state,
                "error" => &mut nav.error,
                "error_description" => &mut nav.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        nav
    }

    /// The launch parameters carried by this navigation.
    #[must_use]
    pub fn launch_params(&self) -> LaunchParams {
        LaunchParams {
            launch: self.launch.clone(),
            iss: self.iss.clone(),
        }
    }

    /// The callback parameters, when both `code` and `state` are present.
    #[must_use]
    pub fn callback(&self) -> Option<CallbackParams> {
        match (&self.code, &self.state) {
            (Some(code), Some(state)) => Some(CallbackParams {
                code: code.clone(),
                state: state.clone(),
            }),
            _ => None,
        }
    }

    /// Returns `true` when the EHR supplied both `launch` and `iss`.
    #[must_use]
    pub fn is_ehr_launch(&self) -> bool {
        self.launch.is_some() && self.iss.is_some()
    }
}

/// Launch signal from the EHR. Both fields are absent in a standalone launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchParams {
    /// Opaque launch token, forwarded verbatim to the authorization server.
    pub launch: Option<String>,
    /// Issuer (FHIR base URL) to discover endpoints from.
    pub iss: Option<String>,
}

impl LaunchParams {
    /// Parameters of a standalone launch.
    #[must_use]
    pub fn standalone() -> Self {
        Self::default()
    }

    /// Parameters of an EHR launch.
    #[must_use]
    pub fn ehr(launch: impl Into<String>, iss: impl Into<String>) -> Self {
        Self {
            launch: Some(launch.into()),
            iss: Some(iss.into()),
        }
    }
}

/// Parameters returned by the authorization server on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code to exchange.
    pub code: String,
    /// Anti-forgery state to verify.
    pub state: String,
}

// ============================================================================
// Pending authorization
// ============================================================================

/// Where the endpoints of a pending authorization came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointSource {
    /// Resolved from the launch issuer.
    Discovered,
    /// Taken from static configuration.
    Configured,
}

/// The intermediate state of a launch while the user agent visits the
/// authorization server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAuthorization {
    /// URL the user agent must be sent to.
    pub authorization_url: String,
    /// Anti-forgery state embedded in the URL.
    pub state: String,
    /// FHIR base URL sent as `aud`.
    pub fhir_base_url: String,
    /// Endpoints used for this launch.
    pub endpoints: OAuthEndpoints,
    /// How the endpoints were obtained.
    pub endpoint_source: EndpointSource,
    /// EHR launch token, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch: Option<String>,
}

/// An OAuth 2.0 authorization request for a public SMART client.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'a> {
    /// OAuth client identifier.
    pub client_id: &'a str,
    /// Registered redirect URI.
    pub redirect_uri: &'a str,
    /// Configured scopes, without the launch scope.
    pub scope: &'a str,
    /// Anti-forgery state.
    pub state: &'a str,
    /// Audience: the FHIR base URL the token is for.
    pub aud: &'a str,
    /// EHR launch token.
    pub launch: Option<&'a str>,
}

impl AuthorizationRequest<'_> {
    /// Scope string sent to the server, with `launch` prepended for EHR
    /// launches.
    #[must_use]
    pub fn effective_scope(&self) -> String {
        if self.launch.is_some() {
            format!("{LAUNCH_SCOPE} {}", self.scope)
        } else {
            self.scope.to_string()
        }
    }

    /// Builds the authorization URL against `authorization_endpoint`.
    ///
    /// Query parameters already present on the endpoint are preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not an absolute URL.
    pub fn to_url(&self, authorization_endpoint: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(authorization_endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", self.client_id)
                .append_pair("redirect_uri", self.redirect_uri)
                .append_pair("scope", &self.effective_scope())
                .append_pair("state", self.state)
                .append_pair("aud", self.aud);
            if let Some(launch) = self.launch {
                query.append_pair("launch", launch);
            }
        }
        Ok(url)
    }
}

/// Generates a cryptographically random anti-forgery state.
///
/// Uses 32 bytes (256 bits) of entropy, base64url encoded without padding.
///
/// # Examples
///
/// ```
/// use octofhir_smart::launch::generate_state;
///
/// let s1 = generate_state();
/// let s2 = generate_state();
///
/// assert_eq!(s1.len(), 43);
/// assert_ne!(s1, s2);
/// ```
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

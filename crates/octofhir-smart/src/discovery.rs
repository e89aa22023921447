//! OAuth endpoint discovery for SMART launches.
//!
//! Given the issuer (`iss`) of an EHR launch, this module resolves the
//! authorization and token endpoints by trying an ordered list of
//! [`EndpointResolver`] strategies:
//!
//! 1. [`SmartConfigurationResolver`] - `{iss}/.well-known/smart-configuration`
//! 2. [`CapabilityStatementResolver`] - the `oauth-uris` extension in
//!    `{iss}/metadata` (`rest[0].security.extension[0].extension[]`)
//!
//! The first strategy that yields both endpoints wins. When every strategy
//! fails, [`DiscoveryError::Exhausted`] carries each failure; a partially
//! resolved pair is never returned.
//!
//! # References
//!
//! - [SMART App Launch: Conformance](https://build.fhir.org/ig/HL7/smart-app-launch/conformance.html)

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Canonical URL of the SMART OAuth URIs extension.
pub const OAUTH_URIS_EXTENSION: &str =
    "http://fhir-registry.smarthealthit.org/StructureDefinition/oauth-uris";

/// Resolved OAuth 2.0 endpoints of an authorization server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthEndpoints {
    /// URL of the authorization endpoint.
    pub authorization_endpoint: String,
    /// URL of the token endpoint.
    pub token_endpoint: String,
}

/// Errors that can occur during endpoint discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The issuer URL could not be parsed.
    #[error("Invalid issuer URL: {0}")]
    InvalidIssuer(String),

    /// A network error occurred while fetching a discovery document.
    #[error("Network error: {0}")]
    Network(String),

    /// The discovery request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    /// The discovery document could not be parsed.
    #[error("Failed to parse {document}: {message}")]
    Parse {
        /// Which document failed to parse.
        document: &'static str,
        /// Parser message.
        message: String,
    },

    /// The document was readable but did not advertise the endpoint.
    #[error("{document} does not advertise a {endpoint} endpoint")]
    MissingEndpoint {
        /// Which document was inspected.
        document: &'static str,
        /// Which endpoint was missing.
        endpoint: &'static str,
    },

    /// No strategy produced both endpoints.
    #[error("Endpoint discovery failed for {issuer}: {}", summarize(.failures))]
    Exhausted {
        /// The issuer that was being resolved.
        issuer: String,
        /// Failure of each strategy, in the order they were tried.
        failures: Vec<StrategyFailure>,
    },
}

/// The failure of one resolver strategy.
#[derive(Debug)]
pub struct StrategyFailure {
    /// Name of the strategy.
    pub strategy: &'static str,
    /// Why it failed.
    pub error: DiscoveryError,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.error)
    }
}

fn summarize(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single way of resolving OAuth endpoints from an issuer.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// Short name used in logs and error reports.
    fn name(&self) -> &'static str;

    /// Resolves both endpoints or reports why it could not.
    async fn resolve(
        &self,
        http: &reqwest::Client,
        issuer: &Url,
    ) -> Result<OAuthEndpoints, DiscoveryError>;
}

/// Resolves endpoints from `{iss}/.well-known/smart-configuration`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmartConfigurationResolver;

/// The subset of the SMART configuration document the launcher needs.
#[derive(Debug, Clone, Deserialize)]
pub struct SmartConfigurationDocument {
    /// Issuer advertised by the server.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Authorization endpoint URL.
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    /// Token endpoint URL.
    #[serde(default)]
    pub token_endpoint: Option<String>,
    /// SMART capabilities (`launch-ehr`, `client-public`, ...).
    #[serde(default)]
    pub capabilities: Vec<String>,
}

const SMART_CONFIGURATION: &str = "smart-configuration";

#[async_trait]
impl EndpointResolver for SmartConfigurationResolver {
    fn name(&self) -> &'static str {
        SMART_CONFIGURATION
    }

    async fn resolve(
        &self,
        http: &reqwest::Client,
        issuer: &Url,
    ) -> Result<OAuthEndpoints, DiscoveryError> {
        let url = issuer_path(issuer, ".well-known/smart-configuration");
        let body = fetch_json(http, &url, "application/json", SMART_CONFIGURATION).await?;
        let document: SmartConfigurationDocument =
            serde_json::from_value(body).map_err(|e| DiscoveryError::Parse {
                document: SMART_CONFIGURATION,
                message: e.to_string(),
            })?;

        tracing::trace!(
            capabilities = ?document.capabilities,
            "Parsed SMART configuration for {}",
            issuer
        );

        let authorization_endpoint = document
            .authorization_endpoint
            .filter(|s| !s.is_empty())
            .ok_or(DiscoveryError::MissingEndpoint {
                document: SMART_CONFIGURATION,
                endpoint: "authorize",
            })?;
        let token_endpoint = document
            .token_endpoint
            .filter(|s| !s.is_empty())
            .ok_or(DiscoveryError::MissingEndpoint {
                document: SMART_CONFIGURATION,
                endpoint: "token",
            })?;

        Ok(OAuthEndpoints {
            authorization_endpoint,
            token_endpoint,
        })
    }
}

/// Resolves endpoints from the CapabilityStatement served at `{iss}/metadata`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityStatementResolver;

const CAPABILITY_STATEMENT: &str = "CapabilityStatement";

#[async_trait]
impl EndpointResolver for CapabilityStatementResolver {
    fn name(&self) -> &'static str {
        "metadata"
    }

    async fn resolve(
        &self,
        http: &reqwest::Client,
        issuer: &Url,
    ) -> Result<OAuthEndpoints, DiscoveryError> {
        let url = issuer_path(issuer, "metadata");
        let body = fetch_json(http, &url, "application/fhir+json", CAPABILITY_STATEMENT).await?;
        extract_oauth_uris(&body)
    }
}

/// Extracts the `authorize` and `token` URIs from a CapabilityStatement.
///
/// Reads `rest[0].security.extension[]`, preferring the SMART `oauth-uris`
/// extension and otherwise taking the first one, then looks for nested
/// extensions with `url` equal to `authorize` and `token`.
pub fn extract_oauth_uris(capability_statement: &Value) -> Result<OAuthEndpoints, DiscoveryError> {
    let extensions = capability_statement
        .pointer("/rest/0/security/extension")
        .and_then(Value::as_array);

    let oauth_uris = extensions.and_then(|exts| {
        exts.iter()
            .find(|e| e.get("url").and_then(Value::as_str) == Some(OAUTH_URIS_EXTENSION))
            .or_else(|| exts.first())
    });

    let nested = oauth_uris
        .and_then(|e| e.get("extension"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let find_uri = |name: &'static str| {
        nested
            .iter()
            .find(|e| e.get("url").and_then(Value::as_str) == Some(name))
            .and_then(|e| e.get("valueUri"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(DiscoveryError::MissingEndpoint {
                document: CAPABILITY_STATEMENT,
                endpoint: name,
            })
    };

    Ok(OAuthEndpoints {
        authorization_endpoint: find_uri("authorize")?,
        token_endpoint: find_uri("token")?,
    })
}

/// Resolves OAuth endpoints for an issuer by trying each strategy in order.
pub struct EndpointDiscoverer {
    http: reqwest::Client,
    resolvers: Vec<Box<dyn EndpointResolver>>,
}

impl EndpointDiscoverer {
    /// Creates a discoverer with the standard chain: SMART configuration
    /// document, then CapabilityStatement.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_resolvers(
            http,
            vec![
                Box::new(SmartConfigurationResolver),
                Box::new(CapabilityStatementResolver),
            ],
        )
    }

    /// Creates a discoverer with a custom, ordered list of strategies.
    #[must_use]
    pub fn with_resolvers(http: reqwest::Client, resolvers: Vec<Box<dyn EndpointResolver>>) -> Self {
        Self { http, resolvers }
    }

    /// Resolves the authorization and token endpoints for `issuer`.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::InvalidIssuer` if the issuer is not an
    /// absolute URL, or `DiscoveryError::Exhausted` if no strategy produced
    /// both endpoints.
    pub async fn discover_endpoints(&self, issuer: &str) -> Result<OAuthEndpoints, DiscoveryError> {
        let issuer_url =
            Url::parse(issuer).map_err(|e| DiscoveryError::InvalidIssuer(format!("{issuer}: {e}")))?;

        let mut failures = Vec::with_capacity(self.resolvers.len());
        for resolver in &self.resolvers {
            match resolver.resolve(&self.http, &issuer_url).await {
                Ok(endpoints) => {
                    tracing::debug!(
                        strategy = resolver.name(),
                        "Discovered OAuth endpoints for {}",
                        issuer
                    );
                    return Ok(endpoints);
                }
                Err(error) => {
                    tracing::warn!(
                        strategy = resolver.name(),
                        "Endpoint discovery strategy failed for {}: {}",
                        issuer,
                        error
                    );
                    failures.push(StrategyFailure {
                        strategy: resolver.name(),
                        error,
                    });
                }
            }
        }

        Err(DiscoveryError::Exhausted {
            issuer: issuer.to_string(),
            failures,
        })
    }
}

/// Builds `{issuer}/{suffix}`, tolerating a trailing slash on the issuer.
fn issuer_path(issuer: &Url, suffix: &str) -> Url {
    let mut url = issuer.clone();
    let path = issuer.path().trim_end_matches('/');
    url.set_path(&format!("{path}/{suffix}"));
    url
}

async fn fetch_json(
    http: &reqwest::Client,
    url: &Url,
    accept: &str,
    document: &'static str,
) -> Result<Value, DiscoveryError> {
    let response = http
        .get(url.as_str())
        .header("Accept", accept)
        .send()
        .await
        .map_err(|e| DiscoveryError::Network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(DiscoveryError::HttpStatus(response.status().as_u16()));
    }

    response.json().await.map_err(|e| DiscoveryError::Parse {
        document,
        message: e.to_string(),
    })
}

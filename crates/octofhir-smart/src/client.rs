//! Bearer-authenticated FHIR resource client.
//!
//! Consumes the session produced by the launcher; it never takes part in
//! authentication except to report rejected credentials.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::SmartResult;
use crate::config::HttpConfig;
use crate::error::SmartError;
use crate::flow::SubjectSource;
use crate::patient::{PatientSummary, extract_patient};
use crate::session::SessionContext;

/// Media type sent on every resource read.
pub const FHIR_ACCEPT: &str = "application/json+fhir";

/// Builds the shared HTTP client with the configured request timeout.
///
/// # Errors
///
/// Returns `SmartError::Http` if the TLS backend cannot be initialized.
pub fn build_http_client(config: &HttpConfig) -> SmartResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| SmartError::http(format!("Failed to build HTTP client: {e}")))
}

/// Errors returned by resource reads.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server rejected the bearer token (401 or 403).
    #[error("Access token rejected (HTTP {status})")]
    CredentialInvalid { status: u16 },

    /// Any other non-success status.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Failed to connect to server: {0}")]
    Network(String),

    #[error("Failed to parse response JSON: {0}")]
    Parse(String),

    /// No Patient could be found for the session.
    #[error("No patient found")]
    NoPatient,

    /// The session has no token or no FHIR base URL.
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),
}

impl ClientError {
    /// Returns `true` when the server rejected the credentials.
    #[must_use]
    pub fn is_credential_invalid(&self) -> bool {
        matches!(self, Self::CredentialInvalid { .. })
    }
}

impl From<ClientError> for SmartError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::CredentialInvalid { .. } => SmartError::CredentialInvalid,
            ClientError::NotAuthenticated(message) => SmartError::not_authenticated(message),
            other => SmartError::http(other.to_string()),
        }
    }
}

/// FHIR REST client bound to one authenticated session.
#[derive(Debug, Clone)]
pub struct FhirClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    patient_id: Option<String>,
}

impl FhirClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        token: impl Into<String>,
        patient_id: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            patient_id,
        }
    }

    /// Creates a client from an authenticated session.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotAuthenticated` if the session lacks an access
    /// token or a FHIR base URL.
    pub fn from_session(
        http: reqwest::Client,
        session: &SessionContext,
    ) -> Result<Self, ClientError> {
        let token = session
            .access_token
            .as_deref()
            .ok_or_else(|| ClientError::NotAuthenticated("no access token".into()))?;
        let base_url = session
            .fhir_base_url
            .as_deref()
            .ok_or_else(|| ClientError::NotAuthenticated("no FHIR base URL".into()))?;
        Ok(Self::new(http, base_url, token, session.patient_id.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Patient in context, if any.
    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }

    fn resource_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, FHIR_ACCEPT)
    }

    pub async fn read(&self, resource_type: &str, id: &str) -> Result<Value, ClientError> {
        let url = self.resource_url(&format!("{resource_type}/{id}"));
        self.fetch(self.get(&url)).await
    }

    /// Reads a resource by literal reference (`Observation/123` or an
    /// absolute URL).
    pub async fn read_reference(&self, reference: &str) -> Result<Value, ClientError> {
        let url = if reference.starts_with("http://") || reference.starts_with("https://") {
            reference.to_string()
        } else {
            self.resource_url(reference)
        };
        self.fetch(self.get(&url)).await
    }

    pub async fn search(
        &self,
        resource_type: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, ClientError> {
        let url = self.resource_url(resource_type);
        self.fetch(self.get(&url).query(params)).await
    }

    /// Reads a specific patient.
    pub async fn patient(&self, id: &str) -> Result<PatientSummary, ClientError> {
        let body = self.read("Patient", id).await?;
        let patient = extract_patient(&body).ok_or(ClientError::NoPatient)?;
        Ok(PatientSummary::from_resource(patient))
    }

    /// Fetches the patient in context, or the first patient visible to the
    /// token when none is in context.
    pub async fn current_patient(&self) -> Result<PatientSummary, ClientError> {
        let body = match &self.patient_id {
            Some(id) => self.read("Patient", id).await?,
            None => self.search("Patient", &[]).await?,
        };
        let patient = extract_patient(&body).ok_or(ClientError::NoPatient)?;
        Ok(PatientSummary::from_resource(patient))
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<Value, ClientError> {
        let resp = request
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value, ClientError> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ClientError::CredentialInvalid {
            status: status.as_u16(),
        });
    }

    if !status.is_success() {
        let message = operation_outcome_diagnostics(&body).unwrap_or(body);
        return Err(ClientError::HttpStatus {
            status: status.as_u16(),
            message,
        });
    }

    if body.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| ClientError::Parse(e.to_string()))
}

fn operation_outcome_diagnostics(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    if json.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome") {
        return None;
    }
    let msgs: Vec<&str> = json
        .get("issue")?
        .as_array()?
        .iter()
        .filter_map(|i| i.get("diagnostics").and_then(Value::as_str))
        .collect();
    (!msgs.is_empty()).then(|| msgs.join("; "))
}

/// Fetches the current patient of a session over HTTP.
#[derive(Debug, Clone)]
pub struct CurrentPatientSource {
    http: reqwest::Client,
}

impl CurrentPatientSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SubjectSource for CurrentPatientSource {
    async fn fetch_subject(&self, session: &SessionContext) -> Result<PatientSummary, ClientError> {
        FhirClient::from_session(self.http.clone(), session)?
            .current_patient()
            .await
    }
}

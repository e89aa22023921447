//! Session context and session stores.
//!
//! The viewer keeps exactly one [`SessionContext`] per profile. It is written
//! as a whole, so a reader never observes a token without its FHIR base URL
//! or a half-cleared session.
//!
//! # Lifecycle
//!
//! - Created empty at start
//! - Populated by `initiate` (pending state, issuer, endpoints)
//! - Completed by `complete_callback` (access token, FHIR base URL, patient)
//! - Cleared on logout, failed callback, or rejected credentials
//!
//! # Security Considerations
//!
//! - The access token is stored in plain JSON; the file store relies on the
//!   user's home directory permissions
//! - Never log access tokens or pending states

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::SmartResult;
use crate::error::SmartError;
use crate::patient::PatientSummary;

// ============================================================================
// Session Context
// ============================================================================

/// The authenticated (or authenticating) context of one viewer profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    /// Bearer token, present only after a successful exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// FHIR server the token is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fhir_base_url: Option<String>,

    /// In-context patient from the token response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,

    /// Single-use anti-forgery state of the in-flight authorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_state: Option<String>,

    /// Token endpoint discovered from the launch issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// Authorization endpoint discovered from the launch issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// `iss` received with an EHR launch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Cached current patient, to skip re-fetching on restore.
    #[serde(
        default,
        rename = "currentPatient",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_subject: Option<PatientSummary>,
}

/// Individually addressable session fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionField {
    AccessToken,
    FhirBaseUrl,
    PatientId,
    PendingState,
    TokenEndpoint,
    AuthorizationEndpoint,
    Issuer,
}

impl SessionField {
    /// Every field, in storage order.
    pub const ALL: [SessionField; 7] = [
        Self::AccessToken,
        Self::FhirBaseUrl,
        Self::PatientId,
        Self::PendingState,
        Self::TokenEndpoint,
        Self::AuthorizationEndpoint,
        Self::Issuer,
    ];

    /// Persisted key name.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::AccessToken => "accessToken",
            Self::FhirBaseUrl => "fhirBaseUrl",
            Self::PatientId => "patientId",
            Self::PendingState => "pendingState",
            Self::TokenEndpoint => "tokenEndpoint",
            Self::AuthorizationEndpoint => "authorizationEndpoint",
            Self::Issuer => "issuer",
        }
    }
}

/// Where a session is in the launch state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No token and no authorization in flight.
    Unauthenticated,
    /// An authorization request was issued; waiting for the redirect back.
    AwaitingCallback,
    /// A token has been obtained (or restored).
    Authenticated,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::AwaitingCallback => "awaiting callback",
            Self::Authenticated => "authenticated",
        };
        f.write_str(name)
    }
}

impl SessionContext {
    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Current phase derived from which fields are present.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.access_token.is_some() {
            SessionPhase::Authenticated
        } else if self.pending_state.is_some() {
            SessionPhase::AwaitingCallback
        } else {
            SessionPhase::Unauthenticated
        }
    }

    /// Reads a single field.
    #[must_use]
    pub fn field(&self, field: SessionField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// Replaces a single field.
    pub fn set_field(&mut self, field: SessionField, value: Option<String>) {
        *self.slot_mut(field) = value;
    }

    fn slot(&self, field: SessionField) -> &Option<String> {
        match field {
            SessionField::AccessToken => &self.access_token,
            SessionField::FhirBaseUrl => &self.fhir_base_url,
            SessionField::PatientId => &self.patient_id,
            SessionField::PendingState => &self.pending_state,
            SessionField::TokenEndpoint => &self.token_endpoint,
            SessionField::AuthorizationEndpoint => &self.authorization_endpoint,
            SessionField::Issuer => &self.issuer,
        }
    }

    fn slot_mut(&mut self, field: SessionField) -> &mut Option<String> {
        match field {
            SessionField::AccessToken => &mut self.access_token,
            SessionField::FhirBaseUrl => &mut self.fhir_base_url,
            SessionField::PatientId => &mut self.patient_id,
            SessionField::PendingState => &mut self.pending_state,
            SessionField::TokenEndpoint => &mut self.token_endpoint,
            SessionField::AuthorizationEndpoint => &mut self.authorization_endpoint,
            SessionField::Issuer => &mut self.issuer,
        }
    }
}

// ============================================================================
// Session Store
// ============================================================================

/// Storage for the session context of one viewer profile.
///
/// `save` and `clear` replace the whole context in a single operation.
/// The per-field accessors are built on top of `load` and `save`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the current context; an empty context if nothing is stored.
    async fn load(&self) -> SmartResult<SessionContext>;

    /// Replaces the stored context.
    async fn save(&self, session: &SessionContext) -> SmartResult<()>;

    /// Removes every stored field.
    async fn clear(&self) -> SmartResult<()>;

    /// Reads a single field.
    async fn get(&self, field: SessionField) -> SmartResult<Option<String>> {
        Ok(self.load().await?.field(field).map(str::to_string))
    }

    /// Writes a single field.
    async fn set(&self, field: SessionField, value: String) -> SmartResult<()> {
        let mut session = self.load().await?;
        session.set_field(field, Some(value));
        self.save(&session).await
    }

    /// Removes a single field.
    async fn remove(&self, field: SessionField) -> SmartResult<()> {
        let mut session = self.load().await?;
        session.set_field(field, None);
        self.save(&session).await
    }
}

/// Session store living as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: RwLock<SessionContext>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `session`.
    #[must_use]
    pub fn with_session(session: SessionContext) -> Self {
        Self {
            session: RwLock::new(session),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> SmartResult<SessionContext> {
        Ok(self.session.read().await.clone())
    }

    async fn save(&self, session: &SessionContext) -> SmartResult<()> {
        *self.session.write().await = session.clone();
        Ok(())
    }

    async fn clear(&self) -> SmartResult<()> {
        *self.session.write().await = SessionContext::default();
        Ok(())
    }
}

/// Session store persisted as a JSON file, one file per profile.
///
/// Saves go through a temporary file renamed over the target, and clearing
/// removes the file, so a concurrent reader sees either the old or the new
/// context.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates the store for a named profile under `~/.octofhir/viewer/`.
    ///
    /// # Errors
    ///
    /// Returns `SmartError::Storage` if the profile name is empty or contains
    /// a path component, or if the home directory cannot be determined.
    pub fn for_profile(profile: &str) -> SmartResult<Self> {
        if profile.is_empty() || profile.contains(['/', '\\']) || profile.contains("..") {
            return Err(SmartError::storage(format!(
                "Invalid profile name '{profile}'"
            )));
        }
        let dir = dirs::home_dir()
            .ok_or_else(|| SmartError::storage("Cannot determine home directory"))?
            .join(".octofhir")
            .join("viewer");
        Ok(Self::new(dir.join(format!("session.{profile}.json"))))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> SmartResult<SessionContext> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SessionContext::default()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(session) => Ok(session),
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable session file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(SessionContext::default())
            }
        }
    }

    async fn save(&self, session: &SessionContext) -> SmartResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(session)
            .map_err(|e| SmartError::storage(e.to_string()))?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, content).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        tracing::debug!("Saved session to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> SmartResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!("Removed session file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticated() -> SessionContext {
        SessionContext {
            access_token: Some("abc123".to_string()),
            fhir_base_url: Some("https://fhir.example.com".to_string()),
            patient_id: Some("p1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_phase() {
        let mut session = SessionContext::default();
        assert!(session.is_empty());
        assert_eq!(session.phase(), SessionPhase::Unauthenticated);

        session.pending_state = Some("s".to_string());
        assert_eq!(session.phase(), SessionPhase::AwaitingCallback);

        assert_eq!(authenticated().phase(), SessionPhase::Authenticated);
    }

    #[test]
    fn test_field_access() {
        let mut session = authenticated();
        for field in SessionField::ALL {
            session.set_field(field, Some(field.key().to_string()));
            assert_eq!(session.field(field), Some(field.key()));
        }
        session.set_field(SessionField::AccessToken, None);
        assert!(session.access_token.is_none());
    }

    #[test]
    fn test_serialized_layout() {
        let json = serde_json::to_value(authenticated()).unwrap();
        assert_eq!(json["accessToken"], "abc123");
        assert_eq!(json["fhirBaseUrl"], "https://fhir.example.com");
        assert_eq!(json["patientId"], "p1");
        assert!(json.get("pendingState").is_none());
        assert!(json.get("currentPatient").is_none());
    }

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemorySessionStore::new();
        assert!(store.load().await.unwrap().is_empty());

        store.save(&authenticated()).await.unwrap();
        assert_eq!(
            store.get(SessionField::AccessToken).await.unwrap().as_deref(),
            Some("abc123")
        );

        store
            .set(SessionField::PendingState, "state-1".to_string())
            .await
            .unwrap();
        assert_eq!(
            store.load().await.unwrap().pending_state.as_deref(),
            Some("state-1")
        );

        store.remove(SessionField::PatientId).await.unwrap();
        assert!(store.get(SessionField::PatientId).await.unwrap().is_none());

        store.clear().await.unwrap();
        let session = store.load().await.unwrap();
        assert!(session.is_empty());
        assert!(session.access_token.is_none());
        assert!(session.patient_id.is_none());
    }

    #[tokio::test]
    async fn test_file_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested").join("session.default.json"));

        assert!(store.load().await.unwrap().is_empty());

        store.save(&authenticated()).await.unwrap();
        assert!(store.path().exists());

        let reopened = FileSessionStore::new(store.path());
        assert_eq!(reopened.load().await.unwrap(), authenticated());

        store.clear().await.unwrap();
        assert!(!store.path().exists());
        assert!(reopened.load().await.unwrap().is_empty());

        // Clearing twice is not an error
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.default.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileSessionStore::new(&path);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[test]
    fn test_profile_name_cannot_escape_session_dir() {
        for profile in ["../../x", "a/b", "a\\b", "..", ""] {
            let err = FileSessionStore::for_profile(profile).unwrap_err();
            assert!(matches!(err, SmartError::Storage { .. }), "{profile}");
        }
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let store = FileSessionStore::new("/tmp/octofhir/session.work.json");
        assert_eq!(
            store.temp_path(),
            PathBuf::from("/tmp/octofhir/session.work.json.tmp")
        );
    }
}

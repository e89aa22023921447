//! Launch and session error types.
//!
//! Authentication-phase failures (state mismatch, token exchange) are fatal to
//! the flow that raised them. Discovery failures never surface through
//! [`SmartError`] during initiation; the launcher degrades to the configured
//! endpoints instead.

use crate::config::ConfigError;

/// Errors that can occur while launching, completing or restoring a session.
#[derive(Debug, thiserror::Error)]
pub enum SmartError {
    /// The authorization request could not be prepared.
    #[error("Launch initiation failed: {message}")]
    Initiation {
        /// Description of the failure.
        message: String,
    },

    /// The `state` returned on callback does not match the pending state.
    #[error("State mismatch - security validation failed")]
    StateMismatch,

    /// The authorization server redirected back with an OAuth error.
    #[error("Authorization denied: {error}{}", description_suffix(.description))]
    AuthorizationDenied {
        /// OAuth `error` code.
        error: String,
        /// OAuth `error_description`, when provided.
        description: Option<String>,
    },

    /// The token endpoint answered with a non-success status.
    #[error("Token exchange failed (HTTP {status}): {body}")]
    TokenExchange {
        /// HTTP status code.
        status: u16,
        /// Raw response body, kept for diagnostics.
        body: String,
    },

    /// The token endpoint answered with a body that is not a token response.
    #[error("Invalid token response: {message}")]
    InvalidTokenResponse {
        /// Description of the parse failure.
        message: String,
    },

    /// A persisted access token was rejected by the FHIR server.
    #[error("Stored credentials were rejected by the FHIR server")]
    CredentialInvalid,

    /// An operation required an authenticated session.
    #[error("Not authenticated: {message}")]
    NotAuthenticated {
        /// Description of what is missing.
        message: String,
    },

    /// A transport-level failure talking to the authorization server.
    #[error("HTTP error: {message}")]
    Http {
        /// Description of the transport failure.
        message: String,
    },

    /// The session store could not be read or written.
    #[error("Session storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// The client configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SmartError {
    /// Creates a new `Initiation` error.
    #[must_use]
    pub fn initiation(message: impl Into<String>) -> Self {
        Self::Initiation {
            message: message.into(),
        }
    }

    /// Creates a new `NotAuthenticated` error.
    #[must_use]
    pub fn not_authenticated(message: impl Into<String>) -> Self {
        Self::NotAuthenticated {
            message: message.into(),
        }
    }

    /// Creates a new `Http` error.
    #[must_use]
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns `true` for failures that end the authorization flow and
    /// should be shown to the user as a single error state.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::StateMismatch
                | Self::AuthorizationDenied { .. }
                | Self::TokenExchange { .. }
                | Self::InvalidTokenResponse { .. }
                | Self::Initiation { .. }
        )
    }
}

fn description_suffix(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" - {d}"))
        .unwrap_or_default()
}

impl From<std::io::Error> for SmartError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            SmartError::StateMismatch.to_string(),
            "State mismatch - security validation failed"
        );

        let err = SmartError::TokenExchange {
            status: 400,
            body: "{\"error\":\"invalid_grant\"}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Token exchange failed (HTTP 400): {\"error\":\"invalid_grant\"}"
        );

        let err = SmartError::AuthorizationDenied {
            error: "access_denied".to_string(),
            description: Some("User cancelled".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Authorization denied: access_denied - User cancelled"
        );

        let err = SmartError::AuthorizationDenied {
            error: "access_denied".to_string(),
            description: None,
        };
        assert_eq!(err.to_string(), "Authorization denied: access_denied");
    }

    #[test]
    fn test_authentication_failure_classification() {
        assert!(SmartError::StateMismatch.is_authentication_failure());
        assert!(
            SmartError::TokenExchange {
                status: 500,
                body: String::new()
            }
            .is_authentication_failure()
        );
        assert!(!SmartError::CredentialInvalid.is_authentication_failure());
        assert!(!SmartError::storage("disk full").is_authentication_failure());
    }
}

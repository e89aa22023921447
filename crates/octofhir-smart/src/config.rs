//! Viewer configuration.
//!
//! Static defaults target the Cerner (Oracle Health) public sandbox so a
//! standalone launch works without any configuration file.
//!
//! # Example (TOML)
//!
//! ```toml
//! [smart]
//! client_id = "2560539b-11f4-493c-85e6-6d2ed04a1557"
//! redirect_uri = "http://localhost:5173"
//!
//! [http]
//! request_timeout = "10s"
//! callback_timeout = "5m"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default FHIR server queried in standalone launches.
pub const DEFAULT_FHIR_BASE_URL: &str =
    "https://fhir-ehr.sandboxcerner.com/dstu2/0b8a0111-e8e6-4c26-a91c-5069cbc6b1ca";

/// Default authorization endpoint, used when no issuer is discovered.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://authorization.sandboxcerner.com/tenants/0b8a0111-e8e6-4c26-a91c-5069cbc6b1ca/protocols/oauth2/profiles/smart-v1/personas/patient/authorize";

/// Default token endpoint, used when no issuer is discovered.
pub const DEFAULT_TOKEN_URL: &str = "https://authorization.sandboxcerner.com/tenants/0b8a0111-e8e6-4c26-a91c-5069cbc6b1ca/protocols/oauth2/profiles/smart-v1/token";

/// Registered public client identifier.
pub const DEFAULT_CLIENT_ID: &str = "2560539b-11f4-493c-85e6-6d2ed04a1557";

/// Redirect URI registered for the client.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5173";

/// Scopes requested on every launch. EHR launches prepend `launch`.
pub const DEFAULT_SCOPE: &str =
    "launch/patient openid profile patient/Patient.read patient/Observation.read";

/// Root viewer configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// SMART client registration and fallback endpoints.
    pub smart: SmartClientConfig,

    /// Outbound HTTP settings.
    pub http: HttpConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// SMART client registration and static fallback endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmartClientConfig {
    /// OAuth client identifier (public client, no secret).
    pub client_id: String,

    /// Redirect URI registered with the authorization server.
    pub redirect_uri: String,

    /// Space-separated scopes requested on launch.
    pub scope: String,

    /// FHIR base URL used when the launch carries no `iss`.
    pub fhir_base_url: String,

    /// Authorization endpoint used when discovery is skipped or fails.
    pub authorize_url: String,

    /// Token endpoint used when discovery is skipped or fails.
    pub token_url: String,
}

impl Default for SmartClientConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            fhir_base_url: DEFAULT_FHIR_BASE_URL.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

/// Outbound HTTP configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Deadline for every discovery, token and resource request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// How long the loopback listener waits for the authorization callback.
    #[serde(with = "humantime_serde")]
    pub callback_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            callback_timeout: Duration::from_secs(300),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration sources could not be read or merged.
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ViewerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when the client id is empty, a URL is
    /// not absolute, or a timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smart.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("smart.client_id must not be empty".into()));
        }
        for (key, value) in [
            ("smart.redirect_uri", &self.smart.redirect_uri),
            ("smart.fhir_base_url", &self.smart.fhir_base_url),
            ("smart.authorize_url", &self.smart.authorize_url),
            ("smart.token_url", &self.smart.token_url),
        ] {
            Url::parse(value)
                .map_err(|e| ConfigError::Invalid(format!("{key} is not a valid URL: {e}")))?;
        }
        if self.http.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("http.request_timeout must be > 0".into()));
        }
        if self.http.callback_timeout.is_zero() {
            return Err(ConfigError::Invalid("http.callback_timeout must be > 0".into()));
        }
        Ok(())
    }
}

pub mod loader {
    use super::{ConfigError, ViewerConfig};
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default configuration file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "octofhir-viewer.toml";

    /// Environment variable prefix, e.g. `OCTOFHIR_VIEWER__SMART__CLIENT_ID`.
    pub const ENV_PREFIX: &str = "OCTOFHIR_VIEWER";

    /// Loads the configuration: built-in defaults, then the TOML file, then
    /// environment overrides.
    ///
    /// An explicitly requested file that does not exist is an error; the
    /// default file is optional.
    pub fn load_config(path: Option<&Path>) -> Result<ViewerConfig, ConfigError> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::Load(format!(
                        "config file {} not found",
                        p.display()
                    )));
                }
                builder = builder.add_source(File::from(p.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: ViewerConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        tracing::debug!(client_id = %merged.smart.client_id, "Loaded viewer configuration");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ViewerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.smart.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.smart.redirect_uri, "http://localhost:5173");
        assert_eq!(config.http.request_timeout, Duration::from_secs(10));
        assert_eq!(config.http.callback_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ViewerConfig::default();
        config.smart.client_id = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ViewerConfig::default();
        config.smart.token_url = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("smart.token_url"));

        let mut config = ViewerConfig::default();
        config.http.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[smart]
client_id = "my-app"
redirect_uri = "http://127.0.0.1:9000/callback"

[http]
request_timeout = "3s"
"#
        )
        .unwrap();

        let config = loader::load_config(Some(file.path())).unwrap();
        assert_eq!(config.smart.client_id, "my-app");
        assert_eq!(config.smart.redirect_uri, "http://127.0.0.1:9000/callback");
        assert_eq!(config.smart.scope, DEFAULT_SCOPE);
        assert_eq!(config.http.request_timeout, Duration::from_secs(3));
        assert_eq!(config.http.callback_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = loader::load_config(Some(std::path::Path::new(
            "/definitely/not/here/octofhir-viewer.toml",
        )));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}

//! Configuration management

use crate::config_error;
use crate::error::WardenResult;
use crate::logging::LoggingConfig;
use crate::types::{AuthorizationConfig, IdentityConfig, StoreBackend, StoreConfig, WardenConfig};

use std::path::Path;

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig {
                app_name: "warden".to_string(),
                secret_key: String::new(),
                session_ttl_seconds: 30 * 60,
                trusted_origin: "localhost:8080".to_string(),
                cookie_lifetime_days: 3650,
            },
            authorization: AuthorizationConfig {
                login_url: "/login".to_string(),
                default_deny: false,
                controllers: Vec::new(),
            },
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl WardenConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> WardenResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            config_error!("read_file", format!("Failed to read {}: {}", path.display(), e), e)
                .with_hint("Check that the file exists and is readable")
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> WardenResult<Self> {
        toml::from_str(content)
            .map_err(|e| config_error!("parse_toml", format!("Failed to parse config: {}", e), e))
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> WardenResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            config_error!("serialize_toml", format!("Failed to serialize config: {}", e), e)
        })?;

        std::fs::write(path, content).map_err(|e| {
            config_error!("write_file", format!("Failed to write config file: {}", e), e)
        })
    }

    /// Validate configuration before serving traffic
    pub fn validate(&self) -> WardenResult<()> {
        let invalid =
            |message: &str, hint: &str| config_error!("validate", message).with_hint(hint);

        if self.identity.app_name.trim().is_empty() {
            return Err(invalid(
                "identity.app_name must not be empty",
                "Set identity.app_name to a short application identifier",
            ));
        }

        if self.identity.secret_key.is_empty() {
            return Err(invalid(
                "identity.secret_key must not be empty",
                "Set identity.secret_key to a long random value",
            ));
        }

        if self.identity.session_ttl_seconds == 0 {
            return Err(invalid(
                "identity.session_ttl_seconds must be greater than 0",
                "Set identity.session_ttl_seconds to a positive value",
            ));
        }

        if self.identity.trusted_origin.trim().is_empty() {
            return Err(invalid(
                "identity.trusted_origin must not be empty",
                "Set identity.trusted_origin to the public host of the application",
            ));
        }

        if self.authorization.login_url.trim().is_empty() {
            return Err(invalid(
                "authorization.login_url must not be empty",
                "Set authorization.login_url to the sign-in page",
            ));
        }

        if self.store.backend == StoreBackend::Sqlite && self.store.database_url.is_none() {
            return Err(invalid(
                "store.database_url is required for the sqlite backend",
                "Set store.database_url, e.g. sqlite:warden.db",
            ));
        }

        Ok(())
    }
}

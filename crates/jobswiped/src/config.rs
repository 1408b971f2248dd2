//! Daemon configuration.
//!
//! Read from an optional TOML file, then overridden by environment
//! variables. Command-line flags are applied on top by the binary.
//!
//! ```toml
//! bind = "0.0.0.0:8000"
//! jwt_secret = "change-me"
//! token_type = "access"
//! principals_file = "/etc/jobswipe/principals.json"
//! write_timeout_secs = 10
//! revalidate_tokens = true
//! internal_token = "backend-secret"
//! ```
//!
//! The handshake timeout and heartbeat interval are fixed and cannot be
//! configured.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::auth::DEFAULT_TOKEN_TYPE;
use crate::server::{ConnectionSettings, DEFAULT_BIND_ADDR, DEFAULT_WRITE_TIMEOUT};

pub const ENV_BIND: &str = "JOBSWIPE_BIND";
pub const ENV_JWT_SECRET: &str = "JOBSWIPE_JWT_SECRET";
pub const ENV_PRINCIPALS: &str = "JOBSWIPE_PRINCIPALS";
pub const ENV_INTERNAL_TOKEN: &str = "JOBSWIPE_INTERNAL_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {error}", path.display())]
    Io { path: PathBuf, error: String },

    #[error("Invalid config: {0}")]
    Parse(String),

    #[error("No JWT secret configured (set jwt_secret or JOBSWIPE_JWT_SECRET)")]
    MissingSecret,

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    /// Listen address
    pub bind: String,

    /// HS256 signing secret shared with the token issuer
    pub jwt_secret: Option<String>,

    /// Required value of the token's `type` claim
    pub token_type: String,

    /// JSON array of known principals
    pub principals_file: Option<PathBuf>,

    /// Bound on a single outbound write
    pub write_timeout_secs: u64,

    /// Re-check credentials on every heartbeat
    pub revalidate_tokens: bool,

    /// Bearer secret backend services present on `/internal/*`
    pub internal_token: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_ADDR.to_string(),
            jwt_secret: None,
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            principals_file: None,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT.as_secs(),
            revalidate_tokens: true,
            internal_token: None,
        }
    }
}

impl NotifyConfig {
    /// Loads the file (if any), then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Applies `JOBSWIPE_*` overrides; empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = get(ENV_BIND) {
            self.bind = bind;
        }
        if let Some(secret) = get(ENV_JWT_SECRET) {
            self.jwt_secret = Some(secret);
        }
        if let Some(principals) = get(ENV_PRINCIPALS) {
            self.principals_file = Some(PathBuf::from(principals));
        }
        if let Some(token) = get(ENV_INTERNAL_TOKEN) {
            self.internal_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "bind",
                reason: "must not be empty".to_string(),
            });
        }
        if self.token_type.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "token_type",
                reason: "must not be empty".to_string(),
            });
        }
        if self.write_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "write_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The signing secret, required to serve or mint tokens.
    pub fn jwt_secret(&self) -> Result<&str, ConfigError> {
        self.jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecret)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            revalidate_tokens: self.revalidate_tokens,
            ..ConnectionSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = NotifyConfig::default();
        assert_eq!(config.bind, DEFAULT_BIND_ADDR);
        assert_eq!(config.token_type, "access");
        assert_eq!(config.write_timeout(), Duration::from_secs(10));
        assert!(config.revalidate_tokens);
        assert_eq!(config.internal_token, None);
        assert!(matches!(config.jwt_secret(), Err(ConfigError::MissingSecret)));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NotifyConfig::from_toml_str(
            r#"
            jwt_secret = "s3cret"
            revalidate_tokens = false
            "#,
        )
        .unwrap();

        assert_eq!(config.jwt_secret().unwrap(), "s3cret");
        assert!(!config.revalidate_tokens);
        assert!(!config.connection_settings().revalidate_tokens);
        assert_eq!(config.bind, DEFAULT_BIND_ADDR);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = NotifyConfig::from_toml_str("heartbeat_secs = 5");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_BIND, "0.0.0.0:9000"),
            (ENV_JWT_SECRET, "from-env"),
            (ENV_PRINCIPALS, ""),
            (ENV_INTERNAL_TOKEN, "backend"),
        ]
        .into_iter()
        .collect();

        let mut config = NotifyConfig::from_toml_str(r#"jwt_secret = "from-file""#).unwrap();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.jwt_secret().unwrap(), "from-env");
        assert_eq!(config.principals_file, None, "empty values are ignored");
        assert_eq!(config.internal_token.as_deref(), Some("backend"));
    }

    #[test]
    fn test_validate() {
        let config = NotifyConfig {
            write_timeout_secs: 0,
            ..NotifyConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "write_timeout_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind = \"127.0.0.1:0\"").unwrap();
        writeln!(file, "principals_file = \"/tmp/principals.json\"").unwrap();

        let config = NotifyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bind, "127.0.0.1:0");
        assert_eq!(
            config.principals_file,
            Some(PathBuf::from("/tmp/principals.json"))
        );

        let missing = NotifyConfig::from_file(Path::new("/nonexistent/jobswipe.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}

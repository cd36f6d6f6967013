//! Runtime configuration.
//!
//! Configuration is read from a TOML file. Every section and field is optional:
//!
//! ```toml
//! [client]
//! base_url = "http://localhost:3000"
//! timeout_secs = 10
//!
//! [client.default_headers]
//! x-user-id = "demo"
//!
//! [query]
//! stale_time_ms = 30000
//! cache_time_ms = 300000
//!
//! [server]
//! bind = "127.0.0.1:3000"
//! mode = "development"
//! ```
//!
//! The `RECALL_ENV` environment variable overrides `server.mode`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::subscription::http::QueryConfig;

/// Environment variable that overrides [`ServerConfig::mode`].
pub const MODE_ENV: &str = "RECALL_ENV";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid mode: {0}")]
    Mode(String),

    #[error("Invalid default header {name}: {reason}")]
    Header { name: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Whether error responses expose diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    #[default]
    Production,
}

impl Mode {
    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(ConfigError::Mode(s.to_owned())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Fetch client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix for every request path.
    pub base_url: String,
    /// Per-request timeout. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
    /// Headers sent with every request.
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_owned(),
            timeout_secs: None,
            default_headers: BTreeMap::new(),
        }
    }
}

/// Query cache timing, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub stale_time_ms: u64,
    pub cache_time_ms: Option<u64>,
}

impl QuerySettings {
    #[must_use]
    pub const fn query_config(&self) -> QueryConfig {
        let cache_time = match self.cache_time_ms {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };
        QueryConfig::new(Duration::from_millis(self.stale_time_ms), cache_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub mode: Mode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_owned(),
            mode: Mode::default(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub query: QuerySettings,
    pub server: ServerConfig,
}

impl Config {
    /// Parses configuration from TOML text. Environment overrides are not applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this shape.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads configuration from `path`, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// `RECALL_ENV` names an unknown mode.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), "loaded configuration");
        config.with_env_override(std::env::var(MODE_ENV).ok().as_deref())
    }

    /// Loads `path` if it exists, otherwise starts from defaults. Environment
    /// overrides apply either way.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Self::default().with_env_override(std::env::var(MODE_ENV).ok().as_deref())
        }
    }

    /// Replaces the server mode with `mode` when present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Mode`] if `mode` is not a known mode.
    pub fn with_env_override(mut self, mode: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(mode) = mode {
            self.server.mode = mode.parse()?;
            debug!(mode = %self.server.mode, "server mode overridden from environment");
        }
        Ok(self)
    }

    #[must_use]
    pub const fn query_config(&self) -> QueryConfig {
        self.query.query_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.mode, Mode::Production);
        assert_eq!(config.query_config(), QueryConfig::default());
        assert!(config.client.default_headers.is_empty());
    }

    #[test]
    fn test_parse_full() {
        let config = Config::from_toml_str(
            r#"
            [client]
            base_url = "http://api.test"
            timeout_secs = 5

            [client.default_headers]
            x-user-id = "u1"

            [query]
            stale_time_ms = 1500
            cache_time_ms = 60000

            [server]
            mode = "development"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.client.base_url, "http://api.test");
        assert_eq!(config.client.timeout_secs, Some(5));
        assert_eq!(config.client.default_headers.get("x-user-id").map(String::as_str), Some("u1"));
        assert_eq!(config.server.mode, Mode::Development);
        assert_eq!(config.server.bind, "127.0.0.1:3000");

        let query = config.query_config();
        assert_eq!(query.stale_time, Duration::from_millis(1500));
        assert_eq!(query.cache_time, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let result = Config::from_toml_str("[server]\nmode = \"staging\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_override() {
        let config = Config::default()
            .with_env_override(Some("development"))
            .expect("known mode");
        assert_eq!(config.server.mode, Mode::Development);

        let config = config.with_env_override(None).expect("no override");
        assert_eq!(config.server.mode, Mode::Development);

        assert!(matches!(
            Config::default().with_env_override(Some("qa")),
            Err(ConfigError::Mode(_))
        ));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("DEV".parse::<Mode>().expect("alias"), Mode::Development);
        assert_eq!("production".parse::<Mode>().expect("name"), Mode::Production);
        assert_eq!(Mode::Development.to_string(), "development");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[query]\nstale_time_ms = 250").expect("write config");

        let config = Config::load(file.path()).expect("load");
        assert_eq!(config.query.stale_time_ms, 250);
        assert_eq!(config.query.cache_time_ms, None);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = Config::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Read(_))));
    }
}

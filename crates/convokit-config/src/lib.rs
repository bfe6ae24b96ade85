#![deny(unsafe_code)]

//! Configuration loading and validation for Convokit.
//!
//! Loads the TOML file that tells the component service where to listen,
//! where to discover components, and how loudly to log. Every section is
//! optional; an empty file yields [`AppConfig::default`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP transport.
    #[serde(default)]
    pub server: ServerConfig,

    /// Component discovery.
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the component service listens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Prefix of every component route, e.g. `/components`.
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            base_path: default_base_path(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    3000
}

fn default_base_path() -> String {
    "/components".to_string()
}

/// Component discovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory scanned for components. Relative paths resolve against the
    /// directory holding the config file.
    #[serde(default = "default_component_dir")]
    pub component_dir: PathBuf,

    /// Manifest extensions accepted during discovery, without the dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Merge top-level components into every collection as well.
    #[serde(default)]
    pub recursive_merge: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            component_dir: default_component_dir(),
            extensions: default_extensions(),
            recursive_merge: false,
        }
    }
}

fn default_component_dir() -> PathBuf {
    PathBuf::from("components")
}

fn default_extensions() -> Vec<String> {
    vec!["toml".to_string(), "json".to_string()]
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Extensions the bundled manifest loader understands.
const MANIFEST_EXTENSIONS: [&str; 2] = ["toml", "json"];

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    ///
    /// A relative `registry.component_dir` is resolved against the file's
    /// directory.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut config = Self::parse(&content)?;
        if config.registry.component_dir.is_relative()
            && let Some(parent) = path.parent()
        {
            config.registry.component_dir = parent.join(&config.registry.component_dir);
        }
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_port == 0 {
            return Err(ConfigError::Validation(
                "server.listen_port must be non-zero".to_string(),
            ));
        }
        if self.server.listen_addr.is_empty() {
            return Err(ConfigError::Validation(
                "server.listen_addr must not be empty".to_string(),
            ));
        }
        if !self.server.base_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "server.base_path must start with '/', got {:?}",
                self.server.base_path
            )));
        }
        if self.server.base_path.contains(['{', '}', '*']) {
            return Err(ConfigError::Validation(format!(
                "server.base_path must not contain route captures, got {:?}",
                self.server.base_path
            )));
        }
        if self.registry.component_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "registry.component_dir must not be empty".to_string(),
            ));
        }
        if self.registry.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "registry.extensions must list at least one extension".to_string(),
            ));
        }
        for ext in &self.registry.extensions {
            if !MANIFEST_EXTENSIONS.contains(&ext.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "registry.extensions entries must be one of {MANIFEST_EXTENSIONS:?}, got {ext:?}"
                )));
            }
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {LOG_LEVELS:?}, got {:?}",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// The `host:port` the server binds.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.listen_addr, self.server.listen_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1");
        assert_eq!(config.server.listen_port, 3000);
        assert_eq!(config.server.base_path, "/components");
        assert_eq!(config.registry.component_dir, PathBuf::from("components"));
        assert_eq!(config.registry.extensions, vec!["toml", "json"]);
        assert!(!config.registry.recursive_merge);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [server]
            listen_addr = "0.0.0.0"
            listen_port = 8080
            base_path = "/bots/components"

            [registry]
            component_dir = "/srv/components"
            extensions = ["toml"]
            recursive_merge = true

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.listen_address(), "0.0.0.0:8080");
        assert_eq!(config.server.base_path, "/bots/components");
        assert_eq!(config.registry.component_dir, PathBuf::from("/srv/components"));
        assert_eq!(config.registry.extensions, vec!["toml"]);
        assert!(config.registry.recursive_merge);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let result = AppConfig::parse("[server]\nlisten_port = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_empty_addr() {
        let result = AppConfig::parse("[server]\nlisten_addr = \"\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_relative_base_path() {
        let err = AppConfig::parse("[server]\nbase_path = \"components\"\n").unwrap_err();
        assert!(err.to_string().contains("base_path"));
    }

    #[test]
    fn test_validation_rejects_captures_in_base_path() {
        assert!(AppConfig::parse("[server]\nbase_path = \"/{x}\"\n").is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_extension() {
        let err = AppConfig::parse("[registry]\nextensions = [\"yaml\"]\n").unwrap_err();
        assert!(err.to_string().contains("yaml"));
        assert!(AppConfig::parse("[registry]\nextensions = []\n").is_err());
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        assert!(AppConfig::parse("[logging]\nlevel = \"loud\"\n").is_err());
        assert!(AppConfig::parse("[logging]\nlevel = \"WARN\"\n").is_ok());
    }

    #[test]
    fn test_unknown_types_rejected() {
        let result = AppConfig::parse("[server]\nlisten_port = \"eighty\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("base_path"));
        assert_eq!(AppConfig::parse(&text).unwrap(), config);
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[test_log::test(tokio::test)]
    async fn test_load_resolves_component_dir() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("convokit.toml");
        tokio::fs::write(
            &path,
            b"[server]\nlisten_port = 4242\n\n[registry]\ncomponent_dir = \"bots\"\n",
        )
        .await
        .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.server.listen_port, 4242);
        assert_eq!(config.registry.component_dir, tmp.path().join("bots"));
    }

    #[test_log::test(tokio::test)]
    async fn test_load_keeps_absolute_component_dir() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("convokit.toml");
        tokio::fs::write(&path, b"[registry]\ncomponent_dir = \"/srv/bots\"\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.registry.component_dir, PathBuf::from("/srv/bots"));
    }

    #[test_log::test(tokio::test)]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test_log::test(tokio::test)]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}

// ABOUTME: Agent configuration loading with TOML files and environment overrides.
// ABOUTME: Holds the protocol constants (API version, retry bound, chunk size) and connection settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::AgentError;

/// API version announced in every Register frame.
pub const DEFAULT_API_VERSION: &str = "4.0";

/// Consecutive control-stream read failures tolerated before the channel stops.
pub const DEFAULT_MAX_REGISTRATION_ATTEMPTS: u32 = 20;

/// Size of the pieces a backup file is split into, one content frame each.
pub const DEFAULT_CHUNK_SIZE: usize = 512_000;

/// Default orchestrator address.
pub const DEFAULT_ORCHESTRATOR_URL: &str = "http://127.0.0.1:3000";

/// Agent SDK configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Orchestrator gRPC URL; https:// enables TLS
    pub orchestrator_url: String,
    /// API version sent during registration
    pub api_version: String,
    /// Maximum re-registration attempts after control-stream read failures
    pub max_registration_attempts: u32,
    /// Chunk size in bytes for backup file transfer
    pub chunk_size: usize,
    /// HTTP/2 keep-alive interval in seconds (0 disables keep-alive)
    pub keep_alive_secs: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            orchestrator_url: DEFAULT_ORCHESTRATOR_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            max_registration_attempts: DEFAULT_MAX_REGISTRATION_ATTEMPTS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            keep_alive_secs: 10,
            connect_timeout_secs: 30,
        }
    }
}

impl AgentConfig {
    /// Get the XDG config directory for the agent (~/.config/bro)
    pub fn config_dir() -> PathBuf {
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|p| p.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("."))
            })
            .join("bro")
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("agent.toml")
    }

    /// Load config from the XDG config directory, then apply environment overrides.
    pub fn load() -> Result<Self, AgentError> {
        let path = Self::config_path();
        let config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.with_env_overrides()
    }

    /// Load config from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| AgentError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Parse config from TOML text
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `BRO_*` environment variable overrides.
    pub fn with_env_overrides(self) -> Result<Self, AgentError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BRO_ORCHESTRATOR_URL") {
            self.orchestrator_url = url;
        }
        if let Some(version) = lookup("BRO_API_VERSION") {
            self.api_version = version;
        }
        if let Some(value) = lookup("BRO_MAX_REGISTRATION_ATTEMPTS") {
            self.max_registration_attempts = parse_override("BRO_MAX_REGISTRATION_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("BRO_CHUNK_SIZE") {
            self.chunk_size = parse_override("BRO_CHUNK_SIZE", &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the transfer engines cannot work with.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.chunk_size == 0 {
            return Err(AgentError::Config("chunk_size must be greater than 0".into()));
        }
        if self.api_version.trim().is_empty() {
            return Err(AgentError::Config("api_version must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AgentError> {
    value
        .trim()
        .parse()
        .map_err(|_| AgentError::Config(format!("{key} has an invalid value: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.api_version, "4.0");
        assert_eq!(config.max_registration_attempts, 20);
        assert_eq!(config.chunk_size, 512_000);
        assert_eq!(config.orchestrator_url, "http://127.0.0.1:3000");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AgentConfig::from_toml(
            r#"
            orchestrator_url = "http://bro:3000"
            chunk_size = 1024
            "#,
        )
        .unwrap();
        assert_eq!(config.orchestrator_url, "http://bro:3000");
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.max_registration_attempts, 20);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "api_version = \"3.0\"\nmax_registration_attempts = 5").unwrap();

        let config = AgentConfig::load_from(file.path()).unwrap();
        assert_eq!(config.api_version, "3.0");
        assert_eq!(config.max_registration_attempts, 5);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = AgentConfig::load_from("/nonexistent/agent.toml").unwrap_err();
        assert!(matches!(err, AgentError::Config(msg) if msg.contains("failed to read")));
    }

    #[test]
    fn test_load_from_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chunk_size = \"many\"").unwrap();

        let err = AgentConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, AgentError::Config(msg) if msg.contains("failed to parse")));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BRO_ORCHESTRATOR_URL", "https://bro.example.com:3000"),
            ("BRO_MAX_REGISTRATION_ATTEMPTS", "3"),
            ("BRO_CHUNK_SIZE", " 4096 "),
        ]
        .into_iter()
        .collect();

        let config = AgentConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.orchestrator_url, "https://bro.example.com:3000");
        assert_eq!(config.max_registration_attempts, 3);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let err = AgentConfig::default()
            .with_overrides(|key| (key == "BRO_CHUNK_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, AgentError::Config(msg) if msg.contains("BRO_CHUNK_SIZE")));
    }

    #[test]
    fn test_zero_chunk_size_is_invalid() {
        let config = AgentConfig {
            chunk_size: 0,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

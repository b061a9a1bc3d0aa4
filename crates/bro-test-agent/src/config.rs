// ABOUTME: Configuration for the reference agent, loaded from TOML.
// ABOUTME: Agent identity, software version, files to back up, download location, orchestrator settings.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bro_agent::{AgentConfig, RegistrationInfo, SoftwareVersion};
use serde::{Deserialize, Serialize};

pub const DEFAULT_AGENT_ID: &str = "TestAgent";

/// Software version the test agent registers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareVersionConfig {
    pub product_name: String,
    pub product_number: String,
    pub revision: String,
    pub production_date: String,
    pub description: String,
    #[serde(rename = "type")]
    pub product_type: String,
    pub commercial_version: String,
    pub semantic_version: String,
}

impl Default for SoftwareVersionConfig {
    fn default() -> Self {
        Self {
            product_name: "Test Agent".to_string(),
            product_number: "2".to_string(),
            revision: "Nope".to_string(),
            production_date: "No date".to_string(),
            description: "No Description".to_string(),
            product_type: "type".to_string(),
            commercial_version: "CommercialVersion".to_string(),
            semantic_version: "SemanticVersion".to_string(),
        }
    }
}

impl From<&SoftwareVersionConfig> for SoftwareVersion {
    fn from(config: &SoftwareVersionConfig) -> Self {
        SoftwareVersion::new(
            config.product_name.clone(),
            config.product_number.clone(),
            config.revision.clone(),
            config.production_date.clone(),
            config.description.clone(),
            config.product_type.clone(),
        )
        .with_versions(
            config.commercial_version.clone(),
            config.semantic_version.clone(),
        )
    }
}

/// One file to back up, optionally with a custom metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentFile {
    pub backup_file: PathBuf,
    #[serde(default)]
    pub custom_metadata_file: Option<PathBuf>,
}

/// Reference agent configuration.
///
/// ```toml
/// agent_id = "TestAgent"
/// scope = "alpha"
/// download_location = "/var/lib/bro-test-agent/restored"
///
/// [software_version]
/// product_name = "Test Agent"
/// product_number = "2"
///
/// [[fragments]]
/// backup_file = "/var/lib/bro-test-agent/backup.txt"
/// custom_metadata_file = "/var/lib/bro-test-agent/CustomMetadata.txt"
///
/// [orchestrator]
/// orchestrator_url = "http://127.0.0.1:3000"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestAgentConfig {
    pub agent_id: String,
    pub scope: String,
    pub download_location: PathBuf,
    pub software_version: SoftwareVersionConfig,
    pub fragments: Vec<FragmentFile>,
    pub orchestrator: AgentConfig,
}

impl Default for TestAgentConfig {
    fn default() -> Self {
        Self {
            agent_id: DEFAULT_AGENT_ID.to_string(),
            scope: String::new(),
            download_location: PathBuf::from("./restored"),
            software_version: SoftwareVersionConfig::default(),
            fragments: Vec::new(),
            orchestrator: AgentConfig::default(),
        }
    }
}

impl TestAgentConfig {
    /// Default config path (~/.config/bro/test-agent.toml)
    pub fn default_path() -> PathBuf {
        AgentConfig::config_dir().join("test-agent.toml")
    }

    /// Load from `path`, or from the default path when present, then apply `BRO_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    tracing::info!("Loading config from: {}", default.display());
                    Self::load_from(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.with_env_overrides()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        self.orchestrator = self
            .orchestrator
            .with_env_overrides()
            .context("invalid orchestrator settings")?;
        Ok(self)
    }

    /// Apply command line overrides.
    pub fn with_cli_overrides(mut self, orchestrator: Option<String>, agent_id: Option<String>) -> Self {
        if let Some(url) = orchestrator {
            self.orchestrator.orchestrator_url = url;
        }
        if let Some(agent_id) = agent_id {
            self.agent_id = agent_id;
        }
        self
    }

    pub fn registration_info(&self) -> RegistrationInfo {
        RegistrationInfo::new(
            self.agent_id.clone(),
            self.scope.clone(),
            (&self.software_version).into(),
        )
    }
}

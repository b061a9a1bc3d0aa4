// ABOUTME: Registration records (software version, registration info, agent identity).
// ABOUTME: Builds the Register and StageComplete control frames sent to the orchestrator.

use bro_proto::{agent_control, Action, AgentControl, AgentMessageType, Register};
use bro_proto::{SoftwareVersionInfo, StageComplete};

use crate::error::AgentError;

/// Version placeholder used when an agent does not set commercial/semantic versions.
const UNSET_VERSION: &str = "0.0.0";

/// Software version of the product an agent backs up.
///
/// Sent during registration and stored by the orchestrator alongside every
/// backup, then handed back on restore so the agent can check compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareVersion {
    pub product_name: String,
    pub product_number: String,
    pub revision: String,
    pub production_date: String,
    pub description: String,
    pub product_type: String,
    pub commercial_version: String,
    pub semantic_version: String,
}

impl Default for SoftwareVersion {
    fn default() -> Self {
        Self {
            product_name: String::new(),
            product_number: String::new(),
            revision: String::new(),
            production_date: String::new(),
            description: String::new(),
            product_type: String::new(),
            commercial_version: UNSET_VERSION.to_string(),
            semantic_version: UNSET_VERSION.to_string(),
        }
    }
}

impl SoftwareVersion {
    /// Create a software version with unset commercial and semantic versions.
    pub fn new(
        product_name: impl Into<String>,
        product_number: impl Into<String>,
        revision: impl Into<String>,
        production_date: impl Into<String>,
        description: impl Into<String>,
        product_type: impl Into<String>,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            product_number: product_number.into(),
            revision: revision.into(),
            production_date: production_date.into(),
            description: description.into(),
            product_type: product_type.into(),
            ..Self::default()
        }
    }

    /// Set commercial and semantic versions.
    pub fn with_versions(
        mut self,
        commercial_version: impl Into<String>,
        semantic_version: impl Into<String>,
    ) -> Self {
        self.commercial_version = commercial_version.into();
        self.semantic_version = semantic_version.into();
        self
    }

    /// Every field is mandatory.
    pub fn validate(&self) -> Result<(), AgentError> {
        let fields = [
            ("description", &self.description),
            ("production date", &self.production_date),
            ("product name", &self.product_name),
            ("product number", &self.product_number),
            ("revision", &self.revision),
            ("type", &self.product_type),
            ("commercial version", &self.commercial_version),
            ("semantic version", &self.semantic_version),
        ];
        for (name, value) in fields {
            if value.is_empty() {
                return Err(AgentError::InvalidRegistration(format!(
                    "software version {name} is empty"
                )));
            }
        }
        Ok(())
    }
}

impl From<&SoftwareVersion> for SoftwareVersionInfo {
    fn from(version: &SoftwareVersion) -> Self {
        SoftwareVersionInfo {
            product_name: version.product_name.clone(),
            product_number: version.product_number.clone(),
            revision: version.revision.clone(),
            production_date: version.production_date.clone(),
            description: version.description.clone(),
            r#type: version.product_type.clone(),
            commercial_version: version.commercial_version.clone(),
            semantic_version: version.semantic_version.clone(),
        }
    }
}

impl From<SoftwareVersionInfo> for SoftwareVersion {
    fn from(info: SoftwareVersionInfo) -> Self {
        SoftwareVersion {
            product_name: info.product_name,
            product_number: info.product_number,
            revision: info.revision,
            production_date: info.production_date,
            description: info.description,
            product_type: info.r#type,
            commercial_version: info.commercial_version,
            semantic_version: info.semantic_version,
        }
    }
}

/// What an agent behavior registers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub agent_id: String,
    /// Backup type(s) the agent participates in; may be empty.
    pub scope: String,
    pub software_version: SoftwareVersion,
}

impl RegistrationInfo {
    pub fn new(
        agent_id: impl Into<String>,
        scope: impl Into<String>,
        software_version: SoftwareVersion,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            scope: scope.into(),
            software_version,
        }
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.agent_id.trim().is_empty() {
            return Err(AgentError::InvalidRegistration("agent id is empty".into()));
        }
        self.software_version.validate()
    }
}

/// Immutable identity of a running agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub scope: String,
    pub software_version: SoftwareVersion,
    pub api_version: String,
}

impl AgentIdentity {
    pub fn new(info: RegistrationInfo, api_version: impl Into<String>) -> Self {
        Self {
            agent_id: info.agent_id,
            scope: info.scope,
            software_version: info.software_version,
            api_version: api_version.into(),
        }
    }

    /// Build the Register frame announcing this agent.
    pub fn register_message(&self) -> AgentControl {
        AgentControl {
            action: Action::Register as i32,
            agent_message_type: AgentMessageType::Register as i32,
            payload: Some(agent_control::Payload::Register(Register {
                agent_id: self.agent_id.clone(),
                software_version_info: Some((&self.software_version).into()),
                api_version: self.api_version.clone(),
                scope: self.scope.clone(),
            })),
        }
    }

    /// Build the StageComplete frame reporting the outcome of `action`.
    pub fn stage_complete_message(
        &self,
        success: bool,
        message: impl Into<String>,
        action: Action,
    ) -> AgentControl {
        AgentControl {
            action: action as i32,
            agent_message_type: AgentMessageType::StageComplete as i32,
            payload: Some(agent_control::Payload::StageComplete(StageComplete {
                success,
                message: message.into(),
                agent_id: self.agent_id.clone(),
            })),
        }
    }
}

/// Whether a control frame is a Register frame.
pub fn is_register(frame: &AgentControl) -> bool {
    matches!(frame.payload, Some(agent_control::Payload::Register(_)))
}

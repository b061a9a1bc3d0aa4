// ABOUTME: Narrow capability objects handed to agent behaviors.
// ABOUTME: Backup/RestoreActions for execution, StageActions for preparation, post actions and cancel.

use std::path::Path;
use std::sync::Arc;

use bro_proto::Action;

use crate::agent::AgentInner;
use crate::backup::BackupTransferEngine;
use crate::error::AgentError;
use crate::fragment::{BackupFragmentInfo, FragmentInfo};
use crate::registration::SoftwareVersion;
use crate::restore::{RestoreOutcome, RestoreTransferEngine};

/// What a behavior may do while executing a backup.
pub struct BackupActions {
    agent: Arc<AgentInner>,
}

impl BackupActions {
    pub(crate) fn new(agent: Arc<AgentInner>) -> Self {
        Self { agent }
    }

    /// Send one fragment on a fresh backup data stream.
    pub async fn send_backup(&self, fragment: &BackupFragmentInfo) -> Result<(), AgentError> {
        let backup_name = self.agent.backup_name();
        let mut engine = BackupTransferEngine::new(self.agent.chunk_source());
        engine
            .transfer(
                self.agent.open_backup_stream(),
                fragment,
                self.agent.agent_id(),
                &backup_name,
            )
            .await
    }

    /// Report the backup outcome and end the backup session.
    pub async fn backup_complete(
        &self,
        success: bool,
        message: impl Into<String>,
    ) -> Result<(), AgentError> {
        let result = self
            .agent
            .report_stage_complete(success, message, Action::Backup)
            .await;
        self.agent.clear_backup_session();
        result
    }

    pub fn backup_name(&self) -> String {
        self.agent.backup_name()
    }

    pub fn agent_id(&self) -> &str {
        self.agent.agent_id()
    }
}

/// What a behavior may do while executing a restore.
pub struct RestoreActions {
    agent: Arc<AgentInner>,
}

impl RestoreActions {
    pub(crate) fn new(agent: Arc<AgentInner>) -> Self {
        Self { agent }
    }

    /// Download one fragment into `target_dir` on a fresh restore data stream.
    pub async fn download_fragment(
        &self,
        fragment: &FragmentInfo,
        target_dir: impl AsRef<Path>,
    ) -> Result<RestoreOutcome, AgentError> {
        let inbound = self
            .agent
            .open_restore_stream(fragment)
            .await
            .map_err(|e| AgentError::DownloadFailed(e.to_string()))?;
        RestoreTransferEngine::new()
            .download(inbound, target_dir.as_ref())
            .await
    }

    /// Report the restore outcome and end the restore session.
    pub async fn restore_complete(
        &self,
        success: bool,
        message: impl Into<String>,
    ) -> Result<(), AgentError> {
        let result = self
            .agent
            .report_stage_complete(success, message, Action::Restore)
            .await;
        self.agent.clear_restore_session();
        result
    }

    pub fn fragment_list(&self) -> Vec<FragmentInfo> {
        self.agent.fragments()
    }

    /// Software version the backup being restored was taken from.
    pub fn software_version(&self) -> SoftwareVersion {
        self.agent.restore_software_version()
    }

    pub fn backup_name(&self) -> String {
        self.agent.backup_name()
    }

    pub fn agent_id(&self) -> &str {
        self.agent.agent_id()
    }
}

/// Stages around an execution that only need to be acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preparation,
    PostActions,
    Cancel,
}

/// What a behavior may do during a preparation, post-actions or cancel stage.
pub struct StageActions {
    agent: Arc<AgentInner>,
    stage: Stage,
    action: Action,
}

impl StageActions {
    pub(crate) fn new(agent: Arc<AgentInner>, stage: Stage, action: Action) -> Self {
        Self {
            agent,
            stage,
            action,
        }
    }

    /// Report the stage outcome.
    ///
    /// Post actions and cancel end the session; a preparation keeps it for the
    /// execution that follows.
    pub async fn stage_complete(
        &self,
        success: bool,
        message: impl Into<String>,
    ) -> Result<(), AgentError> {
        let result = self
            .agent
            .report_stage_complete(success, message, self.action)
            .await;
        match (self.stage, self.action) {
            (Stage::Preparation, _) => {}
            (_, Action::Backup) => self.agent.clear_backup_session(),
            _ => self.agent.clear_restore_session(),
        }
        result
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The action this stage belongs to.
    pub fn action(&self) -> Action {
        self.action
    }

    pub fn backup_name(&self) -> String {
        self.agent.backup_name()
    }

    /// Fragments announced by a restore preparation; empty otherwise.
    pub fn fragment_list(&self) -> Vec<FragmentInfo> {
        self.agent.fragments()
    }

    pub fn software_version(&self) -> SoftwareVersion {
        self.agent.restore_software_version()
    }

    pub fn agent_id(&self) -> &str {
        self.agent.agent_id()
    }
}

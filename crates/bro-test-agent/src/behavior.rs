// ABOUTME: File-based agent behavior used by the reference agent.
// ABOUTME: Backs up the configured files as fragments and restores fragments into a download directory.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bro_agent::{
    AgentBehavior, BackupActions, BackupFragmentInfo, FragmentInfo, RegistrationInfo,
    RestoreActions, SoftwareVersion,
};
use tracing::{error, info};

use crate::config::TestAgentConfig;

/// Version stamped on every fragment the test agent sends.
const FRAGMENT_VERSION: &str = "0.0.0";

pub struct TestAgentBehavior {
    config: TestAgentConfig,
}

impl TestAgentBehavior {
    pub fn new(config: TestAgentConfig) -> Self {
        Self { config }
    }

    /// One fragment per configured file, numbered from 1.
    pub async fn backup_fragments(&self) -> Result<Vec<BackupFragmentInfo>> {
        let mut fragments = Vec::with_capacity(self.config.fragments.len());
        for (index, file) in self.config.fragments.iter().enumerate() {
            let size = tokio::fs::metadata(&file.backup_file)
                .await
                .with_context(|| {
                    format!(
                        "the file that was created for the backup has encountered a problem: {}",
                        file.backup_file.display()
                    )
                })?
                .len();
            let info = FragmentInfo::new(
                format!("{}_{}", self.config.agent_id, index + 1),
                FRAGMENT_VERSION,
                size.to_string(),
            );
            let mut fragment = BackupFragmentInfo::new(info, &file.backup_file);
            if let Some(custom_metadata) = &file.custom_metadata_file {
                fragment = fragment.with_custom_metadata(custom_metadata);
            }
            fragments.push(fragment);
        }
        Ok(fragments)
    }

    /// Backups are restorable when product name, product number, and revision match.
    pub fn is_compatible(&self, version: &SoftwareVersion) -> bool {
        let own = &self.config.software_version;
        info!(revision = %version.revision, "validating software version");
        own.revision == version.revision
            && own.product_name == version.product_name
            && own.product_number == version.product_number
    }

    async fn backup(&self, actions: &BackupActions) -> Result<()> {
        for fragment in self.backup_fragments().await? {
            actions.send_backup(&fragment).await?;
        }
        Ok(())
    }

    async fn restore(&self, actions: &RestoreActions) -> Result<()> {
        let target = &self.config.download_location;
        for fragment in actions.fragment_list() {
            let outcome = actions.download_fragment(&fragment, target).await?;
            if !outcome.mismatched_files.is_empty() {
                bail!(
                    "checksum mismatch for {} in fragment {}",
                    outcome.mismatched_files.join(", "),
                    fragment.fragment_id
                );
            }
            if !outcome.rejected_files.is_empty() {
                bail!(
                    "unsafe file names {} in fragment {}",
                    outcome.rejected_files.join(", "),
                    fragment.fragment_id
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AgentBehavior for TestAgentBehavior {
    fn registration_info(&self) -> RegistrationInfo {
        self.config.registration_info()
    }

    async fn execute_backup(&self, actions: BackupActions) {
        let backup_name = actions.backup_name();
        let (success, message) = match self.backup(&actions).await {
            Ok(()) => {
                info!(%backup_name, "finished backup");
                (
                    true,
                    format!(
                        "The test service has completed a backup for {} and the data has been sent to the orchestrator",
                        backup_name
                    ),
                )
            }
            Err(e) => {
                error!(%backup_name, error = %e, "backup failed");
                (
                    false,
                    format!(
                        "The test service failed to complete a backup {}, Cause: {} The test service will not retry to send the backup",
                        backup_name, e
                    ),
                )
            }
        };
        if let Err(e) = actions.backup_complete(success, message).await {
            error!(%backup_name, error = %e, "failed to report backup completion");
        }
    }

    async fn execute_restore(&self, actions: RestoreActions) {
        let backup_name = actions.backup_name();
        let (success, message) = if !self.is_compatible(&actions.software_version()) {
            error!(%backup_name, "restore failed due to incompatible software version");
            (false, "Incompatible software version".to_string())
        } else {
            match self.restore(&actions).await {
                Ok(()) => {
                    info!(%backup_name, "restore finished");
                    (
                        true,
                        format!(
                            "The test service has completed restore of backup: {}",
                            backup_name
                        ),
                    )
                }
                Err(e) => {
                    error!(%backup_name, error = %e, "restore failed");
                    (false, format!("Restore failed due to <{}>", e))
                }
            }
        };
        if let Err(e) = actions.restore_complete(success, message).await {
            error!(%backup_name, error = %e, "failed to report restore completion");
        }
    }
}

// ABOUTME: The pluggable behavior an agent implementation supplies.
// ABOUTME: Registration identity, the backup and restore callbacks, and optional stage hooks.

use async_trait::async_trait;

use crate::actions::{BackupActions, RestoreActions, StageActions};
use crate::registration::RegistrationInfo;

/// Product-specific backup and restore logic.
///
/// Callbacks run on the control listener: no further orchestrator command is
/// read until the callback returns. A callback reports its own outcome through
/// `backup_complete` / `restore_complete`; if it panics instead, the agent
/// reports a failed stage on its behalf.
///
/// Orchestrators that drive preparation, post-action and cancel stages get a
/// successful StageComplete from the default hooks unless a behavior
/// overrides them.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use bro_agent::{AgentBehavior, BackupActions, RegistrationInfo, RestoreActions};
///
/// struct NoopBehavior(RegistrationInfo);
///
/// #[async_trait]
/// impl AgentBehavior for NoopBehavior {
///     fn registration_info(&self) -> RegistrationInfo {
///         self.0.clone()
///     }
///
///     async fn execute_backup(&self, actions: BackupActions) {
///         let _ = actions.backup_complete(true, "nothing to back up").await;
///     }
///
///     async fn execute_restore(&self, actions: RestoreActions) {
///         let _ = actions.restore_complete(true, "nothing to restore").await;
///     }
/// }
/// ```
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    /// Identity the agent registers with.
    fn registration_info(&self) -> RegistrationInfo;

    async fn execute_backup(&self, actions: BackupActions);

    async fn execute_restore(&self, actions: RestoreActions);

    async fn prepare_for_backup(&self, actions: StageActions) {
        let _ = actions
            .stage_complete(true, "Preparation for backup is successful")
            .await;
    }

    async fn post_backup(&self, actions: StageActions) {
        let _ = actions
            .stage_complete(true, "Post backup actions completed")
            .await;
    }

    async fn prepare_for_restore(&self, actions: StageActions) {
        let _ = actions
            .stage_complete(true, "Preparation for restore is successful")
            .await;
    }

    async fn post_restore(&self, actions: StageActions) {
        let _ = actions
            .stage_complete(true, "Post restore actions completed")
            .await;
    }

    /// Called when the orchestrator cancels the running backup or restore.
    async fn cancel_action(&self, actions: StageActions) {
        let _ = actions.stage_complete(true, "Cancel actions completed").await;
    }
}

// ABOUTME: Turns inbound orchestrator commands into session updates and behavior callbacks.
// ABOUTME: Every backup/restore stage runs its behavior hook inline; anything else is logged and ignored.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bro_proto::orchestrator_control::Payload;
use bro_proto::{
    Action, Execution, Fragment, OrchestratorControl, Preparation, SoftwareVersionInfo,
};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::actions::{BackupActions, RestoreActions, Stage, StageActions};
use crate::agent::AgentInner;
use crate::control::ControlHandler;
use crate::fragment::FragmentInfo;
use crate::registration::SoftwareVersion;

/// Stage-complete message sent when a behavior callback panics.
pub const BEHAVIOR_PANIC_MESSAGE: &str = "Exception executing agent behavior";

/// Control handler bound to one agent.
///
/// Holds the agent weakly: the agent owns the control channel that owns this
/// handler, so frames arriving after the agent is gone are dropped.
pub(crate) struct ControlDispatcher {
    agent: Weak<AgentInner>,
}

impl ControlDispatcher {
    pub(crate) fn new(agent: Weak<AgentInner>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl ControlHandler for ControlDispatcher {
    async fn process(&self, frame: OrchestratorControl) {
        let Some(agent) = self.agent.upgrade() else {
            debug!("agent dropped, ignoring control frame");
            return;
        };

        let action = frame.action();
        let message_type = frame.orchestrator_message_type();
        let behavior = &agent.behavior;
        match (action, frame.payload) {
            (Action::Backup, Some(Payload::Execution(execution))) => {
                info!(backup_name = %execution.backup_name, "backup requested");
                agent.start_backup_session(execution.backup_name);
                let actions = BackupActions::new(agent.clone());
                run_guarded(&agent, action, behavior.execute_backup(actions)).await;
            }
            (Action::Restore, Some(Payload::Execution(execution))) => {
                let Execution {
                    backup_name,
                    software_version_info,
                    fragment,
                } = execution;
                info!(%backup_name, fragments = fragment.len(), "restore requested");
                start_restore(&agent, backup_name, software_version_info, fragment);
                let actions = RestoreActions::new(agent.clone());
                run_guarded(&agent, action, behavior.execute_restore(actions)).await;
            }
            (Action::Backup, Some(Payload::Preparation(preparation))) => {
                info!(backup_name = %preparation.backup_name, "backup preparation requested");
                agent.start_backup_session(preparation.backup_name);
                let actions = StageActions::new(agent.clone(), Stage::Preparation, action);
                run_guarded(&agent, action, behavior.prepare_for_backup(actions)).await;
            }
            (Action::Restore, Some(Payload::Preparation(preparation))) => {
                let Preparation {
                    backup_name,
                    software_version_info,
                    fragment,
                    ..
                } = preparation;
                info!(%backup_name, fragments = fragment.len(), "restore preparation requested");
                start_restore(&agent, backup_name, software_version_info, fragment);
                let actions = StageActions::new(agent.clone(), Stage::Preparation, action);
                run_guarded(&agent, action, behavior.prepare_for_restore(actions)).await;
            }
            (Action::Backup, Some(Payload::PostActions(_))) => {
                info!("post backup actions requested");
                let actions = StageActions::new(agent.clone(), Stage::PostActions, action);
                run_guarded(&agent, action, behavior.post_backup(actions)).await;
            }
            (Action::Restore, Some(Payload::PostActions(_))) => {
                info!("post restore actions requested");
                let actions = StageActions::new(agent.clone(), Stage::PostActions, action);
                run_guarded(&agent, action, behavior.post_restore(actions)).await;
            }
            (action, Some(Payload::Cancel(_))) => {
                info!(?action, "cancel requested");
                let actions = StageActions::new(agent.clone(), Stage::Cancel, action);
                run_guarded(&agent, action, behavior.cancel_action(actions)).await;
            }
            (_, Some(Payload::RegisterAcknowledge(ack))) => {
                info!(message = %ack.acknowledge_message, "registration acknowledged");
            }
            (action, _) => {
                debug!(?action, ?message_type, "ignoring control frame");
            }
        }
    }
}

fn start_restore(
    agent: &AgentInner,
    backup_name: String,
    software_version: Option<SoftwareVersionInfo>,
    fragments: Vec<Fragment>,
) {
    agent.start_restore_session(
        backup_name,
        software_version
            .map(SoftwareVersion::from)
            .unwrap_or_default(),
        fragments.into_iter().map(FragmentInfo::from).collect(),
    );
}

/// Run a behavior callback, reporting a failed stage if it panics.
async fn run_guarded<F>(agent: &Arc<AgentInner>, action: Action, callback: F)
where
    F: Future<Output = ()>,
{
    if AssertUnwindSafe(callback).catch_unwind().await.is_ok() {
        return;
    }

    error!(?action, "agent behavior panicked");
    if let Err(e) = agent
        .report_stage_complete(false, BEHAVIOR_PANIC_MESSAGE, action)
        .await
    {
        warn!(?action, error = %e, "failed to report stage failure");
    }
    match action {
        Action::Restore => agent.clear_restore_session(),
        _ => agent.clear_backup_session(),
    }
}

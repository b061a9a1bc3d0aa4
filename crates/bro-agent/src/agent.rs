// ABOUTME: The agent session object: identity, session state, and the control channel it owns.
// ABOUTME: Opens per-transfer data streams and reports stage completion to the orchestrator.

use std::sync::{Arc, Mutex, MutexGuard};

use bro_proto::{Action, Metadata, RestoreData};
use tokio::sync::watch;
use tracing::info;

use crate::backup::BackupStream;
use crate::behavior::AgentBehavior;
use crate::channel::ChannelConfig;
use crate::chunk::{ChunkSource, FileChunkSource};
use crate::config::AgentConfig;
use crate::control::{ChannelStatus, ControlChannel};
use crate::dispatch::ControlDispatcher;
use crate::error::AgentError;
use crate::fragment::FragmentInfo;
use crate::registration::{AgentIdentity, SoftwareVersion};
use crate::stream::InboundStream;
use crate::transport::{GrpcTransport, OrchestratorTransport};

/// Per-operation state. Only the control dispatch path writes it.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    pub(crate) backup_name: String,
    pub(crate) fragments: Vec<FragmentInfo>,
    pub(crate) restore_software_version: SoftwareVersion,
}

pub(crate) struct AgentInner {
    identity: AgentIdentity,
    pub(crate) behavior: Box<dyn AgentBehavior>,
    control: ControlChannel,
    transport: Arc<dyn OrchestratorTransport>,
    chunks: Arc<dyn ChunkSource>,
    session: Mutex<SessionState>,
}

impl AgentInner {
    pub(crate) fn agent_id(&self) -> &str {
        &self.identity.agent_id
    }

    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn backup_name(&self) -> String {
        self.session().backup_name.clone()
    }

    pub(crate) fn fragments(&self) -> Vec<FragmentInfo> {
        self.session().fragments.clone()
    }

    pub(crate) fn restore_software_version(&self) -> SoftwareVersion {
        self.session().restore_software_version.clone()
    }

    pub(crate) fn chunk_source(&self) -> Arc<dyn ChunkSource> {
        self.chunks.clone()
    }

    pub(crate) fn start_backup_session(&self, backup_name: String) {
        self.session().backup_name = backup_name;
    }

    pub(crate) fn start_restore_session(
        &self,
        backup_name: String,
        software_version: SoftwareVersion,
        fragments: Vec<FragmentInfo>,
    ) {
        *self.session() = SessionState {
            backup_name,
            fragments,
            restore_software_version: software_version,
        };
    }

    pub(crate) fn clear_backup_session(&self) {
        self.session().backup_name.clear();
    }

    pub(crate) fn clear_restore_session(&self) {
        *self.session() = SessionState::default();
    }

    pub(crate) fn open_backup_stream(&self) -> BackupStream {
        BackupStream::open(self.transport.clone())
    }

    pub(crate) async fn open_restore_stream(
        &self,
        fragment: &FragmentInfo,
    ) -> Result<InboundStream<RestoreData>, AgentError> {
        let metadata = Metadata {
            agent_id: self.identity.agent_id.clone(),
            fragment: Some(fragment.into()),
            backup_name: self.backup_name(),
        };
        self.transport.restore(metadata).await
    }

    pub(crate) async fn report_stage_complete(
        &self,
        success: bool,
        message: impl Into<String>,
        action: Action,
    ) -> Result<(), AgentError> {
        let message = message.into();
        info!(
            agent_id = %self.identity.agent_id,
            ?action,
            success,
            %message,
            "reporting stage complete"
        );
        self.control
            .send_control(
                self.identity
                    .stage_complete_message(success, message, action),
            )
            .await
    }
}

/// A backup and restore agent registered with one orchestrator.
///
/// Dropping the agent closes its control channel.
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    /// Build an agent over an existing transport. Does not contact the orchestrator.
    pub fn new(
        behavior: impl AgentBehavior + 'static,
        transport: Arc<dyn OrchestratorTransport>,
        config: &AgentConfig,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let info = behavior.registration_info();
        info.validate()?;

        let identity = AgentIdentity::new(info, config.api_version.clone());
        let control = ControlChannel::new(transport.clone(), config.max_registration_attempts);
        let chunks: Arc<dyn ChunkSource> = Arc::new(FileChunkSource::new(config.chunk_size));

        Ok(Self {
            inner: Arc::new(AgentInner {
                identity,
                behavior: Box::new(behavior),
                control,
                transport,
                chunks,
                session: Mutex::new(SessionState::default()),
            }),
        })
    }

    /// Connect to the orchestrator named in `config` and build an agent over gRPC.
    pub async fn connect(
        behavior: impl AgentBehavior + 'static,
        config: &AgentConfig,
    ) -> Result<Self, AgentError> {
        let transport = GrpcTransport::connect(&ChannelConfig::from_agent_config(config)).await?;
        Self::new(behavior, Arc::new(transport), config)
    }

    /// Establish the control channel (once) and send the Register frame.
    pub async fn registrate(&self) -> Result<(), AgentError> {
        if !self.inner.control.is_established() {
            let dispatcher = ControlDispatcher::new(Arc::downgrade(&self.inner));
            self.inner.control.establish(Arc::new(dispatcher))?;
        }
        info!(
            agent_id = %self.inner.identity.agent_id,
            scope = %self.inner.identity.scope,
            api_version = %self.inner.identity.api_version,
            "registering with orchestrator"
        );
        self.inner
            .control
            .send_control(self.inner.identity.register_message())
            .await
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.inner.identity
    }

    pub fn agent_id(&self) -> &str {
        self.inner.agent_id()
    }

    /// Watch the control channel lifecycle.
    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.inner.control.status()
    }

    /// Open a fresh backup data stream.
    pub fn open_backup_stream(&self) -> BackupStream {
        self.inner.open_backup_stream()
    }

    /// Open a fresh restore data stream for `fragment` of the current backup.
    pub async fn open_restore_stream(
        &self,
        fragment: &FragmentInfo,
    ) -> Result<InboundStream<RestoreData>, AgentError> {
        self.inner.open_restore_stream(fragment).await
    }

    /// Send a StageComplete frame tagged with `action`.
    pub async fn report_stage_complete(
        &self,
        success: bool,
        message: impl Into<String>,
        action: Action,
    ) -> Result<(), AgentError> {
        self.inner
            .report_stage_complete(success, message, action)
            .await
    }

    pub fn clear_backup_session(&self) {
        self.inner.clear_backup_session();
    }

    pub fn clear_restore_session(&self) {
        self.inner.clear_restore_session();
    }

    /// Stop the control channel and wait for its listener to finish.
    pub async fn shutdown(&self) {
        info!(agent_id = %self.inner.identity.agent_id, "shutting down agent");
        self.inner.control.shutdown().await;
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.inner.control.close();
    }
}

// ABOUTME: Transport seam between the agent SDK and the orchestrator.
// ABOUTME: OrchestratorTransport trait and its gRPC implementation over one shared tonic channel.

use async_trait::async_trait;
use bro_proto::client::{ControlInterfaceClient, DataInterfaceClient};
use bro_proto::{AgentControl, BackupData, Metadata, OrchestratorControl, RestoreData};
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;

use crate::channel::{create_channel, ChannelConfig};
use crate::error::AgentError;
use crate::stream::{inbound, InboundStream};

/// The three calls an agent makes against the orchestrator.
///
/// Every call opens a new RPC; nothing is shared between calls except the
/// underlying connection.
#[async_trait]
pub trait OrchestratorTransport: Send + Sync {
    /// Open the bidirectional control stream, writing whatever `outbound` yields.
    async fn open_control(
        &self,
        outbound: ReceiverStream<AgentControl>,
    ) -> Result<InboundStream<OrchestratorControl>, AgentError>;

    /// Upload one backup; resolves once the orchestrator accepted the whole stream.
    async fn backup(&self, outbound: ReceiverStream<BackupData>) -> Result<(), AgentError>;

    /// Download the fragment identified by `metadata`.
    async fn restore(&self, metadata: Metadata) -> Result<InboundStream<RestoreData>, AgentError>;
}

/// gRPC transport over a single tonic channel.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    channel: Channel,
}

impl GrpcTransport {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Connect to the orchestrator described by `config`.
    pub async fn connect(config: &ChannelConfig) -> Result<Self, AgentError> {
        let channel = create_channel(config).await?;
        Ok(Self::new(channel))
    }
}

#[async_trait]
impl OrchestratorTransport for GrpcTransport {
    async fn open_control(
        &self,
        outbound: ReceiverStream<AgentControl>,
    ) -> Result<InboundStream<OrchestratorControl>, AgentError> {
        let mut client = ControlInterfaceClient::new(self.channel.clone());
        let response = client.establish_control_channel(outbound).await?;
        Ok(inbound(response.into_inner()))
    }

    async fn backup(&self, outbound: ReceiverStream<BackupData>) -> Result<(), AgentError> {
        let mut client = DataInterfaceClient::new(self.channel.clone());
        client.backup(outbound).await?;
        Ok(())
    }

    async fn restore(&self, metadata: Metadata) -> Result<InboundStream<RestoreData>, AgentError> {
        let mut client = DataInterfaceClient::new(self.channel.clone());
        let response = client.restore(metadata).await?;
        Ok(inbound(response.into_inner()))
    }
}

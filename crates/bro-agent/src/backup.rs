// ABOUTME: Outbound backup transfer: metadata, then filename/content/checksum per file.
// ABOUTME: BackupStream owns one backup call; BackupTransferEngine drives the frames through it.

use std::path::Path;
use std::sync::Arc;

use bro_proto::{backup_data, BackupData, DataMessageType, Metadata};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::checksum::{Checksum, Md5Checksum};
use crate::chunk::ChunkSource;
use crate::error::AgentError;
use crate::fragment::BackupFragmentInfo;
use crate::frame::{backup_chunk, ChunkField, FileKind};
use crate::stream::{OutboundStream, StreamSender};
use crate::transport::OrchestratorTransport;

/// One backup data call. Dropping it before [`BackupStream::finish`] cancels the call.
pub struct BackupStream {
    sender: Option<StreamSender<BackupData>>,
    call: Option<JoinHandle<Result<(), AgentError>>>,
}

impl BackupStream {
    /// Start a fresh backup call on `transport`.
    pub fn open(transport: Arc<dyn OrchestratorTransport>) -> Self {
        let OutboundStream { sender, stream } = OutboundStream::with_default_buffer();
        let call = tokio::spawn(async move { transport.backup(stream).await });
        Self {
            sender: Some(sender),
            call: Some(call),
        }
    }

    pub async fn send(&self, frame: BackupData) -> Result<(), AgentError> {
        match &self.sender {
            Some(sender) => sender.send(frame).await,
            None => Err(AgentError::StreamClosed),
        }
    }

    /// Signal that no more frames follow and wait for the orchestrator to accept the upload.
    pub async fn finish(mut self) -> Result<(), AgentError> {
        self.sender.take();
        match self.call.take() {
            Some(call) => call
                .await
                .map_err(|e| AgentError::StreamError(format!("backup call aborted: {}", e)))?,
            None => Err(AgentError::StreamClosed),
        }
    }

    /// Turn a local send failure into the most telling error.
    ///
    /// A closed stream means the call itself ended, so its result explains why.
    /// Anything else cancels the call without completing the upload.
    async fn fail(self, cause: AgentError) -> AgentError {
        match cause {
            AgentError::StreamClosed => match self.finish().await {
                Err(e) => e,
                Ok(()) => AgentError::StreamClosed,
            },
            other => other,
        }
    }
}

impl Drop for BackupStream {
    fn drop(&mut self) {
        if let Some(call) = self.call.take() {
            call.abort();
        }
    }
}

/// Streams one fragment's files to the orchestrator.
pub struct BackupTransferEngine {
    chunks: Arc<dyn ChunkSource>,
    checksum: Box<dyn Checksum>,
}

impl BackupTransferEngine {
    pub fn new(chunks: Arc<dyn ChunkSource>) -> Self {
        Self::with_checksum(chunks, Box::new(Md5Checksum::new()))
    }

    pub fn with_checksum(chunks: Arc<dyn ChunkSource>, checksum: Box<dyn Checksum>) -> Self {
        Self { chunks, checksum }
    }

    /// Send `fragment` on `stream` and close it.
    ///
    /// Every failure is reported as [`AgentError::TransferFailed`] naming the
    /// file being sent. Frames already written are not retracted.
    pub async fn transfer(
        &mut self,
        stream: BackupStream,
        fragment: &BackupFragmentInfo,
        agent_id: &str,
        backup_name: &str,
    ) -> Result<(), AgentError> {
        let backup_file = fragment.backup_file_path.as_path();

        if let Err(e) = stream
            .send(metadata_frame(fragment, agent_id, backup_name))
            .await
        {
            let e = stream.fail(e).await;
            return Err(AgentError::transfer_failed(backup_file.display().to_string(), e));
        }

        if let Err(e) = self
            .send_file(&stream, backup_file, FileKind::BackupFile)
            .await
        {
            let e = stream.fail(e).await;
            return Err(AgentError::transfer_failed(backup_file.display().to_string(), e));
        }

        if let Some(custom_metadata) = fragment.custom_metadata_file_path() {
            if let Err(e) = self
                .send_file(&stream, custom_metadata, FileKind::CustomMetadataFile)
                .await
            {
                let e = stream.fail(e).await;
                return Err(AgentError::transfer_failed(
                    custom_metadata.display().to_string(),
                    e,
                ));
            }
        }

        stream
            .finish()
            .await
            .map_err(|e| AgentError::transfer_failed(backup_file.display().to_string(), e))?;

        info!(
            agent_id,
            backup_name,
            fragment_id = %fragment.info.fragment_id,
            "backup fragment sent"
        );
        Ok(())
    }

    /// Filename frame, one content frame per chunk, then the checksum frame.
    async fn send_file(
        &mut self,
        stream: &BackupStream,
        path: &Path,
        kind: FileKind,
    ) -> Result<(), AgentError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut reader = self
            .chunks
            .open(path)
            .await
            .map_err(|e| AgentError::StreamError(e.to_string()))?;

        self.checksum.reset();
        stream
            .send(backup_chunk(kind, ChunkField::FileName(file_name)))
            .await?;

        let mut chunks = 0usize;
        while let Some(chunk) = reader
            .next_chunk()
            .await
            .map_err(|e| AgentError::StreamError(e.to_string()))?
        {
            self.checksum.update(&chunk);
            stream
                .send(backup_chunk(kind, ChunkField::Content(chunk)))
                .await?;
            chunks += 1;
        }

        let checksum = self.checksum.checksum();
        stream
            .send(backup_chunk(kind, ChunkField::Checksum(checksum.clone())))
            .await?;

        debug!(file = %path.display(), ?kind, chunks, %checksum, "file sent");
        Ok(())
    }
}

fn metadata_frame(fragment: &BackupFragmentInfo, agent_id: &str, backup_name: &str) -> BackupData {
    BackupData {
        data_message_type: DataMessageType::Metadata as i32,
        data: Some(backup_data::Data::Metadata(Metadata {
            agent_id: agent_id.to_string(),
            fragment: Some((&fragment.info).into()),
            backup_name: backup_name.to_string(),
        })),
    }
}

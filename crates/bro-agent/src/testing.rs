// ABOUTME: In-memory orchestrator transport for unit tests.
// ABOUTME: Scripts inbound control/restore streams and records everything the agent writes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bro_proto::{
    orchestrator_control, restore_data, Action, AgentControl, BackupData, BackupFileChunk,
    CustomMetadataFileChunk, DataMessageType, Execution, Metadata, OrchestratorControl,
    OrchestratorMessageType, RestoreData, SoftwareVersionInfo,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};

use crate::error::AgentError;
use crate::stream::InboundStream;
use crate::transport::OrchestratorTransport;

pub(crate) type ControlFeed = mpsc::UnboundedSender<Result<OrchestratorControl, AgentError>>;

#[derive(Default)]
pub(crate) struct FakeTransport {
    control_streams: Mutex<VecDeque<InboundStream<OrchestratorControl>>>,
    control_opens: AtomicUsize,
    control_written: Arc<Mutex<Vec<AgentControl>>>,
    backups: Mutex<Vec<Vec<BackupData>>>,
    fail_backups: Mutex<Option<String>>,
    restore_requests: Mutex<Vec<Metadata>>,
    restore_streams: Mutex<VecDeque<Vec<Result<RestoreData, AgentError>>>>,
    fail_restores: Mutex<Option<tonic::Status>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a finite control stream for the next `open_control`.
    pub(crate) fn push_control(&self, frames: Vec<Result<OrchestratorControl, AgentError>>) {
        self.control_streams
            .lock()
            .unwrap()
            .push_back(Box::pin(futures::stream::iter(frames)));
    }

    /// Queue an open-ended control stream fed through the returned sender.
    pub(crate) fn push_control_feed(&self) -> ControlFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.control_streams
            .lock()
            .unwrap()
            .push_back(Box::pin(UnboundedReceiverStream::new(rx)));
        tx
    }

    pub(crate) fn push_restore(&self, frames: Vec<Result<RestoreData, AgentError>>) {
        self.restore_streams.lock().unwrap().push_back(frames);
    }

    pub(crate) fn fail_backups(&self, reason: &str) {
        *self.fail_backups.lock().unwrap() = Some(reason.to_string());
    }

    /// Make every restore call fail with `status` before any frame is read.
    pub(crate) fn fail_restores(&self, status: tonic::Status) {
        *self.fail_restores.lock().unwrap() = Some(status);
    }

    pub(crate) fn control_opens(&self) -> usize {
        self.control_opens.load(Ordering::SeqCst)
    }

    pub(crate) fn control_written(&self) -> Vec<AgentControl> {
        self.control_written.lock().unwrap().clone()
    }

    pub(crate) fn backups(&self) -> Vec<Vec<BackupData>> {
        self.backups.lock().unwrap().clone()
    }

    pub(crate) fn restore_requests(&self) -> Vec<Metadata> {
        self.restore_requests.lock().unwrap().clone()
    }

    /// Wait until at least `count` control frames were written.
    pub(crate) async fn wait_for_control_written(&self, count: usize) -> Vec<AgentControl> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let written = self.control_written();
                if written.len() >= count {
                    return written;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for control frames")
    }
}

#[async_trait]
impl OrchestratorTransport for FakeTransport {
    async fn open_control(
        &self,
        outbound: ReceiverStream<AgentControl>,
    ) -> Result<InboundStream<OrchestratorControl>, AgentError> {
        self.control_opens.fetch_add(1, Ordering::SeqCst);

        // Record what is already buffered before the call returns, then keep forwarding.
        let mut rx = outbound.into_inner();
        let written = self.control_written.clone();
        while let Ok(frame) = rx.try_recv() {
            written.lock().unwrap().push(frame);
        }
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                written.lock().unwrap().push(frame);
            }
        });

        let next = self.control_streams.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| {
            Box::pin(futures::stream::iter(vec![Err(AgentError::StreamError(
                "connection reset".to_string(),
            ))]))
        }))
    }

    async fn backup(&self, outbound: ReceiverStream<BackupData>) -> Result<(), AgentError> {
        let frames: Vec<BackupData> = outbound.collect().await;
        self.backups.lock().unwrap().push(frames);
        match self.fail_backups.lock().unwrap().clone() {
            Some(reason) => Err(AgentError::StreamError(reason)),
            None => Ok(()),
        }
    }

    async fn restore(&self, metadata: Metadata) -> Result<InboundStream<RestoreData>, AgentError> {
        self.restore_requests.lock().unwrap().push(metadata);
        if let Some(status) = self.fail_restores.lock().unwrap().clone() {
            return Err(status.into());
        }
        let frames = self
            .restore_streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(frames)))
    }
}

/// Wait until `condition` holds.
pub(crate) async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

/// A non-execution stage frame for `action`.
pub(crate) fn stage_command(
    action: Action,
    message_type: OrchestratorMessageType,
    payload: orchestrator_control::Payload,
) -> OrchestratorControl {
    OrchestratorControl {
        action: action as i32,
        orchestrator_message_type: message_type as i32,
        payload: Some(payload),
    }
}

pub(crate) fn backup_command(backup_name: &str) -> OrchestratorControl {
    OrchestratorControl {
        action: Action::Backup as i32,
        orchestrator_message_type: OrchestratorMessageType::Execution as i32,
        payload: Some(orchestrator_control::Payload::Execution(Execution {
            backup_name: backup_name.to_string(),
            software_version_info: None,
            fragment: vec![],
        })),
    }
}

pub(crate) fn restore_command(
    backup_name: &str,
    version: SoftwareVersionInfo,
    fragments: Vec<bro_proto::Fragment>,
) -> OrchestratorControl {
    OrchestratorControl {
        action: Action::Restore as i32,
        orchestrator_message_type: OrchestratorMessageType::Execution as i32,
        payload: Some(orchestrator_control::Payload::Execution(Execution {
            backup_name: backup_name.to_string(),
            software_version_info: Some(version),
            fragment: fragments,
        })),
    }
}

pub(crate) fn file_name(name: &str) -> Result<RestoreData, AgentError> {
    Ok(backup_file_frame(BackupFileChunk {
        file_name: name.to_string(),
        ..Default::default()
    }))
}

pub(crate) fn content(bytes: &[u8]) -> Result<RestoreData, AgentError> {
    Ok(backup_file_frame(BackupFileChunk {
        content: bytes.to_vec(),
        ..Default::default()
    }))
}

pub(crate) fn checksum(value: &str) -> Result<RestoreData, AgentError> {
    Ok(backup_file_frame(BackupFileChunk {
        checksum: value.to_string(),
        ..Default::default()
    }))
}

pub(crate) fn custom_metadata(chunk: CustomMetadataFileChunk) -> Result<RestoreData, AgentError> {
    Ok(RestoreData {
        data_message_type: DataMessageType::CustomMetadataFile as i32,
        data: Some(restore_data::Data::CustomMetadataFileChunk(chunk)),
    })
}

fn backup_file_frame(chunk: BackupFileChunk) -> RestoreData {
    RestoreData {
        data_message_type: DataMessageType::BackupFile as i32,
        data: Some(restore_data::Data::BackupFileChunk(chunk)),
    }
}

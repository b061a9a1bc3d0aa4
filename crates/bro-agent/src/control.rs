// ABOUTME: Long-lived control channel between an agent and the orchestrator.
// ABOUTME: Registration handshake, bounded re-registration on read failure, and the listener loop.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bro_proto::{AgentControl, OrchestratorControl};
use futures::StreamExt;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::registration::is_register;
use crate::stream::{OutboundStream, StreamSender};
use crate::transport::OrchestratorTransport;

/// Why the control channel stopped listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every re-registration attempt failed.
    RegistrationExhausted,
    /// The owner shut the channel down.
    Shutdown,
}

/// Observable lifecycle of the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Idle,
    /// Established, waiting for registration or for the stream to open.
    Connecting,
    Listening,
    Stopped(StopReason),
}

impl ChannelStatus {
    pub fn is_stopped(&self) -> bool {
        matches!(self, ChannelStatus::Stopped(_))
    }
}

/// Receives every inbound control frame, one at a time.
///
/// The listener does not read the next frame until `process` returns.
#[async_trait]
pub trait ControlHandler: Send + Sync {
    async fn process(&self, frame: OrchestratorControl);
}

/// State shared between the channel handle and its listener task.
struct Shared {
    sender: Mutex<Option<StreamSender<AgentControl>>>,
    last_register: Mutex<Option<AgentControl>>,
    ready: Notify,
    status: watch::Sender<ChannelStatus>,
}

impl Shared {
    fn current_sender(&self) -> Option<StreamSender<AgentControl>> {
        self.sender.lock().ok().and_then(|guard| guard.clone())
    }

    fn replace_sender(&self, sender: Option<StreamSender<AgentControl>>) {
        if let Ok(mut guard) = self.sender.lock() {
            *guard = sender;
        }
    }

    fn last_register(&self) -> Option<AgentControl> {
        self.last_register.lock().ok().and_then(|guard| guard.clone())
    }

    fn set_status(&self, status: ChannelStatus) {
        self.status.send_replace(status);
    }
}

/// Owns the bidirectional control stream.
///
/// `establish` starts a background listener that waits until the first
/// Register frame has been sent, then reads and dispatches inbound frames.
/// When a read fails the stored Register frame is re-sent on a fresh call,
/// up to `max_registration_attempts` consecutive times.
pub struct ControlChannel {
    transport: Arc<dyn OrchestratorTransport>,
    max_registration_attempts: u32,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ControlChannel {
    pub fn new(transport: Arc<dyn OrchestratorTransport>, max_registration_attempts: u32) -> Self {
        let (status, _) = watch::channel(ChannelStatus::Idle);
        Self {
            transport,
            max_registration_attempts,
            shared: Arc::new(Shared {
                sender: Mutex::new(None),
                last_register: Mutex::new(None),
                ready: Notify::new(),
                status,
            }),
            cancel: CancellationToken::new(),
            listener: Mutex::new(None),
        }
    }

    /// Start the listener without opening the control RPC.
    ///
    /// The listener opens the RPC once the first Register frame is queued by
    /// [`send_control`](Self::send_control). Until then the status stays
    /// [`ChannelStatus::Connecting`] and no call reaches the orchestrator.
    pub fn establish(&self, handler: Arc<dyn ControlHandler>) -> Result<(), AgentError> {
        let mut listener = self
            .listener
            .lock()
            .map_err(|_| AgentError::StreamError("control channel state poisoned".into()))?;
        if listener.is_some() || self.cancel.is_cancelled() {
            return Err(AgentError::StreamError(
                "control channel already established".into(),
            ));
        }

        let OutboundStream { sender, stream } = OutboundStream::with_default_buffer();
        self.shared.replace_sender(Some(sender));
        self.shared.set_status(ChannelStatus::Connecting);

        let task = Listener {
            transport: self.transport.clone(),
            shared: self.shared.clone(),
            handler,
            cancel: self.cancel.clone(),
            max_registration_attempts: self.max_registration_attempts,
        };
        *listener = Some(tokio::spawn(task.run(stream)));
        Ok(())
    }

    /// Write a frame to the control stream.
    ///
    /// A Register frame is remembered for re-registration and releases the listener.
    pub async fn send_control(&self, frame: AgentControl) -> Result<(), AgentError> {
        let sender = self
            .shared
            .current_sender()
            .ok_or(AgentError::StreamClosed)?;
        let register = is_register(&frame);
        if register {
            if let Ok(mut last) = self.shared.last_register.lock() {
                *last = Some(frame.clone());
            }
        }
        sender.send(frame).await?;
        if register {
            self.shared.ready.notify_one();
        }
        Ok(())
    }

    /// Subscribe to status changes.
    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status.subscribe()
    }

    /// Stop listening, close the write side, and wait for the listener to finish.
    ///
    /// Must not be awaited from inside a [`ControlHandler`], which runs on the listener.
    pub async fn shutdown(&self) {
        let handle = self.begin_shutdown();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.shared
            .set_status(ChannelStatus::Stopped(StopReason::Shutdown));
    }

    /// Stop listening and close the write side without waiting for the listener.
    pub fn close(&self) {
        // The listener observes the cancellation and drops the handler itself.
        let _ = self.begin_shutdown();
        self.shared
            .set_status(ChannelStatus::Stopped(StopReason::Shutdown));
    }

    /// Whether `establish` has been called.
    pub fn is_established(&self) -> bool {
        self.listener
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn begin_shutdown(&self) -> Option<JoinHandle<()>> {
        self.cancel.cancel();
        self.shared.replace_sender(None);
        self.listener.lock().ok().and_then(|mut guard| guard.take())
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.close();
    }
}

struct Listener {
    transport: Arc<dyn OrchestratorTransport>,
    shared: Arc<Shared>,
    handler: Arc<dyn ControlHandler>,
    cancel: CancellationToken,
    max_registration_attempts: u32,
}

impl Listener {
    async fn run(self, mut outbound: ReceiverStream<AgentControl>) {
        tokio::select! {
            _ = self.cancel.cancelled() => return,
            _ = self.shared.ready.notified() => {}
        }

        let mut retries = 0u32;
        loop {
            let failure = tokio::select! {
                _ = self.cancel.cancelled() => return,
                failure = self.listen_once(outbound, &mut retries) => failure,
            };

            if retries >= self.max_registration_attempts {
                warn!(
                    attempts = retries,
                    error = %failure,
                    "registration attempts exhausted, control channel stopped"
                );
                self.shared.replace_sender(None);
                self.shared
                    .set_status(ChannelStatus::Stopped(StopReason::RegistrationExhausted));
                return;
            }

            retries += 1;
            warn!(
                attempt = retries,
                max = self.max_registration_attempts,
                error = %failure,
                "control stream read failed, re-sending registration"
            );
            self.shared.set_status(ChannelStatus::Connecting);

            let OutboundStream { sender, stream } = OutboundStream::with_default_buffer();
            if let Some(register) = self.shared.last_register() {
                // Fresh channel with spare capacity; cannot be full.
                let _ = sender.try_send(register);
            }
            self.shared.replace_sender(Some(sender));
            outbound = stream;
        }
    }

    /// Run one control call until it fails, returning the failure.
    async fn listen_once(
        &self,
        outbound: ReceiverStream<AgentControl>,
        retries: &mut u32,
    ) -> AgentError {
        let mut inbound = match self.transport.open_control(outbound).await {
            Ok(inbound) => inbound,
            Err(e) => return e,
        };
        self.shared.set_status(ChannelStatus::Listening);
        debug!("control channel listening");

        loop {
            match inbound.next().await {
                Some(Ok(frame)) => {
                    if *retries > 0 {
                        info!(after_attempts = *retries, "control channel recovered");
                    }
                    *retries = 0;
                    self.handler.process(frame).await;
                }
                Some(Err(e)) => return e,
                None => return AgentError::StreamClosed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bro_proto::Action;

    use crate::registration::{AgentIdentity, RegistrationInfo, SoftwareVersion};
    use crate::testing::{backup_command, FakeTransport};

    #[derive(Default)]
    struct RecordingHandler {
        frames: Mutex<Vec<OrchestratorControl>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RecordingHandler {
        fn count(&self) -> usize {
            self.frames.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ControlHandler for RecordingHandler {
        async fn process(&self, frame: OrchestratorControl) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.frames.lock().unwrap().push(frame);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn register_frame() -> AgentControl {
        let version = SoftwareVersion::new("p", "n", "r", "d", "desc", "t");
        AgentIdentity::new(RegistrationInfo::new("A1", "", version), "4.0").register_message()
    }

    async fn wait_for_status(channel: &ControlChannel, status: ChannelStatus) {
        let mut rx = channel.status();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == status))
            .await
            .expect("timed out waiting for status")
            .unwrap();
    }

    #[tokio::test]
    async fn test_listener_waits_for_register() {
        let transport = FakeTransport::new();
        let channel = ControlChannel::new(transport.clone(), 20);
        let handler = Arc::new(RecordingHandler::default());

        assert_eq!(*channel.status().borrow(), ChannelStatus::Idle);
        channel.establish(handler.clone()).unwrap();
        assert_eq!(*channel.status().borrow(), ChannelStatus::Connecting);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.control_opens(), 0);

        let feed = transport.push_control_feed();
        channel.send_control(register_frame()).await.unwrap();
        wait_for_status(&channel, ChannelStatus::Listening).await;
        assert_eq!(transport.control_opens(), 1);

        feed.send(Ok(backup_command("B1"))).unwrap();
        feed.send(Ok(backup_command("B2"))).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.count() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(handler.max_in_flight.load(Ordering::SeqCst), 1);
        let written = transport.control_written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].action(), Action::Register);
    }

    #[tokio::test]
    async fn test_registration_resent_exactly_max_times() {
        let transport = FakeTransport::new();
        let channel = ControlChannel::new(transport.clone(), 20);
        channel
            .establish(Arc::new(RecordingHandler::default()))
            .unwrap();
        channel.send_control(register_frame()).await.unwrap();

        wait_for_status(
            &channel,
            ChannelStatus::Stopped(StopReason::RegistrationExhausted),
        )
        .await;

        // One initial registration plus twenty re-sends, one call each.
        assert_eq!(transport.control_opens(), 21);
        let written = transport.control_written();
        assert_eq!(written.len(), 21);
        assert!(written.iter().all(|frame| *frame == register_frame()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.control_opens(), 21);
        assert!(matches!(
            channel.send_control(register_frame()).await,
            Err(AgentError::StreamClosed)
        ));
    }

    #[tokio::test]
    async fn test_received_frame_resets_retry_count() {
        let transport = FakeTransport::new();
        let reset = || AgentError::StreamError("reset".into());
        transport.push_control(vec![Ok(backup_command("B1")), Err(reset())]);
        transport.push_control(vec![Ok(backup_command("B2")), Err(reset())]);

        let channel = ControlChannel::new(transport.clone(), 1);
        let handler = Arc::new(RecordingHandler::default());
        channel.establish(handler.clone()).unwrap();
        channel.send_control(register_frame()).await.unwrap();

        wait_for_status(
            &channel,
            ChannelStatus::Stopped(StopReason::RegistrationExhausted),
        )
        .await;

        assert_eq!(transport.control_opens(), 3);
        assert_eq!(handler.count(), 2);
    }

    #[tokio::test]
    async fn test_end_of_stream_counts_as_read_failure() {
        let transport = FakeTransport::new();
        transport.push_control(vec![]);

        let channel = ControlChannel::new(transport.clone(), 0);
        channel
            .establish(Arc::new(RecordingHandler::default()))
            .unwrap();
        channel.send_control(register_frame()).await.unwrap();

        wait_for_status(
            &channel,
            ChannelStatus::Stopped(StopReason::RegistrationExhausted),
        )
        .await;
        assert_eq!(transport.control_opens(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_listener() {
        let transport = FakeTransport::new();
        let _feed = transport.push_control_feed();
        let channel = ControlChannel::new(transport.clone(), 20);
        channel
            .establish(Arc::new(RecordingHandler::default()))
            .unwrap();
        channel.send_control(register_frame()).await.unwrap();
        wait_for_status(&channel, ChannelStatus::Listening).await;

        channel.shutdown().await;

        assert_eq!(
            *channel.status().borrow(),
            ChannelStatus::Stopped(StopReason::Shutdown)
        );
        assert!(matches!(
            channel.send_control(register_frame()).await,
            Err(AgentError::StreamClosed)
        ));
        assert!(channel
            .establish(Arc::new(RecordingHandler::default()))
            .is_err());
    }

    #[tokio::test]
    async fn test_send_before_establish_fails() {
        let channel = ControlChannel::new(FakeTransport::new(), 20);
        assert!(matches!(
            channel.send_control(register_frame()).await,
            Err(AgentError::StreamClosed)
        ));
    }
}

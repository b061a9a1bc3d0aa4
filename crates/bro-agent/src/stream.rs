// ABOUTME: Typed stream wrappers for orchestrator gRPC calls.
// ABOUTME: Outbound sender/stream pairs and the boxed inbound stream used by the transport seam.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Streaming;

use crate::error::AgentError;

/// Frames buffered per outbound call before `send` waits.
pub const DEFAULT_CHANNEL_BUFFER: usize = 100;

/// Inbound frames from the orchestrator, independent of the transport behind them.
pub type InboundStream<T> = Pin<Box<dyn Stream<Item = Result<T, AgentError>> + Send>>;

/// Box a tonic response stream, mapping its status errors into [`AgentError`].
pub fn inbound<T>(streaming: Streaming<T>) -> InboundStream<T>
where
    T: Send + 'static,
{
    Box::pin(streaming.map(|frame| frame.map_err(AgentError::from)))
}

/// Writer for one outbound call. Every send fails once the call has ended.
#[derive(Debug, Clone)]
pub struct StreamSender<T> {
    inner: mpsc::Sender<T>,
}

impl<T> StreamSender<T> {
    pub async fn send(&self, frame: T) -> Result<(), AgentError> {
        self.inner
            .send(frame)
            .await
            .map_err(|_| AgentError::StreamClosed)
    }

    /// Queue a frame without waiting for buffer space.
    pub fn try_send(&self, frame: T) -> Result<(), AgentError> {
        self.inner
            .try_send(frame)
            .map_err(|_| AgentError::StreamClosed)
    }
}

/// Sender and request stream for one client-streaming call.
///
/// `stream` goes to the transport; frames pushed through `sender` are
/// written in order. Dropping every sender ends the request stream.
pub struct OutboundStream<T> {
    pub sender: StreamSender<T>,
    pub stream: ReceiverStream<T>,
}

impl<T> OutboundStream<T> {
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        Self {
            sender: StreamSender { inner: tx },
            stream: ReceiverStream::new(rx),
        }
    }

    pub fn with_default_buffer() -> Self {
        Self::new(DEFAULT_CHANNEL_BUFFER)
    }
}

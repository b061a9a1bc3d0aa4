// ABOUTME: Error types for the bro-agent crate.
// ABOUTME: Structured errors for channel setup, registration, and data transfers.

use thiserror::Error;

/// Errors that can occur in the agent SDK.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Invalid orchestrator address format.
    #[error("invalid orchestrator address: {0}")]
    InvalidAddress(String),

    /// Failed to connect to the orchestrator.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Registration information was rejected locally before being sent.
    #[error("invalid registration information: {0}")]
    InvalidRegistration(String),

    /// Stream was closed unexpectedly.
    #[error("stream closed unexpectedly")]
    StreamClosed,

    /// Error on the gRPC stream.
    #[error("stream error: {0}")]
    StreamError(String),

    /// Sending a backup file to the orchestrator failed.
    #[error("there was an error while trying to transfer: {path}: {reason}")]
    TransferFailed { path: String, reason: String },

    /// Reading a restore stream failed.
    #[error("failed to download fragment: {0}")]
    DownloadFailed(String),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),
}

impl AgentError {
    /// Build a transfer failure for the file being sent.
    pub fn transfer_failed(path: impl Into<String>, reason: impl ToString) -> Self {
        AgentError::TransferFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<tonic::Status> for AgentError {
    fn from(status: tonic::Status) -> Self {
        AgentError::StreamError(status.to_string())
    }
}

impl From<tonic::transport::Error> for AgentError {
    fn from(err: tonic::transport::Error) -> Self {
        AgentError::ConnectionFailed(err.to_string())
    }
}

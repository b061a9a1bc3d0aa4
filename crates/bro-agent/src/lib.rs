// ABOUTME: Rust SDK for backup and restore agents driven by a central orchestrator.
// ABOUTME: Provides Agent, the AgentBehavior trait, action facades, and data transfer engines.

//! # bro-agent
//!
//! An agent registers with the orchestrator over a long-lived control stream,
//! then waits for backup and restore commands. Each command is handed to the
//! agent's [`AgentBehavior`], which moves data through [`BackupActions`] or
//! [`RestoreActions`] and reports the outcome when done. Preparation,
//! post-action and cancel frames reach the behavior's stage hooks through
//! [`StageActions`]; the default hooks report success.
//!
//! ## Quick Start
//!
//! ```ignore
//! use bro_agent::{Agent, AgentConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AgentConfig::load()?;
//!     let agent = Agent::connect(MyBehavior::new(), &config).await?;
//!     agent.registrate().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     agent.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod agent;
pub mod backup;
pub mod behavior;
pub mod channel;
pub mod checksum;
pub mod chunk;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod fragment;
pub mod frame;
pub mod registration;
pub mod restore;
pub mod sink;
pub mod stream;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Agent and behavior contract
pub use actions::{BackupActions, RestoreActions, Stage, StageActions};
pub use agent::Agent;
pub use behavior::AgentBehavior;
pub use dispatch::BEHAVIOR_PANIC_MESSAGE;

// Value records
pub use fragment::{BackupFragmentInfo, FragmentInfo};
pub use registration::{AgentIdentity, RegistrationInfo, SoftwareVersion};

// Transfers
pub use backup::{BackupStream, BackupTransferEngine};
pub use checksum::{Checksum, Md5Checksum};
pub use chunk::{ChunkReader, ChunkSource, FileChunkSource};
pub use restore::{RestoreOutcome, RestoreTransferEngine};
pub use sink::{FileSink, FsFileSink};

// Control channel and transport
pub use channel::{create_channel, ChannelConfig, KeepAliveConfig};
pub use control::{ChannelStatus, ControlChannel, ControlHandler, StopReason};
pub use stream::{InboundStream, OutboundStream, StreamSender};
pub use transport::{GrpcTransport, OrchestratorTransport};

// Configuration and errors
pub use config::AgentConfig;
pub use error::AgentError;

// Re-export proto types for convenience
pub use bro_proto;

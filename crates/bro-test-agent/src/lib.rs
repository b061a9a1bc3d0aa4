// ABOUTME: Library half of the reference agent, shared by the binary and its tests.
// ABOUTME: TOML configuration and the file-based test behavior.

pub mod behavior;
pub mod config;

pub use behavior::TestAgentBehavior;
pub use config::{FragmentFile, SoftwareVersionConfig, TestAgentConfig};

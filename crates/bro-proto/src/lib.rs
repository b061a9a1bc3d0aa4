// ABOUTME: Re-exports generated protobuf types for the orchestrator protocol.
// ABOUTME: Single source of truth for control/data gRPC services and message types.

#![allow(clippy::derive_partial_eq_without_eq)]

/// Generated protobuf types for the orchestrator protocol.
pub mod orchestrator {
    tonic::include_proto!("orchestrator");
}

// Re-export commonly used types at crate root for convenience
pub use orchestrator::*;

// Re-export client types under a client module
pub mod client {
    pub use super::orchestrator::control_interface_client::ControlInterfaceClient;
    pub use super::orchestrator::data_interface_client::DataInterfaceClient;
}

// Re-export server types under a server module
pub mod server {
    pub use super::orchestrator::control_interface_server::{
        ControlInterface, ControlInterfaceServer,
    };
    pub use super::orchestrator::data_interface_server::{DataInterface, DataInterfaceServer};
}

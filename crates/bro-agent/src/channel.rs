// ABOUTME: gRPC channel creation towards the orchestrator with keep-alive and TLS.
// ABOUTME: One channel is shared by the control stream and every data stream.

use std::time::Duration;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::config::AgentConfig;
use crate::error::AgentError;

/// HTTP/2 keep-alive pings on the orchestrator connection.
///
/// Pings are sent even while no call is active: the control stream sits idle
/// between commands and must not be dropped by intermediaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl KeepAliveConfig {
    /// Ping every `secs` seconds and give up after twice that. Zero disables keep-alive.
    pub fn from_secs(secs: u64) -> Option<Self> {
        (secs > 0).then(|| Self {
            interval: Duration::from_secs(secs),
            timeout: Duration::from_secs(secs.saturating_mul(2)),
        })
    }
}

/// Where and how to reach the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Orchestrator URL, e.g. `http://127.0.0.1:3000`.
    pub url: String,
    /// TLS with the platform roots; set when the URL scheme is `https`.
    pub tls: bool,
    pub keep_alive: Option<KeepAliveConfig>,
    pub connect_timeout: Duration,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into().trim().to_string();
        let tls = url.to_ascii_lowercase().starts_with("https://");
        Self {
            url,
            tls,
            keep_alive: KeepAliveConfig::from_secs(10),
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_agent_config(config: &AgentConfig) -> Self {
        Self {
            keep_alive: KeepAliveConfig::from_secs(config.keep_alive_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            ..Self::new(&config.orchestrator_url)
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The tonic endpoint for this configuration, not yet connected.
    pub fn endpoint(&self) -> Result<Endpoint, AgentError> {
        let mut endpoint = Endpoint::from_shared(self.url.clone())
            .map_err(|e| AgentError::InvalidAddress(format!("{}: {}", self.url, e)))?
            .connect_timeout(self.connect_timeout);

        if self.tls {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_enabled_roots())
                .map_err(|e| AgentError::ConnectionFailed(format!("TLS config error: {}", e)))?;
        }

        if let Some(keep_alive) = self.keep_alive {
            endpoint = endpoint
                .http2_keep_alive_interval(keep_alive.interval)
                .keep_alive_timeout(keep_alive.timeout)
                .keep_alive_while_idle(true);
        }

        Ok(endpoint)
    }
}

/// Connect to the orchestrator.
///
/// Connects eagerly so that an unreachable orchestrator is reported when the
/// agent is built rather than on its first registration.
pub async fn create_channel(config: &ChannelConfig) -> Result<Channel, AgentError> {
    let channel = config
        .endpoint()?
        .connect()
        .await
        .map_err(|e| AgentError::ConnectionFailed(format!("{}: {}", config.url, e)))?;

    tracing::debug!(
        url = %config.url,
        tls = config.tls,
        keep_alive = config.keep_alive.is_some(),
        "orchestrator channel connected"
    );
    Ok(channel)
}

// ABOUTME: bro-test-agent binary - registers with the orchestrator via gRPC
// ABOUTME: Runs the file-based test behavior until Ctrl+C or the control channel stops

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bro_agent::{Agent, ChannelStatus, StopReason};
use bro_test_agent::{TestAgentBehavior, TestAgentConfig};
use clap::Parser;
use tracing::info;

#[derive(Parser)]
#[command(name = "bro-test-agent")]
#[command(about = "Reference backup and restore agent")]
struct Cli {
    /// Load configuration from a file (default: ~/.config/bro/test-agent.toml)
    #[arg(long, env = "BRO_TEST_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Orchestrator address, overrides the configuration file
    #[arg(short, long)]
    orchestrator: Option<String>,

    /// Agent ID, overrides the configuration file
    #[arg(long)]
    agent_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();
    bro_log::init_for("bro");

    let cli = Cli::parse();
    let config = TestAgentConfig::load(cli.config.as_deref())?
        .with_cli_overrides(cli.orchestrator, cli.agent_id);

    run_agent(config).await
}

async fn run_agent(config: TestAgentConfig) -> Result<()> {
    let agent_config = config.orchestrator.clone();
    let url = agent_config.orchestrator_url.clone();

    let agent = Agent::connect(TestAgentBehavior::new(config), &agent_config)
        .await
        .with_context(|| format!("failed to connect to orchestrator at {}", url))?;
    agent
        .registrate()
        .await
        .context("failed to send registration")?;
    info!(agent_id = %agent.agent_id(), %url, "agent registered, waiting for commands");

    let mut status = agent.status();
    let stopped = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            None
        }
        result = status.wait_for(ChannelStatus::is_stopped) => {
            result.ok().map(|status| *status)
        }
    };

    agent.shutdown().await;

    if let Some(ChannelStatus::Stopped(StopReason::RegistrationExhausted)) = stopped {
        bail!("control channel stopped: registration attempts exhausted");
    }
    Ok(())
}

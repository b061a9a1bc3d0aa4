// ABOUTME: Shared logging setup for backup/restore agent binaries
// ABOUTME: init() for plain stderr logging, init_for() to focus on the agent's own crates

use tracing_subscriber::EnvFilter;

/// Standard logging to stderr. Default: INFO level, RUST_LOG override.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

/// Crate-filtered logging to stderr. Default: INFO for crates whose name starts with
/// `crate_prefix` (e.g. "bro" matches bro_agent and bro_test_agent), WARN for the rest.
pub fn init_for(crate_prefix: &str) {
    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    for directive in directives_for(crate_prefix) {
        filter = filter.add_directive(
            directive
                .parse()
                .unwrap_or_else(|_| tracing::Level::INFO.into()),
        );
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Directives enabling INFO for the agent SDK and the agent binary under a prefix.
fn directives_for(crate_prefix: &str) -> Vec<String> {
    let prefix = crate_prefix.replace('-', "_");
    vec![
        format!("{prefix}_agent=info"),
        format!("{prefix}_test_agent=info"),
    ]
}

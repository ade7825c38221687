//! Connect command implementation

use anyhow::{Context, Result};

use gebr_comm::{connect_with_retry, AttemptOutcome, Server};
use gebr_core::config::GebrConfig;
use gebr_core::types::{ServerRole, ServerState};

use super::Session;
use crate::output::{format_status, print_info, print_success};

/// Flags of `gebr connect`
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Remote X display to forward once logged in
    pub x11: Option<u16>,
    /// Stay connected until Ctrl+C or the server goes away
    pub hold: bool,
    pub interactive: bool,
    pub use_public_key: bool,
}

/// Execute the connect command
pub async fn connect_command(config: &GebrConfig, host: &str, role: ServerRole, options: ConnectOptions) -> Result<()> {
    let session = Session::open(
        host,
        role,
        config.comm.clone(),
        options.interactive,
        options.use_public_key,
    );
    let server = &session.server;

    login(server, config).await?;
    print_success(&format_status(server.address(), &server.status()));

    if let Some(display) = options.x11 {
        let port = server
            .forward_x11(display)
            .await
            .with_context(|| format!("Failed to forward display :{}", display))?;
        print_success(&format!("X11 display :{} forwarded through local port {}", display, port));
    }

    if options.hold {
        print_info("Connected. Press Ctrl+C to disconnect");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            state = server.wait_for_state(&[ServerState::Disconnected]) => {
                state?;
                let (_, message) = server.last_error();
                if !message.is_empty() {
                    anyhow::bail!("{} disconnected: {}", server.address(), message);
                }
            }
        }
    }

    server.disconnect()?;
    Ok(())
}

/// Connect with the configured retry policy, failing unless logged in
pub(super) async fn login(server: &Server, config: &GebrConfig) -> Result<()> {
    match connect_with_retry(server, &config.cli).await? {
        AttemptOutcome::Logged => Ok(()),
        AttemptOutcome::Failed(_, message) => {
            anyhow::bail!("Could not connect to {}: {}", server.address(), message)
        }
        AttemptOutcome::TimedOut => anyhow::bail!(
            "Timed out connecting to {} after {:?}",
            server.address(),
            config.cli.connect_timeout
        ),
    }
}

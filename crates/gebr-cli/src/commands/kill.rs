//! Kill command implementation

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;

use gebr_comm::ServerEvent;
use gebr_core::config::GebrConfig;
use gebr_core::types::ServerRole;

use super::Session;
use crate::output::print_success;

/// Terminate the server's process group on `host`
pub async fn kill_command(config: &GebrConfig, host: &str, role: ServerRole, interactive: bool) -> Result<()> {
    let session = Session::open(host, role, config.comm.clone(), interactive, false);
    let server = &session.server;
    let mut events = server.subscribe();

    server.kill()?;

    let finished = tokio::time::timeout(config.cli.connect_timeout, async {
        loop {
            match events.recv().await {
                Ok(ServerEvent::KillFinished { success }) => return Some(success),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;

    match finished {
        Ok(Some(true)) => {
            print_success(&format!("Stopped {} on {}", role, server.address()));
            Ok(())
        }
        Ok(Some(false)) => anyhow::bail!("Failed to stop {} on {}", role, server.address()),
        Ok(None) => anyhow::bail!("Connection to {} closed", server.address()),
        Err(_) => anyhow::bail!("Timed out stopping {} on {}", role, server.address()),
    }
}

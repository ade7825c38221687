//! Append-key command implementation

use anyhow::Result;

use gebr_core::config::GebrConfig;
use gebr_core::error::CommError;
use gebr_core::types::ServerRole;

use super::Session;
use crate::output::{print_info, print_success};

/// Install the gebr public key in the host's authorized keys
pub async fn append_key_command(config: &GebrConfig, host: &str, interactive: bool) -> Result<()> {
    let session = Session::open(host, ServerRole::Worker, config.comm.clone(), interactive, false);
    let server = &session.server;

    match server.append_key().await {
        Ok(true) => {
            print_success(&format!("Public key installed on {}", server.address()));
            Ok(())
        }
        Ok(false) => anyhow::bail!("Failed to install the public key on {}", server.address()),
        Err(CommError::NoPublicKey(path)) => {
            print_info(&format!(
                "Create one with: ssh-keygen -t rsa -f {:?} -N ''",
                path.with_extension("")
            ));
            anyhow::bail!("No public key found at {:?}", path)
        }
        Err(e) => Err(e.into()),
    }
}

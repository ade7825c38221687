//! Communication layer configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_millis;
use crate::types::ServerRole;

/// Settings for launching ssh and the servers it reaches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommConfig {
    /// ssh executable
    pub ssh_program: String,

    /// Options placed before every other ssh argument
    pub ssh_options: Vec<String>,

    /// Private keys passed with `-i` when they exist
    pub identity_files: Vec<PathBuf>,

    /// Public key installed by `append_key`
    pub public_key_path: PathBuf,

    /// Orchestrator binary launched on the target host
    pub orchestrator_binary: String,

    /// Worker binary launched on the target host
    pub worker_binary: String,

    /// Token printed by a server right before its port number
    pub port_prefix: String,

    /// Directory holding the local X11 unix sockets
    pub x11_socket_dir: PathBuf,

    /// xauth executable used to read the display cookie
    pub xauth_program: String,

    /// How often a new tunnel is probed for readiness
    #[serde(with = "duration_millis")]
    pub tunnel_probe_interval: Duration,

    /// Identifier announced to orchestrators (random when unset)
    pub client_id: Option<String>,
}

impl Default for CommConfig {
    fn default() -> Self {
        let ssh_dir = dirs::home_dir().unwrap_or_default().join(".ssh");

        Self {
            ssh_program: "ssh".to_string(),
            ssh_options: vec![
                "-o".to_string(),
                "NoHostAuthenticationForLocalhost=yes".to_string(),
            ],
            identity_files: vec![
                ssh_dir.join("id_rsa"),
                ssh_dir.join("id_dsa"),
                ssh_dir.join("identity"),
                ssh_dir.join("gebr.key"),
            ],
            public_key_path: ssh_dir.join("gebr.key.pub"),
            orchestrator_binary: ServerRole::Orchestrator.binary_name().to_string(),
            worker_binary: ServerRole::Worker.binary_name().to_string(),
            port_prefix: "GEBR_PORT=".to_string(),
            x11_socket_dir: PathBuf::from("/tmp/.X11-unix"),
            xauth_program: "xauth".to_string(),
            tunnel_probe_interval: Duration::from_millis(200),
            client_id: None,
        }
    }
}

impl CommConfig {
    /// Binary to launch for a role
    pub fn binary_for(&self, role: ServerRole) -> &str {
        match role {
            ServerRole::Orchestrator => &self.orchestrator_binary,
            ServerRole::Worker => &self.worker_binary,
        }
    }

    /// Identity files that exist on disk
    pub fn existing_identities(&self) -> Vec<PathBuf> {
        self.identity_files
            .iter()
            .filter(|path| path.exists())
            .cloned()
            .collect()
    }
}

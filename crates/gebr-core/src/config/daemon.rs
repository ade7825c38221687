//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for `gebrd`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address the control listener binds to; port 0 picks a free one
    pub bind_address: String,

    /// Shell used to run submitted jobs
    pub job_shell: String,

    /// Root replacing `$HOME/.gebr` for the lock file
    pub lock_root: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            job_shell: "/bin/sh".to_string(),
            lock_root: None,
        }
    }
}

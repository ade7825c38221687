//! Configuration management

mod cli;
mod comm;
mod daemon;
pub mod serde_utils;

pub use cli::{CliConfig, RetryDelay};
pub use comm::CommConfig;
pub use daemon::DaemonConfig;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Get the default configuration directory (`$HOME/.gebr`)
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gebr")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Whole configuration file, one table per component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GebrConfig {
    pub comm: CommConfig,
    pub cli: CliConfig,
    pub daemon: DaemonConfig,
}

impl GebrConfig {
    /// Load from `path`, falling back to defaults when the file is missing
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match load_config(path) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = GebrConfig::load_or_default(&dir.path().join("none.toml")).unwrap();
        assert_eq!(config.comm.port_prefix, "GEBR_PORT=");
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = GebrConfig::default();
        config.cli.connect_timeout = Duration::from_secs(5);
        config.comm.ssh_program = "/usr/local/bin/ssh".to_string();
        save_config(&path, &config).unwrap();

        let loaded: GebrConfig = load_config(&path).unwrap();
        assert_eq!(loaded.cli.connect_timeout, Duration::from_secs(5));
        assert_eq!(loaded.comm.ssh_program, "/usr/local/bin/ssh");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[daemon]\njob_shell = \"/bin/bash\"\n").unwrap();

        let loaded: GebrConfig = load_config(&path).unwrap();
        assert_eq!(loaded.daemon.job_shell, "/bin/bash");
        assert_eq!(loaded.comm.xauth_program, "xauth");
    }

    #[test]
    fn test_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[comm\n").unwrap();
        assert!(matches!(
            load_config::<GebrConfig>(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}

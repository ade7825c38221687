//! Core error types for GeBR communication

use gebr_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type
#[derive(Error, Debug)]
pub enum GebrError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Communication error
    #[error("Communication error: {0}")]
    Comm(#[from] CommError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while launching processes or talking to a server
#[derive(Error, Debug)]
pub enum CommError {
    /// A subprocess could not be started
    #[error("Failed to start process: {0}")]
    SpawnFailed(String),

    /// The subprocess is gone and no longer accepts input
    #[error("Process is not running")]
    ProcessGone,

    /// Operation requires the server to be connected
    #[error("Machine '{0}' is not connected")]
    NotConnected(String),

    /// A port negotiation ended without a port
    #[error("Port negotiation failed: {0}")]
    PortNegotiation(String),

    /// `DISPLAY` is missing or malformed
    #[error("No usable X11 display")]
    NoDisplay,

    /// No key pair available to install
    #[error("No public key found at {0}")]
    NoPublicKey(PathBuf),

    /// The server actor has shut down
    #[error("Server handle closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

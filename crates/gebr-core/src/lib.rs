//! gebr-core: Core abstractions and configuration for GeBR communication
//!
//! This crate provides the shared types, error taxonomy, traits and
//! configuration structures used by the communication layer, the daemon
//! and the CLI.

pub mod config;
pub mod error;
pub mod lockfile;
pub mod time;
pub mod traits;
pub mod types;

pub use error::{CommError, ConfigError, GebrError};
pub use types::{MessageLevel, PortType, ServerErrorKind, ServerRole, ServerState};

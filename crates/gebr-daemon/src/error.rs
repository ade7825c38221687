//! Daemon error types

use gebr_protocol::{MessageCode, ProtocolError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    /// A queue command with the wrong arguments
    #[error("Invalid {code} command: {reason}")]
    InvalidCommand { code: MessageCode, reason: String },

    /// The scheduler loop has stopped
    #[error("Scheduler is not running")]
    SchedulerGone,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

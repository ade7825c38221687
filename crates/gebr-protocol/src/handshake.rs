//! Control channel handshake
//!
//! The client sends an `INI` legacy message as soon as the socket connects.
//! Its argument list depends on which role the peer plays.

use crate::error::ProtocolError;
use crate::legacy::{LegacyMessage, MessageCode};

/// Protocol version announced in every handshake
pub const PROTOCOL_VERSION: &str = "0.4.0";

/// Handshake payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// Sent to an orchestrator (maestro)
    Orchestrator {
        version: String,
        /// X11 magic cookie, empty when there is no display
        cookie: String,
        client_id: String,
        /// ISO-8601 timestamp
        timestamp: String,
    },
    /// Sent to a worker (daemon)
    Worker { version: String, hostname: String },
}

impl Handshake {
    /// Orchestrator handshake using the current protocol version
    pub fn orchestrator(
        cookie: impl Into<String>,
        client_id: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Handshake::Orchestrator {
            version: PROTOCOL_VERSION.to_string(),
            cookie: cookie.into(),
            client_id: client_id.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Worker handshake using the current protocol version
    pub fn worker(hostname: impl Into<String>) -> Self {
        Handshake::Worker {
            version: PROTOCOL_VERSION.to_string(),
            hostname: hostname.into(),
        }
    }

    pub fn version(&self) -> &str {
        match self {
            Handshake::Orchestrator { version, .. } | Handshake::Worker { version, .. } => version,
        }
    }

    /// Build the `INI` message
    pub fn to_message(&self) -> LegacyMessage {
        match self {
            Handshake::Orchestrator {
                version,
                cookie,
                client_id,
                timestamp,
            } => LegacyMessage::new(
                MessageCode::INI,
                [
                    version.as_str(),
                    cookie.as_str(),
                    client_id.as_str(),
                    timestamp.as_str(),
                ],
            ),
            Handshake::Worker { version, hostname } => {
                LegacyMessage::new(MessageCode::INI, [version.as_str(), hostname.as_str()])
            }
        }
    }

    /// Interpret an `INI` message by its argument count
    pub fn from_message(msg: &LegacyMessage) -> Result<Self, ProtocolError> {
        if msg.code != MessageCode::INI {
            return Err(ProtocolError::InvalidCode(msg.code.to_string()));
        }
        match msg.args.as_slice() {
            [version, cookie, client_id, timestamp] => Ok(Handshake::Orchestrator {
                version: version.clone(),
                cookie: cookie.clone(),
                client_id: client_id.clone(),
                timestamp: timestamp.clone(),
            }),
            [version, hostname] => Ok(Handshake::Worker {
                version: version.clone(),
                hostname: hostname.clone(),
            }),
            _ => Err(ProtocolError::InvalidArguments { offset: 0 }),
        }
    }
}

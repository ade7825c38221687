//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which kind of server a connection talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    /// Coordinating server (maestro)
    Orchestrator,
    /// Job executing server (daemon)
    Worker,
}

impl ServerRole {
    /// Name of the server binary, also used in the lock-file path
    pub fn binary_name(&self) -> &'static str {
        match self {
            ServerRole::Orchestrator => "gebrm",
            ServerRole::Worker => "gebrd",
        }
    }

    /// Port type used to reach the control channel
    pub fn port_type(&self) -> PortType {
        match self {
            ServerRole::Orchestrator => PortType::Orchestrator,
            ServerRole::Worker => PortType::Worker,
        }
    }
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerRole::Orchestrator => write!(f, "orchestrator"),
            ServerRole::Worker => write!(f, "worker"),
        }
    }
}

impl FromStr for ServerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orchestrator" | "maestro" | "gebrm" => Ok(ServerRole::Orchestrator),
            "worker" | "daemon" | "gebrd" => Ok(ServerRole::Worker),
            other => Err(format!("unknown server role: {}", other)),
        }
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// Never used yet
    Unknown,
    Disconnected,
    /// Launching the server or running ssh
    Run,
    /// Opening the ssh tunnel to the server's port
    OpenTunnel,
    /// Socket open, handshake not yet acknowledged
    Connect,
    /// Handshake acknowledged
    Logged,
}

impl ServerState {
    pub const ALL: [ServerState; 6] = [
        ServerState::Unknown,
        ServerState::Disconnected,
        ServerState::Run,
        ServerState::OpenTunnel,
        ServerState::Connect,
        ServerState::Logged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Unknown => "unknown",
            ServerState::Disconnected => "disconnected",
            ServerState::Run => "run",
            ServerState::OpenTunnel => "open_tunnel",
            ServerState::Connect => "connect",
            ServerState::Logged => "logged",
        }
    }

    /// Parse a state name. Unrecognized names map to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == name)
            .unwrap_or(ServerState::Unknown)
    }

    /// Whether the control socket is open
    pub fn is_connected(&self) -> bool {
        matches!(self, ServerState::Connect | ServerState::Logged)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of the last connection failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerErrorKind {
    None,
    /// Default before the first connection attempt
    Unknown,
    /// Subprocess, authentication or host key failure
    Ssh,
    /// Port negotiation ended without a port
    Port,
}

impl fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerErrorKind::None => write!(f, "none"),
            ServerErrorKind::Unknown => write!(f, "unknown"),
            ServerErrorKind::Ssh => write!(f, "ssh"),
            ServerErrorKind::Port => write!(f, "port"),
        }
    }
}

/// Logical target of a port negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    Orchestrator,
    Worker,
    X11,
}

/// Severity of a message shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_roundtrip() {
        for state in ServerState::ALL {
            assert_eq!(ServerState::from_name(state.as_str()), state);
        }
        assert_eq!(ServerState::OpenTunnel.to_string(), "open_tunnel");
    }

    #[test]
    fn test_unrecognized_state_is_unknown() {
        assert_eq!(ServerState::from_name("bogus"), ServerState::Unknown);
    }

    #[test]
    fn test_role_binary() {
        assert_eq!(ServerRole::Orchestrator.binary_name(), "gebrm");
        assert_eq!(ServerRole::Worker.binary_name(), "gebrd");
        assert_eq!("daemon".parse::<ServerRole>().unwrap(), ServerRole::Worker);
        assert_eq!(ServerRole::Worker.port_type(), PortType::Worker);
    }

    #[test]
    fn test_connected_states() {
        assert!(ServerState::Connect.is_connected());
        assert!(ServerState::Logged.is_connected());
        assert!(!ServerState::OpenTunnel.is_connected());
    }
}

//! Connection state and its transitions

use gebr_core::types::{ServerErrorKind, ServerState};

/// Snapshot of a server's connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    pub state: ServerState,
    /// Kind of the last failure
    pub error: ServerErrorKind,
    /// Message of the last failure, empty when there was none
    pub last_error: String,
    /// Whether the handshake was acknowledged
    pub logged: bool,
    /// Negotiated loopback port, 0 when there is none
    pub port: u16,
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self {
            state: ServerState::Unknown,
            error: ServerErrorKind::Unknown,
            last_error: String::new(),
            logged: false,
            port: 0,
        }
    }
}

/// Whether `from -> to` is a legal transition
pub fn can_transition(from: ServerState, to: ServerState) -> bool {
    use ServerState::*;

    matches!(
        (from, to),
        (_, Disconnected)
            | (Disconnected, Run)
            | (Run, OpenTunnel)
            | (Run, Connect)
            | (OpenTunnel, Connect)
            | (Connect, Logged)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ServerState::*;

    #[test]
    fn test_disconnected_reachable_from_everywhere() {
        for state in ServerState::ALL {
            assert!(can_transition(state, Disconnected), "{} -> disconnected", state);
        }
    }

    #[test]
    fn test_logged_only_after_connect() {
        for state in ServerState::ALL {
            assert_eq!(can_transition(state, Logged), state == Connect);
        }
    }

    #[test]
    fn test_forward_path() {
        assert!(can_transition(Disconnected, Run));
        assert!(can_transition(Run, OpenTunnel));
        assert!(can_transition(OpenTunnel, Connect));
        assert!(can_transition(Run, Connect));

        assert!(!can_transition(Unknown, Run));
        assert!(!can_transition(Logged, Run));
        assert!(!can_transition(OpenTunnel, Run));
    }
}

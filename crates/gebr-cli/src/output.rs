//! Terminal output helpers

use gebr_comm::ServerStatus;
use gebr_core::types::{MessageLevel, ServerErrorKind};

/// One-line summary of a server's status
pub fn format_status(address: &str, status: &ServerStatus) -> String {
    let mut line = format!("{}: {}", address, status.state);
    if status.port != 0 {
        line.push_str(&format!(" (port {})", status.port));
    }
    if status.error != ServerErrorKind::None && !status.last_error.is_empty() {
        line.push_str(&format!(" - {}", status.last_error));
    }
    line
}

/// Print a message reported by a server at its level
pub fn print_server_message(address: &str, level: MessageLevel, text: &str) {
    let msg = format!("{}: {}", address, text);
    match level {
        MessageLevel::Debug => tracing::debug!("{}", msg),
        MessageLevel::Info => print_info(&msg),
        MessageLevel::Warning => print_warning(&msg),
        MessageLevel::Error => print_error(&msg),
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use gebr_core::types::ServerState;

    #[test]
    fn test_format_logged() {
        let status = ServerStatus {
            state: ServerState::Logged,
            error: ServerErrorKind::None,
            last_error: String::new(),
            logged: true,
            port: 40123,
        };
        assert_eq!(format_status("node1", &status), "node1: logged (port 40123)");
    }

    #[test]
    fn test_format_failure() {
        let status = ServerStatus {
            state: ServerState::Disconnected,
            error: ServerErrorKind::Ssh,
            last_error: "SSH host key rejected.".into(),
            logged: false,
            port: 0,
        };
        assert_eq!(
            format_status("node1", &status),
            "node1: disconnected - SSH host key rejected."
        );
    }
}

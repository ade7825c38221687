//! CLI command implementations

mod append_key;
mod config;
mod connect;
mod kill;
mod queue;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use gebr_comm::{spawn_auth_adapter, Server, ServerEvent, ServerOptions};
use gebr_core::config::CommConfig;
use gebr_core::types::ServerRole;

use crate::output::{print_info, print_server_message};
use crate::prompt::TerminalAuthenticator;

pub use append_key::append_key_command;
pub use config::{config_get, config_init, config_set, config_show, lookup, parse_value};
pub use connect::{connect_command, ConnectOptions};
pub use kill::kill_command;
pub use queue::queue_command;

/// A server plus the tasks reporting on it for the duration of a command
pub struct Session {
    pub server: Server,
    printer: JoinHandle<()>,
    adapter: Option<JoinHandle<()>>,
}

impl Session {
    /// Start a server for `host`. With `interactive`, prompts are answered
    /// from the terminal; otherwise they fail the attempt.
    pub fn open(host: &str, role: ServerRole, comm: CommConfig, interactive: bool, use_public_key: bool) -> Self {
        let options = ServerOptions {
            interactive,
            use_public_key,
            comm,
            ..Default::default()
        };
        let server = Server::spawn(host, role, options);
        let printer = spawn_printer(&server);
        let adapter = interactive.then(|| spawn_auth_adapter(&server, Arc::new(TerminalAuthenticator)));

        Self {
            server,
            printer,
            adapter,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.printer.abort();
        if let Some(adapter) = &self.adapter {
            adapter.abort();
        }
    }
}

fn spawn_printer(server: &Server) -> JoinHandle<()> {
    let mut events = server.subscribe();
    let address = server.address().to_string();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ServerEvent::Message { level, text }) => print_server_message(&address, level, &text),
                Ok(ServerEvent::StateChanged { old, new }) => {
                    tracing::debug!("{}: {} -> {}", address, old, new);
                }
                Ok(ServerEvent::X11Forwarded { display, port }) => {
                    print_info(&format!("{}: display :{} forwarded to port {}", address, display, port));
                }
                Ok(ServerEvent::X11Closed) => print_info(&format!("{}: X11 forward closed", address)),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("{}: skipped {} events", address, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

//! Ask-and-return authentication on top of server events

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::{Server, ServerEvent};

/// Answers prompts as they come, e.g. from a terminal
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// The password, or `None` to give up
    async fn ask_password(&self, title: &str, description: &str) -> Option<String>;

    async fn ask_question(&self, title: &str, question: &str) -> bool;
}

/// Switch `server` to interactive mode and answer its prompts with `auth`.
///
/// The task ends once the server shuts down. It does not keep the server
/// alive.
pub fn spawn_auth_adapter(server: &Server, auth: Arc<dyn Authenticator>) -> JoinHandle<()> {
    let mut events = server.subscribe();
    let mut status = server.watch_status();
    let weak = server.downgrade();

    // Prompts raised before we subscribed are emitted again
    let _ = server.set_interactive(true);
    let _ = server.emit_interactive_state();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                event = events.recv() => event,
            };

            match event {
                Ok(ServerEvent::PasswordRequest {
                    title, description, ..
                }) => {
                    let password = auth.ask_password(&title, &description).await;
                    let Some(server) = weak.upgrade() else { break };
                    let _ = match password {
                        Some(password) => server.set_password(password),
                        None => server.reject_password(),
                    };
                }
                Ok(ServerEvent::QuestionRequest { title, description }) => {
                    let answer = auth.ask_question(&title, &description).await;
                    let Some(server) = weak.upgrade() else { break };
                    let _ = server.answer_question(answer);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Authenticator missed {} server events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

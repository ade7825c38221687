//! Connection to one GeBR server
//!
//! A [`Server`] is a cheap, cloneable handle to an actor task that owns the
//! connection: its state, credentials, port negotiations, socket and helper
//! processes. Commands are fire-and-forget; progress is observed through
//! [`Server::subscribe`] and [`Server::status`].
//!
//! Failures never come back as errors from [`Server::connect`]. They move
//! the server to `Disconnected` and are queryable via
//! [`Server::last_error`].

mod actor;
mod adapter;
mod auth;
mod handler;
mod state;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use gebr_core::config::CommConfig;
use gebr_core::error::CommError;
use gebr_core::lockfile::local_hostname;
use gebr_core::traits::{HostShell, MemoryQuestionCache, ProcessLauncher, QuestionCache};
use gebr_core::types::{MessageLevel, ServerErrorKind, ServerRole, ServerState};
use gebr_protocol::Frame;

use crate::process::PtyLauncher;

pub use adapter::{spawn_auth_adapter, Authenticator};
pub use auth::{HOST_KEY_REJECTED, NO_PASSWORD, PASSWORD_TITLE, QUESTION_TITLE};
pub use handler::{HandlerContext, LoginHandler, MessageHandler};
pub use state::{can_transition, ServerStatus};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications from a server
#[derive(Debug, Clone)]
pub enum ServerEvent {
    StateChanged {
        old: ServerState,
        new: ServerState,
    },
    /// A password is needed; answer with [`Server::set_password`] or
    /// [`Server::reject_password`]
    PasswordRequest {
        title: String,
        description: String,
        retry: bool,
    },
    /// A yes/no question; answer with [`Server::answer_question`]
    QuestionRequest { title: String, description: String },
    Message { level: MessageLevel, text: String },
    X11Forwarded { display: u16, port: u16 },
    X11Closed,
    KeyAppended { success: bool },
    KillFinished { success: bool },
    /// A frame the message handler passed on
    Received(Frame),
}

/// Behaviour switches of a server
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Report prompts as events instead of failing on them
    pub interactive: bool,
    /// Install the gebr public key on the host after login
    pub use_public_key: bool,
    /// Local X display, used for the handshake cookie and X11 forwards
    pub display: Option<String>,
    pub comm: CommConfig,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            interactive: false,
            use_public_key: false,
            display: std::env::var("DISPLAY").ok().filter(|d| !d.is_empty()),
            comm: CommConfig::default(),
        }
    }
}

/// Collaborators of a server, replaceable in tests
#[derive(Clone)]
pub struct ServerDeps {
    pub launcher: Arc<dyn ProcessLauncher>,
    pub questions: Arc<dyn QuestionCache>,
    pub handler: Arc<dyn MessageHandler>,
    /// Shell used by [`Server::kill`]; derived from the address when unset
    pub host_shell: Option<Arc<dyn HostShell>>,
}

impl Default for ServerDeps {
    fn default() -> Self {
        Self {
            launcher: Arc::new(PtyLauncher::new()),
            questions: Arc::new(MemoryQuestionCache::new()),
            handler: Arc::new(LoginHandler),
            host_shell: None,
        }
    }
}

pub(crate) enum Command {
    Connect,
    Disconnect,
    Kill,
    ForwardX11 {
        display: u16,
        reply: oneshot::Sender<Result<u16, CommError>>,
    },
    CloseX11,
    AppendKey {
        reply: oneshot::Sender<Result<bool, CommError>>,
    },
    ForwardRemote {
        remote: u16,
        local: u16,
        reply: oneshot::Sender<Result<(), CommError>>,
    },
    ForwardLocal {
        remote: u16,
        local: u16,
        addr: String,
        reply: oneshot::Sender<Result<(), CommError>>,
    },
    SetPassword(String),
    RejectPassword,
    AnswerQuestion(bool),
    SetInteractive(bool),
    SetUsePublicKey(bool),
    SetLogged,
    EmitInteractiveState,
    Send(Frame),
}

/// Handle to a server connection
#[derive(Clone)]
pub struct Server {
    address: Arc<str>,
    role: ServerRole,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ServerStatus>,
    events: broadcast::Sender<ServerEvent>,
}

/// Handle that does not keep the server alive
#[derive(Clone)]
pub struct WeakServer {
    address: Arc<str>,
    role: ServerRole,
    commands: mpsc::WeakUnboundedSender<Command>,
    status: watch::Receiver<ServerStatus>,
    events: broadcast::Sender<ServerEvent>,
}

impl WeakServer {
    pub fn upgrade(&self) -> Option<Server> {
        Some(Server {
            address: self.address.clone(),
            role: self.role,
            commands: self.commands.upgrade()?,
            status: self.status.clone(),
            events: self.events.clone(),
        })
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.address)
            .field("role", &self.role)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

/// Rewrite loopback aliases to this host's name
pub fn normalize_address(address: &str) -> String {
    match address {
        "127.0.0.1" | "localhost" => local_hostname(),
        other => other.to_string(),
    }
}

/// Whether `address` designates this machine
pub fn is_local_address(address: &str) -> bool {
    matches!(address, "127.0.0.1" | "localhost" | "::1") || address == local_hostname()
}

impl Server {
    /// Start a server actor with default collaborators. Must be called
    /// within a tokio runtime.
    pub fn spawn(address: &str, role: ServerRole, options: ServerOptions) -> Self {
        Self::spawn_with(address, role, options, ServerDeps::default())
    }

    pub fn spawn_with(
        address: &str,
        role: ServerRole,
        options: ServerOptions,
        deps: ServerDeps,
    ) -> Self {
        let address: Arc<str> = normalize_address(address).into();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ServerStatus::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let actor = actor::ServerActor::new(
            address.to_string(),
            role,
            options,
            deps,
            status_tx,
            events.clone(),
        );
        tokio::spawn(actor.run(commands_rx));

        Self {
            address,
            role,
            commands,
            status,
            events,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn role(&self) -> ServerRole {
        self.role
    }

    pub fn is_local(&self) -> bool {
        is_local_address(&self.address)
    }

    pub fn status(&self) -> ServerStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ServerState {
        self.status.borrow().state
    }

    /// Kind and message of the last failure
    pub fn last_error(&self) -> (ServerErrorKind, String) {
        let status = self.status.borrow();
        (status.error, status.last_error.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Receiver following every status change
    pub fn watch_status(&self) -> watch::Receiver<ServerStatus> {
        self.status.clone()
    }

    pub fn downgrade(&self) -> WeakServer {
        WeakServer {
            address: self.address.clone(),
            role: self.role,
            commands: self.commands.downgrade(),
            status: self.status.clone(),
            events: self.events.clone(),
        }
    }

    /// Wait until the server is in one of `states`
    pub async fn wait_for_state(&self, states: &[ServerState]) -> Result<ServerState, CommError> {
        let mut status = self.status.clone();
        let found = status
            .wait_for(|s| states.contains(&s.state))
            .await
            .map_err(|_| CommError::Closed)?;
        Ok(found.state)
    }

    fn command(&self, command: Command) -> Result<(), CommError> {
        self.commands.send(command).map_err(|_| CommError::Closed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, CommError>>) -> Command,
    ) -> Result<T, CommError> {
        let (tx, rx) = oneshot::channel();
        self.command(build(tx))?;
        rx.await.map_err(|_| CommError::Closed)?
    }

    /// Start connecting; a no-op while a connection is up or in progress
    pub fn connect(&self) -> Result<(), CommError> {
        self.command(Command::Connect)
    }

    /// Tear down the connection and every process started for it
    pub fn disconnect(&self) -> Result<(), CommError> {
        self.command(Command::Disconnect)
    }

    /// Terminate the server's process group on its host. The state changes
    /// once the socket notices.
    pub fn kill(&self) -> Result<(), CommError> {
        self.command(Command::Kill)
    }

    /// Forward remote display `:display` to the local X server. Returns the
    /// local port of the bridge.
    pub async fn forward_x11(&self, display: u16) -> Result<u16, CommError> {
        self.request(|reply| Command::ForwardX11 { display, reply })
            .await
    }

    pub fn close_x11_forward(&self) -> Result<(), CommError> {
        self.command(Command::CloseX11)
    }

    /// Install the local public key on the host. Resolves once the remote
    /// command ended, with whether it succeeded.
    pub async fn append_key(&self) -> Result<bool, CommError> {
        self.request(|reply| Command::AppendKey { reply }).await
    }

    /// `ssh -R <remote>:127.0.0.1:<local>`
    pub async fn forward_remote_port(&self, remote: u16, local: u16) -> Result<(), CommError> {
        self.request(|reply| Command::ForwardRemote {
            remote,
            local,
            reply,
        })
        .await
    }

    /// `ssh -L <local>:<addr>:<remote>`
    pub async fn forward_local_port(
        &self,
        remote: u16,
        local: u16,
        addr: &str,
    ) -> Result<(), CommError> {
        let addr = addr.to_string();
        self.request(|reply| Command::ForwardLocal {
            remote,
            local,
            addr,
            reply,
        })
        .await
    }

    pub fn set_password(&self, password: impl Into<String>) -> Result<(), CommError> {
        self.command(Command::SetPassword(password.into()))
    }

    /// Give up on the pending password request
    pub fn reject_password(&self) -> Result<(), CommError> {
        self.command(Command::RejectPassword)
    }

    pub fn answer_question(&self, answer: bool) -> Result<(), CommError> {
        self.command(Command::AnswerQuestion(answer))
    }

    pub fn set_interactive(&self, interactive: bool) -> Result<(), CommError> {
        self.command(Command::SetInteractive(interactive))
    }

    pub fn set_use_public_key(&self, use_public_key: bool) -> Result<(), CommError> {
        self.command(Command::SetUsePublicKey(use_public_key))
    }

    /// Mark the handshake as acknowledged; only valid in `Connect`
    pub fn set_logged(&self) -> Result<(), CommError> {
        self.command(Command::SetLogged)
    }

    /// Emit the pending password or question request again
    pub fn emit_interactive_state(&self) -> Result<(), CommError> {
        self.command(Command::EmitInteractiveState)
    }

    /// Send a frame once logged in. Frames sent while connecting are queued;
    /// frames sent while disconnected are dropped.
    pub fn send(&self, frame: impl Into<Frame>) -> Result<(), CommError> {
        self.command(Command::Send(frame.into()))
    }
}

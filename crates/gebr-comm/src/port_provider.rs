//! Port negotiation
//!
//! A [`PortProvider`] turns a logical target (an orchestrator, a worker or
//! an X11 display) into a port on the loopback interface:
//!
//! - local servers are launched directly and report their own port;
//! - remote servers are launched through ssh, then an `ssh -L` tunnel maps
//!   a free local port onto the remote one;
//! - an X11 display is reached through `ssh -R`, exposing a free local port
//!   as the remote display.
//!
//! Prompts from the ssh processes are handed to the owner together with a
//! handle for writing the answer. Every negotiation ends with exactly one
//! of [`PortEvent::Defined`] or [`PortEvent::Failed`].

use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use gebr_core::config::CommConfig;
use gebr_core::traits::{CommandLine, ProcessControl, ProcessLauncher};
use gebr_core::types::{PortType, ServerErrorKind};

use crate::ssh::{SessionEvent, SshCommand, SshParser, SshSession};

/// Host name that designates this machine to a provider
pub const LOOPBACK: &str = "127.0.0.1";

/// First TCP port of X11 displays
pub const X11_BASE_PORT: u16 = 6000;

/// What to negotiate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRequest {
    /// Target host, [`LOOPBACK`] for this machine
    pub host: String,
    pub port_type: PortType,
    /// Remote display number, X11 only
    pub display: Option<u16>,
}

impl PortRequest {
    pub fn new(host: impl Into<String>, port_type: PortType) -> Self {
        Self {
            host: host.into(),
            port_type,
            display: None,
        }
    }

    pub fn with_display(mut self, display: u16) -> Self {
        self.display = Some(display);
        self
    }

    pub fn is_local(&self) -> bool {
        self.host == LOOPBACK
    }
}

/// Progress of a negotiation
#[derive(Debug, Clone)]
pub enum PortEvent {
    /// An ssh process asks for a password; answer through `reply`
    Password {
        prompt: String,
        retry: bool,
        reply: ProcessControl,
    },
    /// An ssh process asks a yes/no question; answer through `reply`
    Question {
        question: String,
        reply: ProcessControl,
    },
    Warning(String),
    /// The remote port is known and the tunnel is being opened
    Tunneling { remote_port: u16 },
    /// A loopback port is ready
    Defined(u16),
    Failed {
        kind: ServerErrorKind,
        message: String,
    },
}

/// Keeps a negotiation and its processes alive; dropping it tears them down
#[derive(Debug)]
pub struct PortProviderHandle {
    cancel: CancellationToken,
}

impl PortProviderHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PortProviderHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Negotiates one port
pub struct PortProvider {
    request: PortRequest,
    launcher: Arc<dyn ProcessLauncher>,
    ssh: SshCommand,
    parser: Arc<SshParser>,
    binary: Option<String>,
    probe_interval: Duration,
}

type Emit = Box<dyn Fn(PortEvent) -> bool + Send + Sync>;

/// Failure of a negotiation step
struct Failure {
    kind: ServerErrorKind,
    message: String,
}

impl Failure {
    fn ssh(message: impl Into<String>) -> Self {
        Self {
            kind: ServerErrorKind::Ssh,
            message: message.into(),
        }
    }

    fn port(message: impl Into<String>) -> Self {
        Self {
            kind: ServerErrorKind::Port,
            message: message.into(),
        }
    }
}

impl PortProvider {
    pub fn new(
        request: PortRequest,
        launcher: Arc<dyn ProcessLauncher>,
        config: &CommConfig,
    ) -> Self {
        let binary = match request.port_type {
            PortType::Orchestrator => Some(config.orchestrator_binary.clone()),
            PortType::Worker => Some(config.worker_binary.clone()),
            PortType::X11 => None,
        };
        Self {
            request,
            launcher,
            ssh: SshCommand::from_config(config),
            parser: Arc::new(SshParser::new(config.port_prefix.clone())),
            binary,
            probe_interval: config.tunnel_probe_interval,
        }
    }

    /// Replace the ssh command builder
    pub fn with_ssh(mut self, ssh: SshCommand) -> Self {
        self.ssh = ssh;
        self
    }

    /// Start negotiating. Events are passed to `emit` until it returns
    /// false or the returned handle is dropped.
    pub fn start<F>(self, emit: F) -> PortProviderHandle
    where
        F: Fn(PortEvent) -> bool + Send + Sync + 'static,
    {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let emit: Emit = Box::new(emit);

        tokio::spawn(async move {
            let mut sessions = Vec::new();
            let outcome = tokio::select! {
                _ = task_cancel.cancelled() => None,
                result = self.negotiate(&emit, &mut sessions) => Some(result),
            };

            match outcome {
                None => {
                    for session in &sessions {
                        session.kill();
                    }
                    return;
                }
                Some(Err(failure)) => {
                    for session in &sessions {
                        session.kill();
                    }
                    emit(PortEvent::Failed {
                        kind: failure.kind,
                        message: failure.message,
                    });
                    return;
                }
                Some(Ok(port)) => {
                    if !emit(PortEvent::Defined(port)) {
                        for session in &sessions {
                            session.kill();
                        }
                        return;
                    }
                }
            }

            // Forwarding processes stay up until the owner lets go
            supervise(&mut sessions, &emit, &task_cancel).await;
            for session in &sessions {
                session.kill();
            }
        });

        PortProviderHandle { cancel }
    }

    async fn negotiate(&self, emit: &Emit, sessions: &mut Vec<SshSession>) -> Result<u16, Failure> {
        match (self.request.port_type, self.request.is_local()) {
            (PortType::X11, true) => Err(Failure::port(
                "X11 forwarding needs a remote machine",
            )),
            (PortType::X11, false) => self.forward_x11(sessions),
            (_, true) => {
                let cmd = CommandLine::new(self.binary_name());
                self.launch(cmd, emit, sessions).await
            }
            (_, false) => {
                let cmd = self.ssh.run(&self.request.host, self.binary_name());
                let remote_port = self.launch(cmd, emit, sessions).await?;
                emit(PortEvent::Tunneling { remote_port });
                self.open_tunnel(remote_port, emit, sessions).await
            }
        }
    }

    fn binary_name(&self) -> &str {
        self.binary.as_deref().unwrap_or_default()
    }

    fn spawn(&self, cmd: &CommandLine) -> Result<SshSession, Failure> {
        let process = self
            .launcher
            .spawn(cmd)
            .map_err(|e| Failure::ssh(e.to_string()))?;
        Ok(SshSession::new(process, self.parser.clone()))
    }

    /// Run a server (directly or through ssh) until it prints its port
    async fn launch(
        &self,
        cmd: CommandLine,
        emit: &Emit,
        sessions: &mut Vec<SshSession>,
    ) -> Result<u16, Failure> {
        tracing::debug!("{}: launching {}", self.request.host, cmd);
        sessions.push(self.spawn(&cmd)?);
        let index = sessions.len() - 1;

        loop {
            let Some(event) = sessions[index].next().await else {
                return Err(Failure::port(format!("{} ended without a port", cmd.program)));
            };
            let reply = sessions[index].control();
            match event {
                SessionEvent::Port(port) => return Ok(port),
                SessionEvent::Exited(code) => {
                    return Err(Failure::port(format!(
                        "'{}' exited (status {:?}) without reporting a port",
                        cmd, code
                    )))
                }
                other => forward(other, reply, emit)?,
            }
        }
    }

    /// Open `ssh -L` and wait until the local end accepts connections
    async fn open_tunnel(
        &self,
        remote_port: u16,
        emit: &Emit,
        sessions: &mut Vec<SshSession>,
    ) -> Result<u16, Failure> {
        let local_port = free_local_port().map_err(|e| Failure::port(e.to_string()))?;
        let cmd = self
            .ssh
            .local_forward(&self.request.host, local_port, LOOPBACK, remote_port);
        tracing::debug!("{}: opening tunnel {}", self.request.host, cmd);
        sessions.push(self.spawn(&cmd)?);
        let index = sessions.len() - 1;

        let mut probe = tokio::time::interval(self.probe_interval);
        loop {
            tokio::select! {
                event = sessions[index].next() => {
                    let reply = sessions[index].control();
                    match event {
                        Some(SessionEvent::Exited(_)) | None => {
                            return Err(Failure::port(format!(
                                "Tunnel to {} closed before it was ready",
                                self.request.host
                            )))
                        }
                        Some(other) => forward(other, reply, emit)?,
                    }
                }
                _ = probe.tick() => {
                    if TcpStream::connect(SocketAddr::from((Ipv4Addr::LOCALHOST, local_port)))
                        .await
                        .is_ok()
                    {
                        return Ok(local_port);
                    }
                }
            }
        }
    }

    /// Expose a free local port as the remote display
    fn forward_x11(&self, sessions: &mut Vec<SshSession>) -> Result<u16, Failure> {
        let display = self
            .request
            .display
            .ok_or_else(|| Failure::port("No display number given"))?;
        let remote_port = X11_BASE_PORT
            .checked_add(display)
            .ok_or_else(|| Failure::port(format!("Invalid display :{}", display)))?;
        let local_port = free_local_port().map_err(|e| Failure::port(e.to_string()))?;

        let cmd = self
            .ssh
            .remote_forward(&self.request.host, remote_port, LOOPBACK, local_port);
        tracing::debug!("{}: forwarding X11 {}", self.request.host, cmd);
        sessions.push(self.spawn(&cmd)?);
        Ok(local_port)
    }
}

/// Pass a prompt or message on to the owner
fn forward(event: SessionEvent, reply: ProcessControl, emit: &Emit) -> Result<(), Failure> {
    match event {
        SessionEvent::Password { prompt, retry } => {
            emit(PortEvent::Password {
                prompt,
                retry,
                reply,
            });
        }
        SessionEvent::Question(question) => {
            emit(PortEvent::Question { question, reply });
        }
        SessionEvent::Warning(text) => {
            emit(PortEvent::Warning(text));
        }
        SessionEvent::Fatal(message) => return Err(Failure::ssh(message)),
        SessionEvent::Output(text) => tracing::debug!("ssh: {}", text.trim_end()),
        SessionEvent::Port(_) | SessionEvent::Exited(_) => {}
    }
    Ok(())
}

/// Keep forwarding prompts of long running processes until cancelled
async fn supervise(sessions: &mut [SshSession], emit: &Emit, cancel: &CancellationToken) {
    let Some(last) = sessions.last_mut() else {
        return;
    };
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            event = last.next() => {
                let reply = last.control();
                match event {
                    None => {
                        // Process gone; wait for the owner to let go
                        cancel.cancelled().await;
                        return;
                    }
                    Some(SessionEvent::Exited(code)) => {
                        tracing::debug!("Forwarding process exited with {:?}", code);
                    }
                    Some(SessionEvent::Fatal(message)) => {
                        emit(PortEvent::Warning(message));
                    }
                    Some(other) => {
                        let _ = forward(other, reply, emit);
                    }
                }
            }
        }
    }
}

/// Ask the OS for a currently free loopback port
pub fn free_local_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

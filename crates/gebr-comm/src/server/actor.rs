//! The task owning a server connection

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use gebr_core::error::CommError;
use gebr_core::lockfile::{local_hostname, shell_lock_path};
use gebr_core::time::iso8601_now;
use gebr_core::traits::{CommandLine, HostShell, ProcessControl};
use gebr_core::types::{MessageLevel, PortType, ServerErrorKind, ServerRole, ServerState};
use gebr_protocol::{Frame, Handshake, LegacyMessage};

use super::auth::{
    answer_text, authentication_failed, password_description, Credentials, Origin,
    PasswordAction, PendingRequest, QuestionAction, HOST_KEY_REJECTED, NO_PASSWORD,
    PASSWORD_TITLE, QUESTION_TITLE,
};
use super::handler::HandlerContext;
use super::state::{can_transition, ServerStatus};
use super::{Command, ServerDeps, ServerEvent, ServerOptions};
use crate::host::{LocalShell, SshShell};
use crate::port_provider::{PortEvent, PortProvider, PortProviderHandle, PortRequest, LOOPBACK};
use crate::socket::{ProtocolSocket, SocketEvent};
use crate::ssh::{SessionEvent, SshCommand, SshParser, SshSession};
use crate::x11::{x11_unix_socket, xauth_cookie, X11Bridge};

/// Everything reported to the actor by the tasks it started
pub(crate) enum Input {
    Provider {
        ticket: u64,
        event: PortEvent,
    },
    Connected {
        ticket: u64,
        socket: ProtocolSocket,
    },
    ConnectFailed {
        ticket: u64,
        error: String,
    },
    Socket {
        ticket: u64,
        event: SocketEvent,
    },
    Handshake {
        ticket: u64,
        message: LegacyMessage,
    },
    X11Ready {
        ticket: u64,
        result: Result<X11Bridge, CommError>,
    },
    Aux {
        id: u64,
        event: SessionEvent,
    },
}

struct Negotiation {
    ticket: u64,
    _handle: PortProviderHandle,
}

struct X11Forward {
    ticket: u64,
    display: u16,
    _handle: PortProviderHandle,
    bridge: Option<X11Bridge>,
    reply: Option<oneshot::Sender<Result<u16, CommError>>>,
}

enum AuxKind {
    Kill,
    AppendKey(Option<oneshot::Sender<Result<bool, CommError>>>),
    Forward,
}

struct AuxProcess {
    control: ProcessControl,
    kind: AuxKind,
}

pub(crate) struct ServerActor {
    address: String,
    role: ServerRole,
    options: ServerOptions,
    deps: ServerDeps,
    ssh: SshCommand,
    parser: Arc<SshParser>,
    client_id: String,
    status: watch::Sender<ServerStatus>,
    events: broadcast::Sender<ServerEvent>,
    inbox: mpsc::UnboundedSender<Input>,
    inbox_rx: Option<mpsc::UnboundedReceiver<Input>>,
    credentials: Credentials,
    /// Prompts waiting for the user; the front one is the one shown
    pending: VecDeque<PendingRequest>,
    next_ticket: u64,
    control: Option<Negotiation>,
    socket: Option<(u64, ProtocolSocket)>,
    x11: Option<X11Forward>,
    aux: HashMap<u64, AuxProcess>,
    outbox: VecDeque<Frame>,
}

impl ServerActor {
    pub(crate) fn new(
        address: String,
        role: ServerRole,
        options: ServerOptions,
        deps: ServerDeps,
        status: watch::Sender<ServerStatus>,
        events: broadcast::Sender<ServerEvent>,
    ) -> Self {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let client_id = options
            .comm
            .client_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            ssh: SshCommand::from_config(&options.comm),
            parser: Arc::new(SshParser::new(options.comm.port_prefix.clone())),
            address,
            role,
            options,
            deps,
            client_id,
            status,
            events,
            inbox,
            inbox_rx: Some(inbox_rx),
            credentials: Credentials::default(),
            pending: VecDeque::new(),
            next_ticket: 0,
            control: None,
            socket: None,
            x11: None,
            aux: HashMap::new(),
            outbox: VecDeque::new(),
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let Some(mut inbox) = self.inbox_rx.take() else {
            return;
        };

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(input) = inbox.recv() => self.handle_input(input),
            }
        }

        tracing::debug!("{}: server handle dropped, shutting down", self.address);
        self.teardown();
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn role(&self) -> ServerRole {
        self.role
    }

    pub(crate) fn state(&self) -> ServerState {
        self.status.borrow().state
    }

    fn emit(&self, event: ServerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn message(&self, level: MessageLevel, text: impl Into<String>) {
        self.emit(ServerEvent::Message {
            level,
            text: text.into(),
        });
    }

    pub(crate) fn publish(&self, frame: Frame) {
        self.emit(ServerEvent::Received(frame));
    }

    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Host the negotiation talks to
    fn target_host(&self) -> &str {
        if self.address == local_hostname() {
            LOOPBACK
        } else {
            &self.address
        }
    }

    fn transition(&mut self, new: ServerState) {
        let old = self.state();
        if old == new {
            return;
        }
        if !can_transition(old, new) {
            tracing::warn!("{}: ignoring transition {} -> {}", self.address, old, new);
            return;
        }
        self.status.send_modify(|s| s.state = new);
        tracing::info!("{}: {} -> {}", self.address, old, new);
        self.emit(ServerEvent::StateChanged { old, new });
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnected_state(None),
            Command::Kill => self.kill(),
            Command::ForwardX11 { display, reply } => self.forward_x11(display, reply),
            Command::CloseX11 => self.close_x11(),
            Command::AppendKey { reply } => self.append_key(Some(reply)),
            Command::ForwardRemote {
                remote,
                local,
                reply,
            } => {
                let cmd = self.ssh.remote_forward(&self.address, remote, LOOPBACK, local);
                let _ = reply.send(self.start_forward(cmd));
            }
            Command::ForwardLocal {
                remote,
                local,
                addr,
                reply,
            } => {
                let cmd = self.ssh.local_forward(&self.address, local, &addr, remote);
                let _ = reply.send(self.start_forward(cmd));
            }
            Command::SetPassword(password) => self.set_password(password),
            Command::RejectPassword => self.reject_password(),
            Command::AnswerQuestion(answer) => self.answer_question(answer),
            Command::SetInteractive(interactive) => self.options.interactive = interactive,
            Command::SetUsePublicKey(use_key) => self.options.use_public_key = use_key,
            Command::SetLogged => self.set_logged(),
            Command::EmitInteractiveState => self.emit_interactive_state(),
            Command::Send(frame) => self.send(frame),
        }
    }

    fn handle_input(&mut self, input: Input) {
        match input {
            Input::Provider { ticket, event } => self.on_provider(ticket, event),
            Input::Connected { ticket, socket } => self.on_connected(ticket, socket),
            Input::ConnectFailed { ticket, error } => {
                if self.is_control(ticket) {
                    self.disconnected_state(Some((ServerErrorKind::Port, error)));
                }
            }
            Input::Socket { ticket, event } => self.on_socket(ticket, event),
            Input::Handshake { ticket, message } => {
                if self.state() == ServerState::Connect {
                    if let Some((_, socket)) = self.socket.as_ref().filter(|(t, _)| *t == ticket) {
                        if let Err(e) = socket.send(message) {
                            tracing::warn!("{}: failed to send handshake: {}", self.address, e);
                        }
                    }
                }
            }
            Input::X11Ready { ticket, result } => self.on_x11_ready(ticket, result),
            Input::Aux { id, event } => self.on_aux(id, event),
        }
    }

    fn is_control(&self, ticket: u64) -> bool {
        self.control.as_ref().is_some_and(|n| n.ticket == ticket)
    }

    fn origin_of(&self, ticket: u64) -> Option<Origin> {
        if self.is_control(ticket) {
            Some(Origin::Control)
        } else if self.x11.as_ref().is_some_and(|x| x.ticket == ticket) {
            Some(Origin::X11)
        } else {
            None
        }
    }

    fn start_provider(&mut self, request: PortRequest) -> (u64, PortProviderHandle) {
        let ticket = self.ticket();
        let inbox = self.inbox.clone();
        let handle = PortProvider::new(request, self.deps.launcher.clone(), &self.options.comm)
            .with_ssh(self.ssh.clone())
            .start(move |event| inbox.send(Input::Provider { ticket, event }).is_ok());
        (ticket, handle)
    }

    fn connect(&mut self) {
        let state = self.state();
        if !matches!(state, ServerState::Unknown | ServerState::Disconnected) {
            tracing::debug!("{}: connect ignored in state {}", self.address, state);
            return;
        }

        self.transition(ServerState::Disconnected);
        self.status.send_modify(|s| {
            s.error = ServerErrorKind::None;
            s.last_error.clear();
        });
        self.credentials.reset_attempt();
        self.transition(ServerState::Run);

        let request = PortRequest::new(self.target_host(), self.role.port_type());
        tracing::info!("{}: connecting to {}", self.address, self.role);
        let (ticket, handle) = self.start_provider(request);
        self.control = Some(Negotiation {
            ticket,
            _handle: handle,
        });
    }

    fn on_provider(&mut self, ticket: u64, event: PortEvent) {
        let Some(origin) = self.origin_of(ticket) else {
            tracing::debug!("{}: dropping late negotiation event", self.address);
            return;
        };

        match event {
            PortEvent::Password {
                prompt,
                retry,
                reply,
            } => {
                tracing::debug!("{}: ssh asks '{}'", self.address, prompt);
                self.on_password(origin, retry, reply);
            }
            PortEvent::Question { question, reply } => self.on_question(origin, question, reply),
            PortEvent::Warning(text) => self.message(MessageLevel::Warning, text),
            PortEvent::Tunneling { remote_port } => {
                tracing::debug!("{}: server listens on remote port {}", self.address, remote_port);
                if origin == Origin::Control {
                    self.transition(ServerState::OpenTunnel);
                }
            }
            PortEvent::Defined(port) => match origin {
                Origin::Control => self.open_socket(ticket, port),
                Origin::X11 => self.bind_x11_bridge(ticket, port),
                Origin::Aux(_) => {}
            },
            PortEvent::Failed { kind, message } => self.fail(origin, kind, message),
        }
    }

    fn open_socket(&mut self, ticket: u64, port: u16) {
        self.status.send_modify(|s| s.port = port);
        tracing::debug!("{}: connecting socket to port {}", self.address, port);

        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let socket_inbox = inbox.clone();
            let emit = move |event| socket_inbox.send(Input::Socket { ticket, event }).is_ok();
            let input = match ProtocolSocket::connect(port, emit).await {
                Ok(socket) => Input::Connected { ticket, socket },
                Err(e) => Input::ConnectFailed {
                    ticket,
                    error: format!("Could not connect to port {}: {}", port, e),
                },
            };
            let _ = inbox.send(input);
        });
    }

    fn on_connected(&mut self, ticket: u64, socket: ProtocolSocket) {
        if !self.is_control(ticket) {
            socket.close();
            return;
        }
        self.transition(ServerState::Connect);

        match self.role {
            ServerRole::Worker => {
                let handshake = Handshake::worker(local_hostname()).to_message();
                if let Err(e) = socket.send(handshake) {
                    tracing::warn!("{}: failed to send handshake: {}", self.address, e);
                }
                self.socket = Some((ticket, socket));
            }
            ServerRole::Orchestrator => {
                // The cookie lookup may take a while; the socket is kept
                // meanwhile so frames are still dispatched.
                self.socket = Some((ticket, socket));
                let display = self.options.display.clone();
                let xauth = self.options.comm.xauth_program.clone();
                let client_id = self.client_id.clone();
                let inbox = self.inbox.clone();
                tokio::spawn(async move {
                    let cookie = match display {
                        Some(display) => xauth_cookie(&xauth, &display).await.unwrap_or_else(|e| {
                            tracing::debug!("No X11 cookie: {}", e);
                            String::new()
                        }),
                        None => String::new(),
                    };
                    let handshake = Handshake::orchestrator(cookie, client_id, iso8601_now());
                    let _ = inbox.send(Input::Handshake {
                        ticket,
                        message: handshake.to_message(),
                    });
                });
            }
        }
    }

    fn on_socket(&mut self, ticket: u64, event: SocketEvent) {
        if !self.socket.as_ref().is_some_and(|(t, _)| *t == ticket) {
            return;
        }

        let handler = self.deps.handler.clone();
        match event {
            SocketEvent::Disconnected(reason) => {
                if let Some(reason) = &reason {
                    tracing::debug!("{}: socket error: {}", self.address, reason);
                }
                self.message(
                    MessageLevel::Warning,
                    format!("Machine '{}' disconnected", self.address),
                );
                self.disconnected_state(Some((ServerErrorKind::Unknown, String::new())));
            }
            SocketEvent::Legacy(message) => {
                handler.parse_legacy(&mut HandlerContext::new(self), message);
            }
            SocketEvent::Request(request) => {
                handler.process_request(&mut HandlerContext::new(self), request);
            }
            SocketEvent::Response { request, response } => {
                handler.process_response(&mut HandlerContext::new(self), request, response);
            }
        }
    }

    pub(crate) fn set_logged(&mut self) {
        if self.state() != ServerState::Connect {
            tracing::debug!("{}: set_logged ignored in state {}", self.address, self.state());
            return;
        }
        self.status.send_modify(|s| s.logged = true);
        self.transition(ServerState::Logged);

        while let Some(frame) = self.outbox.pop_front() {
            self.write_frame(frame);
        }

        if self.options.use_public_key && !super::is_local_address(&self.address) {
            self.append_key(None);
        }
    }

    pub(crate) fn send(&mut self, frame: Frame) {
        match self.state() {
            ServerState::Logged => self.write_frame(frame),
            ServerState::Run | ServerState::OpenTunnel | ServerState::Connect => {
                self.outbox.push_back(frame)
            }
            state => tracing::debug!("{}: dropping frame in state {}", self.address, state),
        }
    }

    fn write_frame(&mut self, frame: Frame) {
        if let Some((_, socket)) = &self.socket {
            if let Err(e) = socket.send(frame) {
                tracing::warn!("{}: send failed: {}", self.address, e);
            }
        }
    }

    fn on_password(&mut self, origin: Origin, retry: bool, reply: ProcessControl) {
        let connected = self.state().is_connected();
        match self
            .credentials
            .on_password_prompt(connected, retry, self.options.interactive)
        {
            PasswordAction::Write(password) => {
                if reply.write_line(&password).is_err() {
                    tracing::debug!("{}: ssh went away before the password", self.address);
                }
            }
            PasswordAction::Ask { retry } => {
                self.push_pending(PendingRequest::Password {
                    origin,
                    description: password_description(&self.address, retry),
                    retry,
                    reply,
                });
            }
            PasswordAction::NoPassword => {
                self.fail(origin, ServerErrorKind::Ssh, NO_PASSWORD.to_string())
            }
            PasswordAction::TooManyAttempts => {
                let message = authentication_failed(&self.address);
                self.fail(origin, ServerErrorKind::Ssh, message)
            }
        }
    }

    fn on_question(&mut self, origin: Origin, question: String, reply: ProcessControl) {
        let action = self.credentials.on_question(
            &question,
            self.options.interactive,
            self.deps.questions.as_ref(),
        );
        match action {
            QuestionAction::Answer(answer) => self.write_answer(origin, &question, answer, &reply),
            QuestionAction::Ask => {
                self.push_pending(PendingRequest::Question {
                    origin,
                    question,
                    reply,
                });
            }
        }
    }

    fn write_answer(&mut self, origin: Origin, question: &str, answer: bool, reply: &ProcessControl) {
        let _ = reply.write(answer_text(answer));
        self.deps.questions.remember(question, answer);
        if !answer {
            self.fail(origin, ServerErrorKind::Ssh, HOST_KEY_REJECTED.to_string());
        }
    }

    /// Queue a prompt behind the ones already shown. A process has at most
    /// one prompt open, so a newer one from the same origin replaces it.
    fn push_pending(&mut self, request: PendingRequest) {
        let origin = request.origin();
        self.pending.retain(|p| p.origin() != origin);
        self.pending.push_back(request);
        if self.pending.front().map(PendingRequest::origin) == Some(origin) {
            self.emit_interactive_state();
        }
    }

    /// Forget the prompts of `origin` and show the next one, if any
    fn drop_pending(&mut self, origin: Origin) {
        let shown = self.pending.front().map(PendingRequest::origin);
        self.pending.retain(|p| p.origin() != origin);
        if shown == Some(origin) {
            self.emit_interactive_state();
        }
    }

    /// Take the oldest prompt accepted by `select`, then show the next one
    fn take_pending(&mut self, select: fn(&PendingRequest) -> bool) -> Option<PendingRequest> {
        let index = self.pending.iter().position(select)?;
        let request = self.pending.remove(index);
        if index == 0 {
            self.emit_interactive_state();
        }
        request
    }

    fn emit_interactive_state(&self) {
        let Some(pending) = self.pending.front() else {
            return;
        };
        let event = match pending {
            PendingRequest::Password {
                description, retry, ..
            } => ServerEvent::PasswordRequest {
                title: PASSWORD_TITLE.to_string(),
                description: description.clone(),
                retry: *retry,
            },
            PendingRequest::Question { question, .. } => ServerEvent::QuestionRequest {
                title: QUESTION_TITLE.to_string(),
                description: question.clone(),
            },
        };
        self.emit(event);
    }

    fn set_password(&mut self, password: String) {
        self.credentials.set_password(password.clone());
        if let Some(PendingRequest::Password { reply, .. }) =
            self.take_pending(|p| matches!(p, PendingRequest::Password { .. }))
        {
            if reply.write_line(&password).is_err() {
                tracing::debug!("{}: ssh went away before the password", self.address);
            }
        }
    }

    fn reject_password(&mut self) {
        if let Some(PendingRequest::Password { origin, .. }) =
            self.take_pending(|p| matches!(p, PendingRequest::Password { .. }))
        {
            self.fail(origin, ServerErrorKind::Ssh, NO_PASSWORD.to_string())
        }
    }

    fn answer_question(&mut self, answer: bool) {
        if let Some(PendingRequest::Question {
            origin,
            question,
            reply,
        }) = self.take_pending(|p| matches!(p, PendingRequest::Question { .. }))
        {
            self.write_answer(origin, &question, answer, &reply)
        }
    }

    /// Route a failure to whatever raised it
    fn fail(&mut self, origin: Origin, kind: ServerErrorKind, message: String) {
        self.drop_pending(origin);

        match origin {
            Origin::Control => {
                tracing::warn!("{}: {}", self.address, message);
                self.disconnected_state(Some((kind, message)));
            }
            Origin::X11 => {
                if let Some(mut forward) = self.x11.take() {
                    if let Some(reply) = forward.reply.take() {
                        let _ = reply.send(Err(CommError::PortNegotiation(message.clone())));
                    }
                }
                self.message(MessageLevel::Error, message);
            }
            Origin::Aux(id) => {
                if let Some(aux) = self.aux.remove(&id) {
                    aux.control.kill();
                    self.finish_aux(aux.kind, false);
                }
                self.message(MessageLevel::Error, message);
            }
        }
    }

    /// Move to `Disconnected`, tearing down the connection. A failure of
    /// kind `Unknown` keeps the previous error.
    fn disconnected_state(&mut self, failure: Option<(ServerErrorKind, String)>) {
        self.teardown();
        self.status.send_modify(|s| {
            if let Some((kind, message)) = failure {
                if kind != ServerErrorKind::Unknown {
                    s.error = kind;
                    s.last_error = message;
                }
            }
            s.port = 0;
            s.logged = false;
        });
        self.transition(ServerState::Disconnected);
    }

    fn teardown(&mut self) {
        self.control = None;
        if let Some((_, socket)) = self.socket.take() {
            socket.close();
        }
        self.close_x11();
        if !self.outbox.is_empty() {
            tracing::debug!("{}: discarding {} queued frames", self.address, self.outbox.len());
            self.outbox.clear();
        }
        // Kill and key installation run to completion on their own
        let forwards: Vec<u64> = self
            .aux
            .iter()
            .filter(|(_, aux)| matches!(aux.kind, AuxKind::Forward))
            .map(|(id, _)| *id)
            .collect();
        for id in forwards {
            if let Some(aux) = self.aux.remove(&id) {
                aux.control.kill();
            }
        }
        // Prompts of kill and key installation stay open
        let shown = self.pending.front().map(PendingRequest::origin);
        self.pending
            .retain(|p| matches!(p.origin(), Origin::Aux(id) if self.aux.contains_key(&id)));
        if self.pending.front().map(PendingRequest::origin) != shown {
            self.emit_interactive_state();
        }
    }

    fn host_shell(&self) -> Arc<dyn HostShell> {
        match &self.deps.host_shell {
            Some(shell) => shell.clone(),
            None if self.target_host() == LOOPBACK => Arc::new(LocalShell::default()),
            None => Arc::new(SshShell::new(self.ssh.clone(), self.address.clone())),
        }
    }

    fn kill(&mut self) {
        let cmd = self
            .host_shell()
            .kill_process_group(&shell_lock_path(self.role));
        tracing::info!("{}: killing {}", self.address, self.role);
        let _ = self.spawn_aux(cmd, AuxKind::Kill);
    }

    fn append_key(&mut self, reply: Option<oneshot::Sender<Result<bool, CommError>>>) {
        let path = self.options.comm.public_key_path.clone();
        let key = match std::fs::read_to_string(&path) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                tracing::debug!("{}: no public key at {:?}", self.address, path);
                if let Some(reply) = reply {
                    let _ = reply.send(Err(CommError::NoPublicKey(path)));
                }
                return;
            }
        };

        let line = format!("{} (gebr)", key.trim());
        let cmd = self.ssh.append_key(&self.address, &line);
        let _ = self.spawn_aux(cmd, AuxKind::AppendKey(reply));
    }

    fn start_forward(&mut self, cmd: CommandLine) -> Result<(), CommError> {
        if !self.state().is_connected() {
            return Err(CommError::NotConnected(self.address.clone()));
        }
        self.spawn_aux(cmd, AuxKind::Forward)
    }

    /// Run a helper process. A launch failure is also reported the way
    /// the helper's own failure would be.
    fn spawn_aux(&mut self, cmd: CommandLine, kind: AuxKind) -> Result<(), CommError> {
        tracing::debug!("{}: running {}", self.address, cmd);
        let process = match self.deps.launcher.spawn(&cmd) {
            Ok(process) => process,
            Err(e) => {
                match kind {
                    AuxKind::Kill => {
                        self.message(MessageLevel::Error, e.to_string());
                        self.emit(ServerEvent::KillFinished { success: false });
                    }
                    AuxKind::AppendKey(Some(reply)) => {
                        let _ = reply.send(Err(CommError::SpawnFailed(e.to_string())));
                    }
                    AuxKind::AppendKey(None) | AuxKind::Forward => {}
                }
                return Err(e);
            }
        };
        let mut session = SshSession::new(process, self.parser.clone());
        let control = session.control();
        let id = self.ticket();

        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            while let Some(event) = session.next().await {
                if inbox.send(Input::Aux { id, event }).is_err() {
                    break;
                }
            }
        });

        self.aux.insert(id, AuxProcess { control, kind });
        Ok(())
    }

    fn on_aux(&mut self, id: u64, event: SessionEvent) {
        let Some(aux) = self.aux.get(&id) else {
            return;
        };
        let reply = aux.control.clone();
        let origin = Origin::Aux(id);

        match event {
            SessionEvent::Password { retry, .. } => self.on_password(origin, retry, reply),
            SessionEvent::Question(question) => self.on_question(origin, question, reply),
            SessionEvent::Warning(text) => self.message(MessageLevel::Warning, text),
            SessionEvent::Fatal(message) => self.fail(origin, ServerErrorKind::Ssh, message),
            SessionEvent::Port(_) | SessionEvent::Output(_) => {}
            SessionEvent::Exited(code) => {
                self.drop_pending(origin);
                if let Some(aux) = self.aux.remove(&id) {
                    self.finish_aux(aux.kind, code == Some(0));
                }
            }
        }
    }

    fn finish_aux(&mut self, kind: AuxKind, success: bool) {
        match kind {
            AuxKind::Kill => self.emit(ServerEvent::KillFinished { success }),
            AuxKind::AppendKey(reply) => {
                self.emit(ServerEvent::KeyAppended { success });
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(success));
                }
            }
            AuxKind::Forward => {
                tracing::debug!("{}: port forward ended", self.address);
            }
        }
    }

    fn forward_x11(&mut self, display: u16, reply: oneshot::Sender<Result<u16, CommError>>) {
        if !self.state().is_connected() {
            let _ = reply.send(Err(CommError::NotConnected(self.address.clone())));
            return;
        }
        self.close_x11();

        let request = PortRequest::new(self.target_host(), PortType::X11).with_display(display);
        let (ticket, handle) = self.start_provider(request);
        self.x11 = Some(X11Forward {
            ticket,
            display,
            _handle: handle,
            bridge: None,
            reply: Some(reply),
        });
    }

    fn bind_x11_bridge(&mut self, ticket: u64, port: u16) {
        let socket = self
            .options
            .display
            .as_deref()
            .and_then(|d| x11_unix_socket(d, &self.options.comm.x11_socket_dir));
        let Some(socket) = socket else {
            self.fail(
                Origin::X11,
                ServerErrorKind::Port,
                CommError::NoDisplay.to_string(),
            );
            return;
        };

        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = X11Bridge::bind(port, socket).await;
            let _ = inbox.send(Input::X11Ready { ticket, result });
        });
    }

    fn on_x11_ready(&mut self, ticket: u64, result: Result<X11Bridge, CommError>) {
        let Some(forward) = self.x11.as_mut().filter(|x| x.ticket == ticket) else {
            return;
        };

        match result {
            Ok(bridge) => {
                let port = bridge.port();
                let number = forward.display;
                forward.bridge = Some(bridge);
                if let Some(reply) = forward.reply.take() {
                    let _ = reply.send(Ok(port));
                }
                tracing::info!("{}: X11 display :{} forwarded", self.address, number);
                self.emit(ServerEvent::X11Forwarded {
                    display: number,
                    port,
                });
            }
            Err(e) => self.fail(Origin::X11, ServerErrorKind::Port, e.to_string()),
        }
    }

    fn close_x11(&mut self) {
        if let Some(mut forward) = self.x11.take() {
            if let Some(reply) = forward.reply.take() {
                let _ = reply.send(Err(CommError::Closed));
            }
            if let Some(bridge) = &forward.bridge {
                bridge.close();
                self.emit(ServerEvent::X11Closed);
            }
        }
    }
}


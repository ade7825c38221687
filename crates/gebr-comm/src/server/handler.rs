//! Dispatch of inbound control channel traffic

use gebr_core::types::{ServerRole, ServerState};
use gebr_protocol::{Frame, HttpMessage, LegacyMessage, MessageCode};

use super::actor::ServerActor;

/// Access to the server while a handler runs
pub struct HandlerContext<'a> {
    actor: &'a mut ServerActor,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(actor: &'a mut ServerActor) -> Self {
        Self { actor }
    }

    pub fn address(&self) -> &str {
        self.actor.address()
    }

    pub fn role(&self) -> ServerRole {
        self.actor.role()
    }

    pub fn state(&self) -> ServerState {
        self.actor.state()
    }

    /// Mark the handshake as acknowledged
    pub fn set_logged(&mut self) {
        self.actor.set_logged();
    }

    /// Send a frame, subject to the same queueing as [`crate::Server::send`]
    pub fn send(&mut self, frame: impl Into<Frame>) {
        self.actor.send(frame.into());
    }

    /// Hand a frame to subscribers as [`crate::ServerEvent::Received`]
    pub fn publish(&self, frame: Frame) {
        self.actor.publish(frame);
    }
}

/// Receives every frame read from a server's control channel
pub trait MessageHandler: Send + Sync {
    fn process_request(&self, ctx: &mut HandlerContext<'_>, request: HttpMessage) {
        ctx.publish(Frame::Request(request));
    }

    fn process_response(
        &self,
        ctx: &mut HandlerContext<'_>,
        request: Option<HttpMessage>,
        response: HttpMessage,
    ) {
        let _ = request;
        ctx.publish(Frame::Response(response));
    }

    fn parse_legacy(&self, ctx: &mut HandlerContext<'_>, message: LegacyMessage);
}

/// Completes the login on the server's `RET` and publishes everything else
#[derive(Debug, Default, Clone, Copy)]
pub struct LoginHandler;

impl MessageHandler for LoginHandler {
    fn parse_legacy(&self, ctx: &mut HandlerContext<'_>, message: LegacyMessage) {
        if message.code == MessageCode::RET && ctx.state() == ServerState::Connect {
            tracing::debug!("{}: handshake acknowledged", ctx.address());
            ctx.set_logged();
            return;
        }
        ctx.publish(Frame::Legacy(message));
    }
}

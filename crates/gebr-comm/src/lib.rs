//! gebr-comm: Connections to GeBR servers
//!
//! A [`Server`] brings up the control channel to an orchestrator or worker,
//! locally or over ssh. ssh output is classified by the [`ssh`] module,
//! ports are negotiated by a [`PortProvider`] and the channel itself is a
//! [`ProtocolSocket`]. Authentication prompts surface as [`ServerEvent`]s;
//! [`spawn_auth_adapter`] turns them back into ask-and-return calls.

pub mod host;
pub mod port_provider;
pub mod process;
pub mod reconnect;
pub mod server;
pub mod socket;
pub mod ssh;
pub mod x11;

pub use host::{LocalShell, SshShell};
pub use port_provider::{PortEvent, PortProvider, PortProviderHandle, PortRequest};
pub use process::PtyLauncher;
pub use reconnect::{attempt, connect_with_retry, AttemptOutcome, ExponentialBackoff};
pub use server::{
    spawn_auth_adapter, Authenticator, HandlerContext, LoginHandler, MessageHandler, Server,
    ServerDeps, ServerEvent, ServerOptions, ServerStatus, WeakServer,
};
pub use socket::{ProtocolSocket, SocketEvent};

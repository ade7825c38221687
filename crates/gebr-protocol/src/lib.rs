//! gebr-protocol: Wire protocol for GeBR control channels
//!
//! A control channel carries two kinds of frames over one byte stream:
//! legacy messages (a short code plus positional arguments) and HTTP-style
//! request/response messages. The handshake that opens every channel is a
//! legacy `INI` message.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod http;
pub mod legacy;

pub use codec::{Frame, ProtocolCodec, MAX_HEAD_SIZE, MAX_PAYLOAD_SIZE};
pub use error::ProtocolError;
pub use handshake::{Handshake, PROTOCOL_VERSION};
pub use http::{HttpKind, HttpMessage, Method};
pub use legacy::{LegacyMessage, MessageCode};

//! ssh subprocess handling

mod command;
mod parser;
mod session;

pub use command::SshCommand;
pub use parser::{SshEvent, SshParser, DEFAULT_PORT_PREFIX};
pub use session::{SessionEvent, SshSession};

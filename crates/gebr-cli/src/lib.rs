//! gebr-cli: command-line client for GeBR servers
//!
//! Drives a [`gebr_comm::Server`] from the terminal: connect (optionally
//! forwarding X11), stop a remote server, install the gebr public key and
//! talk to a worker's job queues.

pub mod commands;
pub mod output;
pub mod prompt;

//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The first line of a frame is neither a legacy header nor an HTTP start line
    #[error("Invalid start line: {0:?}")]
    InvalidStartLine(String),

    /// Malformed HTTP header line
    #[error("Invalid header: {0:?}")]
    InvalidHeader(String),

    /// Legacy message code is not three upper-case ASCII letters
    #[error("Invalid message code: {0:?}")]
    InvalidCode(String),

    /// Malformed argument list inside a legacy payload
    #[error("Invalid argument list at byte {offset}")]
    InvalidArguments { offset: usize },

    /// Header block grew past the allowed size without terminating
    #[error("Frame head too large: more than {max} bytes")]
    HeadTooLarge { max: usize },

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Text field was not valid UTF-8
    #[error("Invalid UTF-8 in frame")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

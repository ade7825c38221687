//! Legacy messages
//!
//! A legacy message is a three letter code followed by positional string
//! arguments. On the wire the header line is `<CODE> <LEN>\n`, followed by
//! `LEN` payload bytes. The payload concatenates the arguments, each one
//! written as `<n>|<n bytes>`.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;

/// Three letter code identifying a legacy message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageCode([u8; 3]);

impl MessageCode {
    /// Handshake sent by the client right after the socket connects
    pub const INI: MessageCode = MessageCode(*b"INI");
    /// Return value / acknowledgement
    pub const RET: MessageCode = MessageCode(*b"RET");
    /// Peer is closing the channel
    pub const QUT: MessageCode = MessageCode(*b"QUT");
    /// Submit a job to a named queue
    pub const SUB: MessageCode = MessageCode(*b"SUB");
    /// Remove a named queue
    pub const RMQ: MessageCode = MessageCode(*b"RMQ");
    /// Query a queue's busy flag
    pub const BSY: MessageCode = MessageCode(*b"BSY");
    /// Query whether a queue has a pending job
    pub const NXT: MessageCode = MessageCode(*b"NXT");
    /// List queue names
    pub const QNM: MessageCode = MessageCode(*b"QNM");

    /// Parse a code from its textual form
    pub fn parse(code: &str) -> Result<Self, ProtocolError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(ProtocolError::InvalidCode(code.to_string()));
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    /// Textual form of the code
    pub fn as_str(&self) -> &str {
        // Only ever built from upper-case ASCII
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A legacy free-form message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMessage {
    /// Message code
    pub code: MessageCode,
    /// Positional arguments
    pub args: Vec<String>,
}

impl LegacyMessage {
    /// Create a new legacy message
    pub fn new<I, S>(code: MessageCode, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            code,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Get an argument by position
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Encode the argument list into its payload form
    pub fn encode_payload(&self) -> BytesMut {
        let mut payload = BytesMut::new();
        for arg in &self.args {
            payload.put_slice(arg.len().to_string().as_bytes());
            payload.put_u8(b'|');
            payload.put_slice(arg.as_bytes());
        }
        payload
    }

    /// Decode an argument list from its payload form
    pub fn decode_payload(code: MessageCode, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut args = Vec::new();
        let mut pos = 0;

        while pos < payload.len() {
            let bar = payload[pos..]
                .iter()
                .position(|b| *b == b'|')
                .ok_or(ProtocolError::InvalidArguments { offset: pos })?;
            let len: usize = std::str::from_utf8(&payload[pos..pos + bar])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(ProtocolError::InvalidArguments { offset: pos })?;

            let start = pos + bar + 1;
            let end = start
                .checked_add(len)
                .filter(|end| *end <= payload.len())
                .ok_or(ProtocolError::InvalidArguments { offset: start })?;

            args.push(String::from_utf8(payload[start..end].to_vec())?);
            pos = end;
        }

        Ok(Self { code, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_parse() {
        assert_eq!(MessageCode::parse("INI").unwrap(), MessageCode::INI);
        assert!(MessageCode::parse("ini").is_err());
        assert!(MessageCode::parse("INIT").is_err());
        assert_eq!(MessageCode::RET.to_string(), "RET");
    }

    #[test]
    fn test_payload_layout() {
        let msg = LegacyMessage::new(MessageCode::INI, ["1.0", "", "host|a"]);
        let payload = msg.encode_payload();
        assert_eq!(&payload[..], b"3|1.00|6|host|a");
    }

    #[test]
    fn test_payload_with_separator_inside_argument() {
        let decoded = LegacyMessage::decode_payload(MessageCode::SUB, b"4|a|b|2|\n\n").unwrap();
        assert_eq!(decoded.args, vec!["a|b|".to_string(), "\n\n".to_string()]);
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let result = LegacyMessage::decode_payload(MessageCode::INI, b"10|short");
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidArguments { offset: 3 })
        ));
    }

    #[test]
    fn test_empty_payload() {
        let decoded = LegacyMessage::decode_payload(MessageCode::QUT, b"").unwrap();
        assert!(decoded.args.is_empty());
    }
}

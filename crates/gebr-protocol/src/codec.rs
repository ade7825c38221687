//! Tokio codec for the control channel
//!
//! The channel mixes two frame shapes: legacy messages and HTTP-style
//! requests/responses. The first line of a frame tells them apart.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::http::{HttpHead, HttpMessage};
use crate::legacy::{LegacyMessage, MessageCode};

/// Maximum size of a start line plus headers
pub const MAX_HEAD_SIZE: usize = 8 * 1024;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// A complete frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Request(HttpMessage),
    Response(HttpMessage),
    Legacy(LegacyMessage),
}

impl From<LegacyMessage> for Frame {
    fn from(msg: LegacyMessage) -> Self {
        Frame::Legacy(msg)
    }
}

impl From<HttpMessage> for Frame {
    fn from(msg: HttpMessage) -> Self {
        if msg.is_request() {
            Frame::Request(msg)
        } else {
            Frame::Response(msg)
        }
    }
}

/// Head decoded, body still incomplete
#[derive(Debug)]
enum Pending {
    Legacy { code: MessageCode, len: usize },
    Http { head: HttpHead, len: usize },
}

/// Codec for encoding/decoding control channel frames
#[derive(Debug, Default)]
pub struct ProtocolCodec {
    pending: Option<Pending>,
}

impl ProtocolCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self { pending: None }
    }

    fn decode_head(&mut self, src: &mut BytesMut) -> Result<Option<Pending>, ProtocolError> {
        let Some(newline) = src.iter().position(|b| *b == b'\n') else {
            if src.len() > MAX_HEAD_SIZE {
                return Err(ProtocolError::HeadTooLarge { max: MAX_HEAD_SIZE });
            }
            return Ok(None);
        };

        let line = std::str::from_utf8(&src[..newline])
            .map_err(|_| ProtocolError::InvalidStartLine(String::from_utf8_lossy(&src[..newline]).into_owned()))?
            .trim_end_matches('\r')
            .to_string();

        if let Some(kind) = HttpHead::parse_start_line(&line) {
            let Some(head_end) = find_head_end(src) else {
                if src.len() > MAX_HEAD_SIZE {
                    return Err(ProtocolError::HeadTooLarge { max: MAX_HEAD_SIZE });
                }
                return Ok(None);
            };
            let head_bytes = src.split_to(head_end);
            let text = String::from_utf8(head_bytes.to_vec())?;

            let mut headers = Vec::new();
            for header_line in text.lines().skip(1) {
                let header_line = header_line.trim_end_matches('\r');
                if header_line.is_empty() {
                    break;
                }
                headers.push(HttpHead::parse_header(header_line)?);
            }

            let head = HttpHead { kind, headers };
            let len = head.content_length()?;
            return Ok(Some(Pending::Http { head, len }));
        }

        let (code, len) = parse_legacy_line(&line)?;
        let _ = src.split_to(newline + 1);
        Ok(Some(Pending::Legacy { code, len }))
    }
}

/// Offset just past the blank line ending the head
fn find_head_end(src: &[u8]) -> Option<usize> {
    let crlf = src.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
    let lf = src.windows(2).position(|w| w == b"\n\n").map(|p| p + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn parse_legacy_line(line: &str) -> Result<(MessageCode, usize), ProtocolError> {
    let mut parts = line.split(' ');
    let (Some(code), Some(len), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ProtocolError::InvalidStartLine(line.to_string()));
    };
    let code = MessageCode::parse(code)?;
    let len = len
        .parse()
        .map_err(|_| ProtocolError::InvalidStartLine(line.to_string()))?;
    Ok((code, len))
}

impl Decoder for ProtocolCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let pending = match self.pending.take() {
            Some(p) => p,
            None => match self.decode_head(src)? {
                Some(p) => p,
                None => return Ok(None),
            },
        };

        let len = match &pending {
            Pending::Legacy { len, .. } | Pending::Http { len, .. } => *len,
        };
        if len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if src.len() < len {
            src.reserve(len - src.len());
            self.pending = Some(pending);
            return Ok(None);
        }

        let body: Bytes = src.split_to(len).freeze();
        let frame = match pending {
            Pending::Legacy { code, .. } => Frame::Legacy(LegacyMessage::decode_payload(code, &body)?),
            Pending::Http { head, .. } => Frame::from(head.into_message(body)),
        };
        Ok(Some(frame))
    }
}

impl Encoder<Frame> for ProtocolCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match frame {
            Frame::Legacy(msg) => {
                let payload = msg.encode_payload();
                if payload.len() > MAX_PAYLOAD_SIZE {
                    return Err(ProtocolError::PayloadTooLarge {
                        size: payload.len(),
                        max: MAX_PAYLOAD_SIZE,
                    });
                }
                dst.extend_from_slice(format!("{} {}\n", msg.code, payload.len()).as_bytes());
                dst.extend_from_slice(&payload);
            }
            Frame::Request(msg) | Frame::Response(msg) => {
                if msg.content.len() > MAX_PAYLOAD_SIZE {
                    return Err(ProtocolError::PayloadTooLarge {
                        size: msg.content.len(),
                        max: MAX_PAYLOAD_SIZE,
                    });
                }
                msg.encode(dst);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpKind, Method};

    #[test]
    fn test_legacy_frame() {
        let mut codec = ProtocolCodec::new();
        let mut buf = BytesMut::from(&b"RET 7\n1|02|ok"[..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Legacy(LegacyMessage::new(MessageCode::RET, ["0", "ok"]))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_legacy_encode_header() {
        let mut codec = ProtocolCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(LegacyMessage::new(MessageCode::INI, ["1.0", "node"]).into(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"INI 11\n3|1.04|node");
    }

    #[test]
    fn test_partial_body() {
        let mut codec = ProtocolCodec::new();
        let mut buf = BytesMut::from(&b"QNM 5\n3|a"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(codec.pending.is_some());

        buf.extend_from_slice(b",b");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        match frame {
            Frame::Legacy(msg) => assert_eq!(msg.arg(0), Some("a,b")),
            other => panic!("Expected legacy frame, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_head() {
        let mut codec = ProtocolCodec::new();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Le"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"ngth: 2\r\n\r\nhi");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        match frame {
            Frame::Response(msg) => {
                assert!(matches!(msg.kind, HttpKind::Response { status: 200, .. }));
                assert_eq!(&msg.content[..], b"hi");
            }
            other => panic!("Expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_request_then_legacy_in_one_buffer() {
        let mut codec = ProtocolCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                HttpMessage::request(Method::Get, "/server", "").into(),
                &mut buf,
            )
            .unwrap();
        codec
            .encode(LegacyMessage::new(MessageCode::QUT, Vec::<String>::new()).into(), &mut buf)
            .unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(first, Frame::Request(ref m) if m.url() == Some("/server")));

        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(second, Frame::Legacy(ref m) if m.code == MessageCode::QUT));

        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_garbage_start_line() {
        let mut codec = ProtocolCodec::new();
        let mut buf = BytesMut::from(&b"hello world\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::InvalidCode(_)) | Err(ProtocolError::InvalidStartLine(_))
        ));
    }

    #[test]
    fn test_payload_too_large() {
        let mut codec = ProtocolCodec::new();
        let header = format!("SUB {}\n", MAX_PAYLOAD_SIZE + 1);
        let mut buf = BytesMut::from(header.as_bytes());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_head_too_large() {
        let mut codec = ProtocolCodec::new();
        let mut buf = BytesMut::from(&vec![b'A'; MAX_HEAD_SIZE + 1][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::HeadTooLarge { .. })
        ));
    }
}

//! HTTP-style request and response messages

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(Method::Get),
            "PUT" => Some(Method::Put),
            "POST" => Some(Method::Post),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a message is a request or a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpKind {
    Request { method: Method, url: String },
    Response { status: u16, reason: String },
}

/// An HTTP-style message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMessage {
    pub kind: HttpKind,
    pub headers: Vec<(String, String)>,
    pub content: Bytes,
}

impl HttpMessage {
    /// Build a request
    pub fn request(method: Method, url: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            kind: HttpKind::Request {
                method,
                url: url.into(),
            },
            headers: Vec::new(),
            content: content.into(),
        }
    }

    /// Build a response
    pub fn response(status: u16, content: impl Into<Bytes>) -> Self {
        let reason = match status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "Unknown",
        };
        Self {
            kind: HttpKind::Response {
                status,
                reason: reason.to_string(),
            },
            headers: Vec::new(),
            content: content.into(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_request(&self) -> bool {
        matches!(self.kind, HttpKind::Request { .. })
    }

    /// Look up a header value, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Request URL, if this is a request
    pub fn url(&self) -> Option<&str> {
        match &self.kind {
            HttpKind::Request { url, .. } => Some(url),
            HttpKind::Response { .. } => None,
        }
    }

    /// Write the start line, headers and content.
    ///
    /// `Content-Length` is always derived from the content; a caller-provided
    /// value is ignored.
    pub fn encode(&self, dst: &mut BytesMut) {
        let start = match &self.kind {
            HttpKind::Request { method, url } => format!("{} {} HTTP/1.1\r\n", method, url),
            HttpKind::Response { status, reason } => format!("HTTP/1.1 {} {}\r\n", status, reason),
        };
        dst.put_slice(start.as_bytes());
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            dst.put_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        dst.put_slice(format!("Content-Length: {}\r\n\r\n", self.content.len()).as_bytes());
        dst.put_slice(&self.content);
    }
}

/// Parsed start line and headers, waiting for the body
#[derive(Debug, Clone)]
pub(crate) struct HttpHead {
    pub kind: HttpKind,
    pub headers: Vec<(String, String)>,
}

impl HttpHead {
    /// Parse a start line. Returns `None` when the line is not HTTP at all.
    pub fn parse_start_line(line: &str) -> Option<HttpKind> {
        let mut parts = line.splitn(3, ' ');
        let first = parts.next()?;
        let second = parts.next()?;

        if first.starts_with("HTTP/") {
            let status = second.parse().ok()?;
            let reason = parts.next().unwrap_or("").to_string();
            return Some(HttpKind::Response { status, reason });
        }

        let method = Method::parse(first)?;
        let version = parts.next()?;
        if !version.starts_with("HTTP/") {
            return None;
        }
        Some(HttpKind::Request {
            method,
            url: second.to_string(),
        })
    }

    /// Parse one `Name: value` header line
    pub fn parse_header(line: &str) -> Result<(String, String), ProtocolError> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::InvalidHeader(line.to_string()))?;
        Ok((name.trim().to_string(), value.trim().to_string()))
    }

    pub fn content_length(&self) -> Result<usize, ProtocolError> {
        match self
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        {
            Some((_, value)) => value
                .parse()
                .map_err(|_| ProtocolError::InvalidHeader(format!("Content-Length: {}", value))),
            None => Ok(0),
        }
    }

    pub fn into_message(self, content: Bytes) -> HttpMessage {
        HttpMessage {
            kind: self.kind,
            headers: self.headers,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_line_request() {
        let kind = HttpHead::parse_start_line("PUT /run HTTP/1.1").unwrap();
        assert_eq!(
            kind,
            HttpKind::Request {
                method: Method::Put,
                url: "/run".to_string()
            }
        );
    }

    #[test]
    fn test_start_line_response_with_spaces_in_reason() {
        let kind = HttpHead::parse_start_line("HTTP/1.1 404 Not Found").unwrap();
        assert_eq!(
            kind,
            HttpKind::Response {
                status: 404,
                reason: "Not Found".to_string()
            }
        );
    }

    #[test]
    fn test_start_line_rejects_legacy_header() {
        assert!(HttpHead::parse_start_line("INI 12").is_none());
        assert!(HttpHead::parse_start_line("GET /x SPDY").is_none());
    }

    #[test]
    fn test_encode_overrides_content_length() {
        let msg = HttpMessage::request(Method::Post, "/flow", "abc").with_header("Content-Length", "99");
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        assert_eq!(
            &buf[..],
            b"POST /flow HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc"
        );
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let msg = HttpMessage::response(200, "").with_header("X-Gebr-Id", "42");
        assert_eq!(msg.header("x-gebr-id"), Some("42"));
        assert_eq!(msg.header("missing"), None);
    }
}

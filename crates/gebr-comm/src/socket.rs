//! Control channel socket
//!
//! Inbound bytes are buffered by [`ProtocolCodec`] and every complete frame
//! is dispatched as a [`SocketEvent`]. Responses are paired with the
//! requests this side sent, in order.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use gebr_core::error::CommError;
use gebr_protocol::{Frame, HttpMessage, LegacyMessage, ProtocolCodec};

/// What arrived on (or happened to) a socket
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// The peer sent a request
    Request(HttpMessage),
    /// The peer answered; `request` is the oldest unanswered request we sent
    Response {
        request: Option<HttpMessage>,
        response: HttpMessage,
    },
    Legacy(LegacyMessage),
    /// The connection ended, with the reason when it was not a clean close
    Disconnected(Option<String>),
}

type Pending = Arc<Mutex<VecDeque<HttpMessage>>>;

/// A connected control channel
#[derive(Debug)]
pub struct ProtocolSocket {
    outbound: mpsc::UnboundedSender<Frame>,
    pending: Pending,
    cancel: CancellationToken,
    peer: Option<SocketAddr>,
}

impl ProtocolSocket {
    /// Connect to a loopback port
    pub async fn connect<F>(port: u16, emit: F) -> Result<Self, CommError>
    where
        F: Fn(SocketEvent) -> bool + Send + Sync + 'static,
    {
        let stream = TcpStream::connect(("127.0.0.1", port)).await?;
        Ok(Self::new(stream, emit))
    }

    /// Wrap a connected stream. Events go to `emit` until it returns false
    /// or the socket is closed.
    pub fn new<F>(stream: TcpStream, emit: F) -> Self
    where
        F: Fn(SocketEvent) -> bool + Send + Sync + 'static,
    {
        let peer = stream.peer_addr().ok();
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
        let pending: Pending = Arc::new(Mutex::new(VecDeque::new()));
        let cancel = CancellationToken::new();
        let broken = CancellationToken::new();

        let writer_cancel = cancel.clone();
        let writer_broken = broken.clone();
        tokio::spawn(async move {
            let mut sink = FramedWrite::new(writer, ProtocolCodec::new());
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    frame = outbound_rx.recv() => {
                        let Some(frame) = frame else { break };
                        if let Err(e) = sink.send(frame).await {
                            tracing::debug!("Socket write failed: {}", e);
                            writer_broken.cancel();
                            break;
                        }
                    }
                }
            }
        });

        let reader_cancel = cancel.clone();
        let reader_pending = pending.clone();
        tokio::spawn(async move {
            let mut frames = FramedRead::new(reader, ProtocolCodec::new());
            let reason = loop {
                tokio::select! {
                    _ = reader_cancel.cancelled() => return,
                    _ = broken.cancelled() => break Some("Write to socket failed".to_string()),
                    next = frames.next() => match next {
                        None => break None,
                        Some(Err(e)) => break Some(e.to_string()),
                        Some(Ok(frame)) => {
                            let event = match frame {
                                Frame::Legacy(msg) => SocketEvent::Legacy(msg),
                                Frame::Request(msg) => SocketEvent::Request(msg),
                                Frame::Response(response) => SocketEvent::Response {
                                    request: reader_pending
                                        .lock()
                                        .ok()
                                        .and_then(|mut p| p.pop_front()),
                                    response,
                                },
                            };
                            if !emit(event) {
                                return;
                            }
                        }
                    }
                }
            };
            emit(SocketEvent::Disconnected(reason));
        });

        Self {
            outbound,
            pending,
            cancel,
            peer,
        }
    }

    /// Queue a frame for writing
    pub fn send(&self, frame: impl Into<Frame>) -> Result<(), CommError> {
        let frame = frame.into();
        if let Frame::Request(request) = &frame {
            if let Ok(mut pending) = self.pending.lock() {
                pending.push_back(request.clone());
            }
        }
        self.outbound.send(frame).map_err(|_| CommError::Closed)
    }

    /// Requests still waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Close without reporting a disconnection
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.outbound.is_closed()
    }
}

impl Drop for ProtocolSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gebr_protocol::{MessageCode, Method};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn pair() -> (ProtocolSocket, mpsc::UnboundedReceiver<SocketEvent>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();

        let socket = ProtocolSocket::connect(port, move |e| tx.send(e).is_ok())
            .await
            .unwrap();
        let (peer, _) = listener.accept().await.unwrap();
        (socket, rx, peer)
    }

    #[tokio::test]
    async fn test_legacy_frames_split_across_writes() {
        let (_socket, mut events, mut peer) = pair().await;

        peer.write_all(b"RET 4\n2|o").await.unwrap();
        peer.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        peer.write_all(b"kINI 0\n").await.unwrap();

        match events.recv().await.unwrap() {
            SocketEvent::Legacy(msg) => {
                assert_eq!(msg.code, MessageCode::RET);
                assert_eq!(msg.args, vec!["ok"]);
            }
            other => panic!("Expected legacy message, got {:?}", other),
        }
        match events.recv().await.unwrap() {
            SocketEvent::Legacy(msg) => assert_eq!(msg.code, MessageCode::INI),
            other => panic!("Expected legacy message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_response_pairs_with_request() {
        let (socket, mut events, mut peer) = pair().await;

        socket
            .send(HttpMessage::request(Method::Get, "/status", ""))
            .unwrap();
        let mut buf = vec![0u8; 256];
        let n = peer.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).starts_with("GET /status HTTP/1.1\r\n"));
        assert_eq!(socket.pending_requests(), 1);

        peer.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nup")
            .await
            .unwrap();

        match events.recv().await.unwrap() {
            SocketEvent::Response { request, response } => {
                assert_eq!(request.unwrap().url(), Some("/status"));
                assert_eq!(&response.content[..], b"up");
            }
            other => panic!("Expected response, got {:?}", other),
        }
        assert_eq!(socket.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_peer_close_is_reported() {
        let (_socket, mut events, peer) = pair().await;
        drop(peer);

        assert!(matches!(
            events.recv().await.unwrap(),
            SocketEvent::Disconnected(None)
        ));
    }

    #[tokio::test]
    async fn test_garbage_disconnects_with_reason() {
        let (_socket, mut events, mut peer) = pair().await;
        peer.write_all(b"hello there\n").await.unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            SocketEvent::Disconnected(Some(_))
        ));
    }

    #[tokio::test]
    async fn test_close_is_silent() {
        let (socket, mut events, _peer) = pair().await;
        socket.close();

        assert!(socket.is_closed());
        let next = tokio::time::timeout(std::time::Duration::from_millis(100), events.recv()).await;
        assert!(!matches!(next, Ok(Some(SocketEvent::Disconnected(_)))));
    }
}

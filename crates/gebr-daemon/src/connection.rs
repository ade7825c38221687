//! Control channel connections to the daemon
//!
//! Each connection must open with an `INI` handshake, which is answered
//! with `RET`. After that queue commands are forwarded to the scheduler
//! and answered in order. `QUT` closes the connection.

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use gebr_core::lockfile::local_hostname;
use gebr_protocol::{Frame, Handshake, HttpMessage, LegacyMessage, MessageCode, ProtocolCodec};

use crate::commands::QueueCommand;
use crate::error::DaemonError;
use crate::scheduler::SchedulerHandle;

/// Accept connections until cancelled
pub async fn serve(listener: TcpListener, scheduler: SchedulerHandle, cancel: CancellationToken) -> Result<(), DaemonError> {
    tracing::info!("Listening on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if !peer.ip().is_loopback() {
                        tracing::warn!("Rejected non-localhost connection from {}", peer);
                        continue;
                    }
                    tracing::debug!("Connection from {}", peer);
                    let scheduler = scheduler.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, scheduler, cancel).await {
                            tracing::warn!("Connection from {} failed: {}", peer, e);
                        }
                    });
                }
                Err(e) => tracing::error!("Failed to accept connection: {}", e),
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, scheduler: SchedulerHandle, cancel: CancellationToken) -> Result<(), DaemonError> {
    let mut framed = Framed::new(stream, ProtocolCodec::new());
    let mut peer: Option<Handshake> = None;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            frame = framed.next() => match frame {
                Some(frame) => frame?,
                None => return Ok(()),
            },
        };

        let msg = match frame {
            Frame::Legacy(msg) => msg,
            Frame::Request(request) => {
                tracing::debug!("Unsupported request {:?}", request.url());
                framed.send(Frame::Response(HttpMessage::response(404, ""))).await?;
                continue;
            }
            Frame::Response(_) => continue,
        };

        match msg.code {
            MessageCode::INI => {
                let handshake = Handshake::from_message(&msg)?;
                tracing::info!("Handshake from {:?}", handshake);
                peer = Some(handshake);
                let ret = LegacyMessage::new(MessageCode::RET, [local_hostname()]);
                framed.send(Frame::Legacy(ret)).await?;
            }
            MessageCode::QUT => {
                tracing::debug!("Peer closed the channel");
                return Ok(());
            }
            _ if peer.is_none() => {
                tracing::warn!("Ignoring {} before handshake", msg.code);
            }
            _ => match QueueCommand::decode(&msg) {
                Ok(Some(command)) => {
                    let reply = scheduler.request(command).await?;
                    framed.send(Frame::Legacy(reply.to_message())).await?;
                }
                Ok(None) => tracing::debug!("Ignoring unknown message {}", msg.code),
                Err(e) => tracing::warn!("{}", e),
            },
        }
    }
}

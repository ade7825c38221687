//! X11 display helpers
//!
//! A remote display is forwarded to a loopback TCP port; [`X11Bridge`]
//! relays every connection on that port to the local X server's unix
//! socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::{TcpListener, UnixStream};
use tokio_util::sync::CancellationToken;

use gebr_core::error::CommError;
use gebr_core::traits::CommandLine;

const XAUTH_ATTEMPTS: usize = 5;
const XAUTH_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Display number of a `DISPLAY` value such as `:0`, `:1.0` or
/// `localhost:10.0`
pub fn display_number(display: &str) -> Option<u16> {
    let (_, rest) = display.rsplit_once(':')?;
    let number = rest.split('.').next()?;
    number.parse().ok()
}

/// Unix socket of the local X server for `display`
pub fn x11_unix_socket(display: &str, socket_dir: &Path) -> Option<PathBuf> {
    display_number(display).map(|n| socket_dir.join(format!("X{}", n)))
}

/// Magic cookie of `display_name` as listed by xauth, retried while xauth
/// has nothing to report yet
pub async fn xauth_cookie(program: &str, display_name: &str) -> Result<String, CommError> {
    let cmd = CommandLine::new(program).arg("list").arg(display_name);

    for attempt in 1..=XAUTH_ATTEMPTS {
        let output = tokio::process::Command::new(&cmd.program)
            .args(&cmd.args)
            .output()
            .await
            .map_err(|e| CommError::SpawnFailed(format!("{}: {}", cmd, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(cookie) = parse_xauth_list(&stdout) {
            return Ok(cookie);
        }
        tracing::debug!("xauth has no cookie for {} (attempt {})", display_name, attempt);
        tokio::time::sleep(XAUTH_RETRY_DELAY).await;
    }

    Err(CommError::NoDisplay)
}

/// Third column of the first line of `xauth list`
fn parse_xauth_list(output: &str) -> Option<String> {
    output
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(2))
        .map(str::to_string)
}

/// Relays a loopback TCP port to an X11 unix socket
#[derive(Debug)]
pub struct X11Bridge {
    port: u16,
    socket: PathBuf,
    cancel: CancellationToken,
}

impl X11Bridge {
    /// Listen on `127.0.0.1:<port>` and relay to `socket`
    pub async fn bind(port: u16, socket: PathBuf) -> Result<Self, CommError> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let target = socket.clone();
        tokio::spawn(async move {
            loop {
                let (mut client, _) = tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!("X11 bridge accept failed: {}", e);
                            break;
                        }
                    },
                };

                let target = target.clone();
                let conn_cancel = task_cancel.clone();
                tokio::spawn(async move {
                    let mut display = match UnixStream::connect(&target).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::warn!("Cannot reach X server at {:?}: {}", target, e);
                            return;
                        }
                    };
                    tokio::select! {
                        _ = conn_cancel.cancelled() => {}
                        result = tokio::io::copy_bidirectional(&mut client, &mut display) => {
                            if let Err(e) = result {
                                tracing::debug!("X11 relay ended: {}", e);
                            }
                        }
                    }
                });
            }
        });

        tracing::debug!("X11 bridge 127.0.0.1:{} -> {:?}", port, socket);
        Ok(Self {
            port,
            socket,
            cancel,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for X11Bridge {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpStream, UnixListener};

    #[test]
    fn test_display_number() {
        assert_eq!(display_number(":0"), Some(0));
        assert_eq!(display_number(":1.0"), Some(1));
        assert_eq!(display_number("localhost:10.0"), Some(10));
        assert_eq!(display_number("nodisplay"), None);
        assert_eq!(display_number(":x"), None);
    }

    #[test]
    fn test_unix_socket_path() {
        assert_eq!(
            x11_unix_socket(":0.0", Path::new("/tmp/.X11-unix")),
            Some(PathBuf::from("/tmp/.X11-unix/X0"))
        );
        assert_eq!(
            x11_unix_socket("localhost:10.0", Path::new("/tmp/.X11-unix")),
            Some(PathBuf::from("/tmp/.X11-unix/X10"))
        );
    }

    #[test]
    fn test_parse_xauth_list() {
        let output = "host/unix:0  MIT-MAGIC-COOKIE-1  0123456789abcdef\n";
        assert_eq!(parse_xauth_list(output), Some("0123456789abcdef".to_string()));
        assert_eq!(parse_xauth_list(""), None);
    }

    #[tokio::test]
    async fn test_missing_xauth_program() {
        let result = xauth_cookie("/nonexistent/xauth", ":0").await;
        assert!(matches!(result, Err(CommError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_xauth_without_cookie_gives_up() {
        // Prints nothing, so every attempt finds no cookie
        let result = xauth_cookie("true", ":0").await;
        assert!(matches!(result, Err(CommError::NoDisplay)));
    }

    #[tokio::test]
    async fn test_bridge_relays_to_unix_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("X0");
        let display = UnixListener::bind(&path).unwrap();

        let bridge = X11Bridge::bind(0, path.clone()).await.unwrap();
        let mut client = TcpStream::connect(("127.0.0.1", bridge.port())).await.unwrap();
        client.write_all(b"ping").await.unwrap();

        let (mut server, _) = display.accept().await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }
}

//! Async relay connection over tokio.
//!
//! Mirrors [`RelayConnection`](super::connection::RelayConnection): same
//! handshake parser, same frame decoder. Only connect, read, and write await,
//! and each wait runs under a single `tokio::time::timeout`.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::ws::{HandshakeError, HandshakeResponse, UpgradeRequest};

use super::config::ProbeConfig;
use super::connection::READ_CHUNK;
use super::error::{RelayError, RelayResult};
use super::types::RelayReply;

/// Async counterpart of [`RelayConnection`](super::connection::RelayConnection).
///
/// The socket closes when the connection is dropped; [`close`](Self::close)
/// sends a clean shutdown first.
#[derive(Debug)]
pub struct AsyncRelayConnection {
    stream: TcpStream,
    buffer: Vec<u8>,
    addr: String,
    timeout: Duration,
}

impl AsyncRelayConnection {
    /// Opens a TCP connection to the configured relay.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connection`] if resolution fails, no address
    /// accepts, or the connect exceeds the timeout.
    pub async fn open(config: &ProbeConfig) -> RelayResult<Self> {
        let addr = config.addr();
        let limit = config.timeout();

        let stream = match timeout(limit, connect_any(&config.host, config.port)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(RelayError::Connection {
                    addr,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(RelayError::Connection {
                    addr,
                    reason: format!("connect timed out after {}s", limit.as_secs()),
                })
            }
        };
        stream.set_nodelay(true)?;

        debug!(addr = %addr, "Connected to relay");
        Ok(Self {
            stream,
            buffer: Vec::with_capacity(READ_CHUNK),
            addr,
            timeout: limit,
        })
    }

    /// Relay address this connection was opened to.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends the upgrade request and reads the response head, unvalidated.
    ///
    /// # Errors
    ///
    /// Same as [`RelayConnection::upgrade`](super::connection::RelayConnection::upgrade).
    pub async fn upgrade(&mut self, request: &UpgradeRequest) -> RelayResult<HandshakeResponse> {
        self.write(&request.to_bytes()).await?;
        timeout(self.timeout, self.read_handshake())
            .await
            .map_err(|_| RelayError::Timeout("handshake response".to_string()))?
    }

    /// Writes one encoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] or [`RelayError::Timeout`] if the write
    /// fails or stalls.
    pub async fn send_frame(&mut self, frame: &[u8]) -> RelayResult<()> {
        self.write(frame).await?;
        trace!(addr = %self.addr, bytes = frame.len(), "Frame sent");
        Ok(())
    }

    /// Waits for at least one complete frame and returns every frame that
    /// has fully arrived. The whole wait shares one timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Timeout`] if nothing completes within the
    /// timeout, [`RelayError::Closed`] if the relay hangs up, and
    /// [`RelayError::Protocol`] for invalid or oversized frames.
    pub async fn read_replies(&mut self) -> RelayResult<Vec<RelayReply>> {
        timeout(self.timeout, self.read_frames())
            .await
            .map_err(|_| RelayError::Timeout("relay reply".to_string()))?
    }

    /// Shuts the write half down and drops the socket.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            trace!(addr = %self.addr, error = %e, "Shutdown failed");
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> RelayResult<()> {
        timeout(self.timeout, self.stream.write_all(bytes))
            .await
            .map_err(|_| RelayError::Timeout("write".to_string()))??;
        Ok(())
    }

    async fn read_handshake(&mut self) -> RelayResult<HandshakeResponse> {
        loop {
            match HandshakeResponse::parse(&self.buffer) {
                Ok(Some((response, used))) => {
                    self.buffer.drain(..used);
                    debug!(
                        addr = %self.addr,
                        status = response.status,
                        headers = response.header_count(),
                        "Handshake response received"
                    );
                    return Ok(response);
                }
                Ok(None) => {}
                Err(source) => {
                    return Err(RelayError::Handshake {
                        addr: self.addr.clone(),
                        source,
                    })
                }
            }

            if self.fill().await? == 0 {
                return Err(RelayError::Handshake {
                    addr: self.addr.clone(),
                    source: HandshakeError::Malformed(
                        "connection closed before response".to_string(),
                    ),
                });
            }
        }
    }

    async fn read_frames(&mut self) -> RelayResult<Vec<RelayReply>> {
        loop {
            let replies = RelayReply::drain(&mut self.buffer)?;
            if !replies.is_empty() {
                return Ok(replies);
            }
            if self.fill().await? == 0 {
                return Err(RelayError::Closed);
            }
        }
    }

    async fn fill(&mut self) -> RelayResult<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.stream.read(&mut chunk).await?;
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(n)
    }
}

async fn connect_any(host: &str, port: u16) -> std::io::Result<TcpStream> {
    let mut last_error = std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "host resolved to no addresses",
    );

    for addr in lookup_host((host, port)).await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "Connect attempt failed");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    use crate::nostr::RelayMessage;
    use crate::ws::compute_accept_key;

    fn local_config(port: u16) -> ProbeConfig {
        ProbeConfig::default()
            .with_target("127.0.0.1", port)
            .with_timeout_seconds(2)
    }

    #[tokio::test]
    async fn open_refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = AsyncRelayConnection::open(&local_config(port))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Connection { .. }));
    }

    #[tokio::test]
    async fn upgrade_and_read_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let request = UpgradeRequest::new("127.0.0.1", port, "/");
        let accept = compute_accept_key(&request.key);

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            let head = format!(
                "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            let reply = br#"["EOSE","test-sub"]"#;
            socket
                .write_all(&[0x81, u8::try_from(reply.len()).unwrap()])
                .await
                .unwrap();
            socket.write_all(reply).await.unwrap();
        });

        let mut conn = AsyncRelayConnection::open(&local_config(port)).await.unwrap();
        let response = conn.upgrade(&request).await.unwrap();
        assert!(response.validate(&request).is_ok());

        let replies = conn.read_replies().await.unwrap();
        assert_eq!(
            replies[0],
            RelayReply::Message(RelayMessage::Eose("test-sub".to_string()))
        );
        conn.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn read_replies_deadline_holds_against_trickling_relay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = socket.write_all(&[0x81, 126, 0xFF, 0xFF]).await;
            for _ in 0..20 {
                tokio::time::sleep(Duration::from_millis(200)).await;
                if socket.write_all(b"x").await.is_err() {
                    break;
                }
            }
        });

        let mut conn = AsyncRelayConnection::open(&local_config(port).with_timeout_seconds(1))
            .await
            .unwrap();
        let started = std::time::Instant::now();
        let result = conn.read_replies().await;
        let elapsed = started.elapsed();
        drop(conn);

        assert!(matches!(result, Err(RelayError::Timeout(_))), "got {result:?}");
        assert!(elapsed < Duration::from_millis(1800), "waited {elapsed:?}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn read_replies_reports_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut conn = AsyncRelayConnection::open(&local_config(port)).await.unwrap();
        server.await.unwrap();
        assert!(matches!(
            conn.read_replies().await,
            Err(RelayError::Closed | RelayError::Io(_))
        ));
    }
}

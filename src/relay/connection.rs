//! Blocking relay connection over `std::net`.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::ws::{HandshakeError, HandshakeResponse, UpgradeRequest};

use super::config::ProbeConfig;
use super::error::{RelayError, RelayResult};
use super::types::RelayReply;

pub(crate) const READ_CHUNK: usize = 4096;

/// One TCP connection to a relay.
///
/// Bytes read past the handshake are kept for frame decoding. Each wait
/// (handshake, replies) is bounded as a whole by the config timeout, however
/// the bytes trickle in. The socket is shut down when the connection is
/// dropped.
#[derive(Debug)]
pub struct RelayConnection {
    stream: TcpStream,
    buffer: Vec<u8>,
    addr: String,
    timeout: Duration,
}

impl RelayConnection {
    /// Opens a TCP connection to the configured relay.
    ///
    /// Every resolved address is tried in turn, each bounded by the config
    /// timeout, which also bounds each later write and each whole wait.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connection`] if no address accepts.
    pub fn open(config: &ProbeConfig) -> RelayResult<Self> {
        let addr = config.addr();
        let timeout = config.timeout();

        let stream = connect_any(&config.host, config.port, timeout).map_err(|e| {
            RelayError::Connection {
                addr: addr.clone(),
                reason: e.to_string(),
            }
        })?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        debug!(addr = %addr, "Connected to relay");
        Ok(Self {
            stream,
            buffer: Vec::with_capacity(READ_CHUNK),
            addr,
            timeout,
        })
    }

    /// Relay address this connection was opened to.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends the upgrade request and reads the response head.
    ///
    /// The response is returned unvalidated so callers can record its status
    /// before checking it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Handshake`] if the response is malformed or the
    /// relay hangs up first, [`RelayError::Timeout`] if it stalls.
    pub fn upgrade(&mut self, request: &UpgradeRequest) -> RelayResult<HandshakeResponse> {
        self.stream.write_all(&request.to_bytes())?;
        self.stream.flush()?;
        let deadline = Instant::now() + self.timeout;

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

            if self.fill("handshake response", deadline)? == 0 {
                return Err(RelayError::Handshake {
                    addr: self.addr.clone(),
                    source: HandshakeError::Malformed(
                        "connection closed before response".to_string(),
                    ),
                });
            }
        }
    }

    /// Writes one encoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if the write fails.
    pub fn send_frame(&mut self, frame: &[u8]) -> RelayResult<()> {
        self.stream.write_all(frame)?;
        trace!(addr = %self.addr, bytes = frame.len(), "Frame sent");
        Ok(())
    }

    /// Waits for at least one complete frame and returns every frame that
    /// has fully arrived.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Timeout`] if nothing completes within the
    /// timeout, [`RelayError::Closed`] if the relay hangs up, and
    /// [`RelayError::Protocol`] for invalid or oversized frames.
    pub fn read_replies(&mut self) -> RelayResult<Vec<RelayReply>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let replies = RelayReply::drain(&mut self.buffer)?;
            if !replies.is_empty() {
                return Ok(replies);
            }
            if self.fill("relay reply", deadline)? == 0 {
                return Err(RelayError::Closed);
            }
        }
    }

    fn fill(&mut self, waiting_for: &str, deadline: Instant) -> RelayResult<usize> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(RelayError::Timeout(waiting_for.to_string()));
        }
        self.stream.set_read_timeout(Some(remaining))?;

        let mut chunk = [0u8; READ_CHUNK];
        match self.stream.read(&mut chunk) {
            Ok(n) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if is_timeout(&e) => Err(RelayError::Timeout(waiting_for.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        // Already-closed sockets report NotConnected here.
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

fn connect_any(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    let mut last_error = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "Connect attempt failed");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

// Unix reports an expired read timeout as WouldBlock, Windows as TimedOut.
pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

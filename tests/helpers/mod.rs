//! In-process mock relay for probe integration tests.
//!
//! Each [`MockRelay`] binds an ephemeral port on localhost, serves exactly
//! one connection on a background thread, and records every client message
//! it decodes. The WebSocket side reuses the crate's own handshake and frame
//! codec, so a mismatch between client and server shows up as a test failure.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use relay_probe::nostr::{ClientMessage, RelayMessage};
use relay_probe::ws::{compute_accept_key, decode_frame, Opcode};
use relay_probe::ProbeConfig;

/// How the mock answers once it has the client's `EVENT`.
#[derive(Debug, Clone)]
pub enum RelayBehavior {
    /// `["OK", id, true, ""]` for each `EVENT`.
    Acknowledge,
    /// `["OK", id, false, message]` for each `EVENT`.
    Reject(String),
    /// `["NOTICE", message]` for each `EVENT`.
    Notice(String),
    /// Reads everything, answers nothing.
    Silent,
    /// Answers the upgrade with the given status instead of 101.
    RefuseUpgrade(u16),
    /// Answers 101 with a bogus `Sec-WebSocket-Accept`.
    WrongAccept,
    /// After the upgrade, starts a long frame and feeds it one byte at a
    /// time, never finishing it.
    Trickle,
    /// After the upgrade, sends a frame header declaring a 1 GiB payload.
    OversizedHeader,
}

/// What the mock saw on its one connection.
#[derive(Debug, Default)]
pub struct Observed {
    /// Raw upgrade request head.
    pub request_head: String,
    /// Client messages in arrival order.
    pub messages: Vec<ClientMessage>,
    /// Whether every client frame carried a mask.
    pub all_masked: bool,
}

/// A single-connection relay stand-in.
pub struct MockRelay {
    port: u16,
    handle: JoinHandle<Observed>,
}

impl MockRelay {
    /// Binds a free port and starts serving in the background.
    pub fn start(behavior: RelayBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("should bind mock relay");
        let port = listener.local_addr().expect("should have local addr").port();
        let handle = thread::spawn(move || {
            let (socket, _) = listener.accept().expect("should accept probe");
            serve(socket, &behavior)
        });
        Self { port, handle }
    }

    /// Port the mock listens on.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// A probe config aimed at this mock with a short timeout.
    pub fn config(&self) -> ProbeConfig {
        ProbeConfig::default()
            .with_target("127.0.0.1", self.port)
            .with_timeout_seconds(1)
    }

    /// Waits for the connection to end and returns what was observed.
    pub fn finish(self) -> Observed {
        self.handle.join().expect("mock relay thread panicked")
    }
}

/// Returns a localhost port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("should bind");
    listener.local_addr().expect("should have local addr").port()
}

/// Encodes an unmasked server text frame.
pub fn server_frame(text: &str) -> Vec<u8> {
    let payload = text.as_bytes();
    let mut frame = vec![0x80 | Opcode::Text.as_u8()];
    match u8::try_from(payload.len()) {
        Ok(len) if len <= 125 => frame.push(len),
        _ => {
            let len = u16::try_from(payload.len()).expect("mock frames stay under 64 KiB");
            frame.push(126);
            frame.extend_from_slice(&len.to_be_bytes());
        }
    }
    frame.extend_from_slice(payload);
    frame
}

fn serve(mut socket: TcpStream, behavior: &RelayBehavior) -> Observed {
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("should set read timeout");

    let mut observed = Observed {
        all_masked: true,
        ..Observed::default()
    };
    let mut buffer = Vec::new();

    let head_len = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if !read_more(&mut socket, &mut buffer) {
            return observed;
        }
    };
    observed.request_head = String::from_utf8_lossy(&buffer[..head_len]).into_owned();
    buffer.drain(..head_len);

    let key = observed
        .request_head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("sec-websocket-key")
                .then(|| value.trim().to_string())
        })
        .unwrap_or_default();

    let response = match behavior {
        RelayBehavior::RefuseUpgrade(status) => {
            format!("HTTP/1.1 {status} Forbidden\r\nContent-Length: 0\r\n\r\n")
        }
        RelayBehavior::WrongAccept => "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: bm90IHRoZSByaWdodCBrZXk=\r\n\r\n"
            .to_string(),
        _ => format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            compute_accept_key(&key)
        ),
    };
    if socket.write_all(response.as_bytes()).is_err() {
        return observed;
    }
    if matches!(
        behavior,
        RelayBehavior::RefuseUpgrade(_) | RelayBehavior::WrongAccept
    ) {
        return observed;
    }

    match behavior {
        RelayBehavior::Trickle => {
            trickle(&mut socket);
            return observed;
        }
        RelayBehavior::OversizedHeader => {
            let mut header = vec![0x81, 127];
            header.extend_from_slice(&(1u64 << 30).to_be_bytes());
            let _ = socket.write_all(&header);
        }
        _ => {}
    }

    loop {
        while let Ok(Some((frame, used))) = decode_frame(&buffer) {
            buffer.drain(..used);
            observed.all_masked &= frame.mask.is_some();
            let Ok(text) = frame.text() else { continue };
            let Ok(message) = ClientMessage::from_json(text) else {
                continue;
            };
            if let Some(reply) = reply_for(&message, behavior) {
                let _ = socket.write_all(&server_frame(&reply));
            }
            observed.messages.push(message);
        }
        if !read_more(&mut socket, &mut buffer) {
            return observed;
        }
    }
}

/// Starts a 65535-byte text frame and sends one payload byte every 200 ms
/// until the client hangs up or twenty bytes have gone out.
fn trickle(socket: &mut TcpStream) {
    if socket.write_all(&[0x81, 126, 0xFF, 0xFF]).is_err() {
        return;
    }
    for _ in 0..20 {
        thread::sleep(Duration::from_millis(200));
        if socket.write_all(b"x").is_err() {
            return;
        }
    }
}

fn reply_for(message: &ClientMessage, behavior: &RelayBehavior) -> Option<String> {
    let reply = match (message, behavior) {
        (ClientMessage::Event(event), RelayBehavior::Acknowledge) => RelayMessage::Ok {
            event_id: event.id.clone(),
            accepted: true,
            message: String::new(),
        },
        (ClientMessage::Event(event), RelayBehavior::Reject(reason)) => RelayMessage::Ok {
            event_id: event.id.clone(),
            accepted: false,
            message: reason.clone(),
        },
        (ClientMessage::Event(_), RelayBehavior::Notice(text)) => RelayMessage::Notice(text.clone()),
        _ => return None,
    };
    reply.to_json().ok()
}

fn read_more(socket: &mut TcpStream, buffer: &mut Vec<u8>) -> bool {
    let mut chunk = [0u8; 4096];
    match socket.read(&mut chunk) {
        Ok(0) | Err(_) => false,
        Ok(n) => {
            buffer.extend_from_slice(&chunk[..n]);
            true
        }
    }
}

//! WebSocket frame encoding (RFC 6455 section 5).
//!
//! Only what a probing client needs: a single FIN text frame, masked with a
//! 4-byte key, with the 7-bit or 16-bit extended length form. The decoder
//! reads one frame at a time out of a buffer and is used to peek at relay
//! replies; it does not reassemble fragments or answer control frames.

use thiserror::Error;

/// Largest payload that fits the 16-bit extended length form.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Largest length that fits directly in the 7-bit length field.
const MAX_SHORT_LEN: usize = 125;

/// Marker in the 7-bit field announcing a 16-bit length.
const LEN_16: u8 = 126;

/// Marker in the 7-bit field announcing a 64-bit length.
const LEN_64: u8 = 127;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;

/// Errors produced while encoding or decoding frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Payload does not fit the 16-bit extended length form.
    #[error("Payload of {len} bytes exceeds the {max} byte frame limit")]
    PayloadTooLarge {
        /// Actual payload length.
        len: usize,
        /// Maximum supported length.
        max: usize,
    },

    /// Opcode is reserved by RFC 6455.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Text frame payload was not valid UTF-8.
    #[error("Text frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation,
    /// UTF-8 text data.
    Text,
    /// Binary data.
    Binary,
    /// Connection close.
    Close,
    /// Ping.
    Ping,
    /// Pong.
    Pong,
}

impl Opcode {
    /// Returns the 4-bit wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Parses a 4-bit wire value.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ReservedOpcode`] for values RFC 6455 reserves.
    pub const fn from_u8(value: u8) -> Result<Self, FrameError> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(FrameError::ReservedOpcode(other)),
        }
    }
}

/// A single decoded frame with its payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Whether this is the final fragment.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Mask key, present on client-to-server frames.
    pub mask: Option<[u8; 4]>,
    /// Unmasked payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Returns the payload as text.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidUtf8`] if the payload is not UTF-8.
    pub fn text(&self) -> Result<&str, FrameError> {
        std::str::from_utf8(&self.payload).map_err(|_| FrameError::InvalidUtf8)
    }
}

/// XORs `bytes` in place with the repeating 4-byte `mask`.
///
/// Applying the same mask twice restores the original bytes.
pub fn apply_mask(bytes: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Encodes `payload` as a masked FIN text frame with a random mask key.
///
/// # Errors
///
/// Returns [`FrameError::PayloadTooLarge`] for payloads of 65536 bytes or more.
///
/// # Example
///
/// ```
/// use relay_probe::ws::encode_frame;
///
/// let frame = encode_frame("hi").unwrap();
/// assert_eq!(frame[0], 0x81);
/// assert_eq!(frame[1], 0x82);
/// assert_eq!(frame.len(), 2 + 4 + 2);
/// ```
pub fn encode_frame(payload: &str) -> Result<Vec<u8>, FrameError> {
    encode_frame_with_mask(payload, rand::random())
}

/// Encodes `payload` as a masked FIN text frame using the given mask key.
///
/// # Errors
///
/// Returns [`FrameError::PayloadTooLarge`] for payloads of 65536 bytes or more.
pub fn encode_frame_with_mask(payload: &str, mask: [u8; 4]) -> Result<Vec<u8>, FrameError> {
    let bytes = payload.as_bytes();
    let len = bytes.len();

    let mut frame = Vec::with_capacity(4 + 4 + len);
    frame.push(FIN_BIT | Opcode::Text.as_u8());
    match u8::try_from(len) {
        Ok(short) if len <= MAX_SHORT_LEN => frame.push(MASK_BIT | short),
        _ => {
            let extended = u16::try_from(len).map_err(|_| FrameError::PayloadTooLarge {
                len,
                max: MAX_PAYLOAD_LEN,
            })?;
            frame.push(MASK_BIT | LEN_16);
            frame.extend_from_slice(&extended.to_be_bytes());
        }
    }

    frame.extend_from_slice(&mask);
    let body_start = frame.len();
    frame.extend_from_slice(bytes);
    apply_mask(&mut frame[body_start..], mask);

    Ok(frame)
}

/// Decodes one frame from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet hold a complete frame, otherwise
/// the frame and the number of bytes it occupied.
///
/// # Errors
///
/// Returns [`FrameError::ReservedOpcode`] for reserved opcodes and
/// [`FrameError::PayloadTooLarge`] if a 64-bit length does not fit `usize`.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    decode_frame_limited(buf, usize::MAX)
}

/// Like [`decode_frame`], but rejects any frame whose declared payload length
/// exceeds `max_payload` as soon as the length field has arrived.
///
/// # Errors
///
/// Returns [`FrameError::PayloadTooLarge`] for an oversized declared length
/// and [`FrameError::ReservedOpcode`] for reserved opcodes.
pub fn decode_frame_limited(
    buf: &[u8],
    max_payload: usize,
) -> Result<Option<(Frame, usize)>, FrameError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let fin = buf[0] & FIN_BIT != 0;
    let opcode = Opcode::from_u8(buf[0] & 0x0F)?;
    let masked = buf[1] & MASK_BIT != 0;
    let short_len = buf[1] & 0x7F;

    let mut offset = 2;
    let len = match short_len {
        LEN_16 => {
            let Some(raw) = buf.get(offset..offset + 2) else {
                return Ok(None);
            };
            offset += 2;
            usize::from(u16::from_be_bytes([raw[0], raw[1]]))
        }
        LEN_64 => {
            let Some(raw) = buf.get(offset..offset + 8) else {
                return Ok(None);
            };
            offset += 8;
            let mut wide = [0u8; 8];
            wide.copy_from_slice(raw);
            let declared = u64::from_be_bytes(wide);
            usize::try_from(declared).map_err(|_| FrameError::PayloadTooLarge {
                len: usize::MAX,
                max: max_payload,
            })?
        }
        n => usize::from(n),
    };
    if len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            len,
            max: max_payload,
        });
    }

    let mask = if masked {
        let Some(raw) = buf.get(offset..offset + 4) else {
            return Ok(None);
        };
        offset += 4;
        Some([raw[0], raw[1], raw[2], raw[3]])
    } else {
        None
    };

    let end = offset.saturating_add(len);
    let Some(body) = buf.get(offset..end) else {
        return Ok(None);
    };

    let mut payload = body.to_vec();
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok(Some((
        Frame {
            fin,
            opcode,
            mask,
            payload,
        },
        end,
    )))
}

//! RFC6455 base framing (panic-free, sans-io).
//!
//! Parsing rules:
//! - Never index the input buffer: peek through a `Buf` cursor with
//!   `remaining()` checks and only consume once the whole frame is present.
//! - A declared length above the configured maximum fails before any payload
//!   is buffered.
//! - Server-originated frames are never masked; `encode_masked_frame` exists
//!   for client roles only.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WsDockError};

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Close status codes used by the engine.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint is going away (server shutdown).
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Message too big.
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    /// Unexpected server condition.
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    /// Parse the low nibble of the first header byte.
    pub fn from_u8(b: u8) -> Result<Self> {
        match b {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(WsDockError::Protocol(format!("reserved opcode {other:#x}"))),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    /// Close, ping and pong.
    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// One protocol unit on the wire. `payload` is always stored unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    /// Mask key the frame carried on the wire, if any.
    pub mask: Option<[u8; 4]>,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::new(true, OpCode::Text, Bytes::from(s.into()))
    }

    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, payload)
    }

    pub fn close(code: u16, reason: &str) -> Self {
        Self::new(true, OpCode::Close, close_payload(code, reason))
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Encode as a server frame (never masked).
    pub fn encode(&self, dst: &mut BytesMut) {
        encode_frame(self.fin, self.opcode, &self.payload, dst);
    }
}

/// Encode an unmasked frame into `dst`.
pub fn encode_frame(fin: bool, opcode: OpCode, payload: &[u8], dst: &mut BytesMut) {
    put_header(fin, opcode, None, payload.len(), dst);
    dst.put_slice(payload);
}

/// Encode a masked frame into `dst` (client -> server direction).
pub fn encode_masked_frame(
    fin: bool,
    opcode: OpCode,
    payload: &[u8],
    mask: [u8; 4],
    dst: &mut BytesMut,
) {
    put_header(fin, opcode, Some(mask), payload.len(), dst);
    let mut body = BytesMut::from(payload);
    apply_mask(&mut body, mask);
    dst.put_slice(&body);
}

fn put_header(fin: bool, opcode: OpCode, mask: Option<[u8; 4]>, len: usize, dst: &mut BytesMut) {
    dst.reserve(14 + len);

    let mut b0 = opcode.as_u8();
    if fin {
        b0 |= 0x80;
    }
    dst.put_u8(b0);

    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
    if len <= MAX_CONTROL_PAYLOAD {
        dst.put_u8(mask_bit | len as u8);
    } else if let Ok(short) = u16::try_from(len) {
        dst.put_u8(mask_bit | 126);
        dst.put_u16(short);
    } else {
        dst.put_u8(mask_bit | 127);
        dst.put_u64(len as u64);
    }

    if let Some(m) = mask {
        dst.put_slice(&m);
    }
}

/// XOR `buf` in place with `mask`, byte `i` against `mask[i % 4]`.
/// Applying it twice with the same mask restores the input.
pub fn apply_mask(buf: &mut [u8], mask: [u8; 4]) {
    for (b, m) in buf.iter_mut().zip(mask.iter().cycle()) {
        *b ^= m;
    }
}

/// Build a close payload: status code (big-endian) followed by a UTF-8 reason.
/// The reason is truncated so the payload fits a control frame.
pub fn close_payload(code: u16, reason: &str) -> Bytes {
    let mut cut = reason.len().min(MAX_CONTROL_PAYLOAD - 2);
    while !reason.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut buf = BytesMut::with_capacity(2 + cut);
    buf.put_u16(code);
    buf.put_slice(reason.get(..cut).unwrap_or_default().as_bytes());
    buf.freeze()
}

/// Parse a close payload. An empty payload carries no status.
pub fn parse_close_payload(payload: &[u8]) -> Result<Option<(u16, String)>> {
    let mut buf = payload;
    match buf.remaining() {
        0 => Ok(None),
        1 => Err(WsDockError::Protocol("close payload of one byte".into())),
        _ => {
            let code = buf.get_u16();
            let reason = std::str::from_utf8(buf)
                .map_err(|_| WsDockError::Protocol("close reason is not utf-8".into()))?;
            Ok(Some((code, reason.to_owned())))
        }
    }
}

/// Incremental frame decoder bounded by a maximum payload length.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_payload: u64,
}

impl FrameDecoder {
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload as u64,
        }
    }

    pub fn max_payload(&self) -> u64 {
        self.max_payload
    }

    /// Decode one frame from the front of `src`.
    ///
    /// Returns `Ok(None)` (consuming nothing) while the frame is incomplete.
    /// On success the frame's bytes are removed from `src` and the payload is
    /// returned unmasked.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let mut peek: &[u8] = src.as_ref();

        if peek.remaining() < 2 {
            return Ok(None);
        }
        let b0 = peek.get_u8();
        let b1 = peek.get_u8();

        if b0 & 0x70 != 0 {
            return Err(WsDockError::Protocol("reserved bits set".into()));
        }
        let fin = b0 & 0x80 != 0;
        let opcode = OpCode::from_u8(b0 & 0x0F)?;
        let masked = b1 & 0x80 != 0;

        let len = match b1 & 0x7F {
            126 => {
                if peek.remaining() < 2 {
                    return Ok(None);
                }
                u64::from(peek.get_u16())
            }
            127 => {
                if peek.remaining() < 8 {
                    return Ok(None);
                }
                let l = peek.get_u64();
                if l >> 63 != 0 {
                    return Err(WsDockError::Protocol(
                        "64-bit length has the most significant bit set".into(),
                    ));
                }
                l
            }
            l => u64::from(l),
        };

        if opcode.is_control() {
            if !fin {
                return Err(WsDockError::Protocol("fragmented control frame".into()));
            }
            if len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(WsDockError::Protocol("control frame payload over 125 bytes".into()));
            }
        }

        // Fail fast: never buffer a payload we are going to reject.
        if len > self.max_payload {
            return Err(WsDockError::PayloadTooLarge);
        }
        let len = usize::try_from(len).map_err(|_| WsDockError::PayloadTooLarge)?;

        let mask = if masked {
            if peek.remaining() < 4 {
                return Ok(None);
            }
            let mut m = [0u8; 4];
            peek.copy_to_slice(&mut m);
            Some(m)
        } else {
            None
        };

        let available = peek.remaining();
        let header_len = src.len() - available;
        if available < len {
            src.reserve((header_len + len).saturating_sub(src.len()));
            return Ok(None);
        }

        src.advance(header_len);
        let mut payload = src.split_to(len);
        if let Some(m) = mask {
            apply_mask(&mut payload, m);
        }

        Ok(Some(Frame {
            fin,
            opcode,
            mask,
            payload: payload.freeze(),
        }))
    }
}

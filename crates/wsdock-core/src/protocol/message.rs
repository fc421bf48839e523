//! Message reassembly from data frames.
//!
//! Control frames never reach the assembler; the connection answers them
//! inline. The size limit is checked on every frame so a fragmented message
//! can never hold more than the limit in memory.

use bytes::{Bytes, BytesMut};

use crate::error::{Result, WsDockError};
use crate::protocol::frame::{Frame, OpCode};

/// Kind of a logical message, taken from its first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
}

/// A complete application-level message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl Message {
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            payload: Bytes::from(s.into()),
        }
    }

    pub fn binary(b: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload: b.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Borrow the payload as UTF-8 text. Binary messages are rejected.
    pub fn as_text(&self) -> Result<&str> {
        if self.kind != MessageKind::Text {
            return Err(WsDockError::BadRequest("binary messages are not supported".into()));
        }
        std::str::from_utf8(&self.payload)
            .map_err(|_| WsDockError::BadRequest("text message is not valid utf-8".into()))
    }
}

/// Accumulates fragments until a frame with `fin` set completes the message.
#[derive(Debug)]
pub struct MessageAssembler {
    max_size: usize,
    kind: Option<MessageKind>,
    buf: BytesMut,
}

impl MessageAssembler {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            kind: None,
            buf: BytesMut::new(),
        }
    }

    /// True while a fragmented message is waiting for more frames.
    pub fn in_progress(&self) -> bool {
        self.kind.is_some()
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partially assembled message.
    pub fn reset(&mut self) {
        self.kind = None;
        self.buf.clear();
    }

    /// Feed one data frame. Returns the message once `fin` is seen.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        let kind = match (frame.opcode, self.kind) {
            (OpCode::Continuation, Some(k)) => k,
            (OpCode::Continuation, None) => {
                return Err(WsDockError::Protocol(
                    "continuation frame without a started message".into(),
                ));
            }
            (OpCode::Text, None) => MessageKind::Text,
            (OpCode::Binary, None) => MessageKind::Binary,
            (OpCode::Text | OpCode::Binary, Some(_)) => {
                return Err(WsDockError::Protocol(
                    "new data frame inside a fragmented message".into(),
                ));
            }
            (op, _) => {
                return Err(WsDockError::Internal(format!(
                    "control frame {op:?} passed to message assembler"
                )));
            }
        };

        if self.buf.len().saturating_add(frame.payload.len()) > self.max_size {
            self.reset();
            return Err(WsDockError::PayloadTooLarge);
        }

        if frame.fin {
            self.kind = None;
            let payload = if self.buf.is_empty() {
                frame.payload
            } else {
                self.buf.extend_from_slice(&frame.payload);
                self.buf.split().freeze()
            };
            return Ok(Some(Message { kind, payload }));
        }

        self.buf.extend_from_slice(&frame.payload);
        self.kind = Some(kind);
        Ok(None)
    }
}

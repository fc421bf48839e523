//! Protocol modules (RFC6455 framing + application envelope).
//!
//! - `frame`: base framing codec over `bytes` buffers.
//! - `message`: reassembly of fragmented data frames under a size limit.
//! - `envelope`: JSON envelope carried inside text messages and the engine's
//!   own `{"code","msg","data"}` replies.
//!
//! All parsers are panic-free: malformed input is reported as `WsDockError`
//! instead of panicking or indexing raw buffers, keeping the gateway resilient
//! to hostile traffic.

pub mod envelope;
pub mod frame;
pub mod message;

pub use envelope::{parse_envelope, Envelope, Reply};
pub use frame::{close_code, Frame, FrameDecoder, OpCode};
pub use message::{Message, MessageAssembler, MessageKind};

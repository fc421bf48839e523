//! wsDock core: transport-agnostic protocol primitives and error types.
//!
//! This crate defines the RFC6455 frame codec, the application envelope, and
//! the error surface shared by the gateway and tooling. It carries no
//! transport or runtime dependencies: the codec works on `bytes` buffers and
//! the caller owns all I/O.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `WsDockError`/`Result` so production
//! processes do not crash on malformed input or bad traffic.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ClientCode, Result, WsDockError};

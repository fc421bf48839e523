//! Top-level facade crate for wsDock.
//!
//! Re-exports the codec/error crate and the gateway library so users can depend on a single crate.

pub mod core {
    pub use wsdock_core::*;
}

pub mod gateway {
    pub use wsdock_gateway::*;
}

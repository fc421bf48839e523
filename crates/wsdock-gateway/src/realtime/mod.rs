//! Connection registry and lifecycle events.

pub mod events;
pub mod registry;

pub use events::{ConnEvent, ConnEventBus, ConnEventKind, ConnEventListener};
pub use registry::{ConnInfo, ConnRegistry, Delivery, DeliveryFailure};

//! Domain events and their distribution.
//!
//! Aggregates emit [`Event`]s; the infrastructure layer wraps them in an
//! [`EventEnvelope`] after the state change is durable and fans them out over
//! an [`EventBus`] to projections such as the low-stock monitor.

pub mod bus;
pub mod cursor;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use cursor::StreamCursors;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

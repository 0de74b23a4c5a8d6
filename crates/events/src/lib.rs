//! `rentworks-events` — event and messaging abstractions.
//!
//! Domain events, envelopes, and the pub/sub bus used to feed read-model
//! projections and post-commit notification hooks.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::InMemoryEventBus;

//! Event dispatch

pub mod bus;
pub mod form_events;

pub use bus::{BoxFuture, BusEvent, EventBus, ListenerId, Subscription, DEFAULT_MAX_LISTENERS};
pub use form_events::{FormEvent, FormEventKind};

//! Gridform - a framework-agnostic form engine
//!
//! Nested values addressed by path, derived field and form state, trigger
//! aware validation with caching and cancellation, and a responsive span
//! based grid layout, coordinated by [`Form`]. Rendering adapters drive a
//! form through its public methods and observe it through [`FormEvent`]s.

pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod fields;
pub mod form;
pub mod layout;
pub mod state;
mod sync;
pub mod validation;

pub use config::{FormConfig, FormDefinition, GroupSpec};
pub use error::{FormError, Result};
pub use events::{EventBus, FormEvent, FormEventKind};
pub use fields::{Condition, FieldConfig, FieldGroup};
pub use form::{Form, FormCallbacks, FormOptions, SubmitOutcome};
pub use validation::{Trigger, ValidationRule};

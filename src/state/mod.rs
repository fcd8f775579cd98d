//! Field and form state

mod field_state;
mod form_state;
mod store;

pub use field_state::{FieldState, GENERIC_ERROR};
pub use form_state::FormState;
pub use store::{StateChange, StateStore, StateSubscriberId};

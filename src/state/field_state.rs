//! Per-field state

use serde::Serialize;
use serde_json::Value;

/// Message recorded when a validator fails without saying why
pub const GENERIC_ERROR: &str = "validation failed";

/// Live state of one registered field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldState {
    pub value: Value,
    pub initial_value: Value,
    pub touched: bool,
    pub dirty: bool,
    pub validating: bool,
    pub valid: bool,
    pub errors: Vec<String>,
    pub disabled: bool,
    pub readonly: bool,
    pub visible: bool,
}

impl FieldState {
    pub fn new(initial_value: Value) -> Self {
        Self {
            value: initial_value.clone(),
            initial_value,
            touched: false,
            dirty: false,
            validating: false,
            valid: true,
            errors: Vec::new(),
            disabled: false,
            readonly: false,
            visible: true,
        }
    }

    pub fn set_value(&mut self, value: Value) {
        self.dirty = value != self.initial_value;
        self.value = value;
    }

    /// Record a validation outcome, keeping `valid == errors.is_empty()`
    pub fn set_validation_result(&mut self, valid: bool, errors: Vec<String>) {
        self.validating = false;
        if valid {
            self.valid = true;
            self.errors.clear();
        } else {
            self.valid = false;
            self.errors = if errors.is_empty() {
                vec![GENERIC_ERROR.to_string()]
            } else {
                errors
            };
        }
    }

    /// Back to the registered value; disabled/readonly/visible are kept
    pub fn reset(&mut self) {
        self.value = self.initial_value.clone();
        self.touched = false;
        self.dirty = false;
        self.validating = false;
        self.valid = true;
        self.errors.clear();
    }

    /// The attributes that feed the aggregate form state
    pub(crate) fn aggregate_key(&self) -> (bool, bool, bool, usize) {
        (self.valid, self.dirty, self.touched, self.errors.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dirty_tracks_initial_value() {
        let mut state = FieldState::new(json!("John"));
        state.set_value(json!("Alice"));
        assert!(state.dirty);
        state.set_value(json!("John"));
        assert!(!state.dirty);
    }

    #[test]
    fn test_failing_result_without_messages_gets_generic_error() {
        let mut state = FieldState::new(json!(null));
        state.set_validation_result(false, Vec::new());
        assert!(!state.valid);
        assert_eq!(state.errors, vec![GENERIC_ERROR.to_string()]);

        state.set_validation_result(true, vec!["ignored".into()]);
        assert!(state.valid);
        assert!(state.errors.is_empty());
    }

    #[test]
    fn test_reset_keeps_flags() {
        let mut state = FieldState::new(json!(1));
        state.disabled = true;
        state.touched = true;
        state.set_value(json!(2));
        state.reset();

        assert_eq!(state.value, json!(1));
        assert!(!state.touched);
        assert!(state.disabled);
    }
}

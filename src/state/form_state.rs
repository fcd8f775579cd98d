//! Aggregate form state

use super::field_state::FieldState;
use serde::Serialize;

/// Whole-form state derived from every registered field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    pub submitting: bool,
    pub validating: bool,
    pub valid: bool,
    pub dirty: bool,
    pub touched: bool,
    pub pristine: bool,
    pub error_count: usize,
    pub field_count: usize,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            submitting: false,
            validating: false,
            valid: true,
            dirty: false,
            touched: false,
            pristine: true,
            error_count: 0,
            field_count: 0,
        }
    }
}

impl FormState {
    /// Recompute the derived attributes from `fields`; `submitting` and
    /// `validating` are owned by the form and carried over.
    pub fn recompute<'a>(&mut self, fields: impl IntoIterator<Item = &'a FieldState>) {
        let mut valid = true;
        let mut dirty = false;
        let mut touched = false;
        let mut error_count = 0;
        let mut field_count = 0;

        for field in fields {
            valid &= field.valid;
            dirty |= field.dirty;
            touched |= field.touched;
            error_count += field.errors.len();
            field_count += 1;
        }

        self.valid = valid;
        self.dirty = dirty;
        self.touched = touched;
        self.pristine = !dirty;
        self.error_count = error_count;
        self.field_count = field_count;
    }
}

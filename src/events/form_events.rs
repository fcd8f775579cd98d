//! Events emitted by a [`Form`](crate::form::Form)

use super::bus::BusEvent;
use crate::data::DataChange;
use crate::state::StateChange;
use crate::validation::FormValidationResult;
use serde_json::Value;
use std::fmt;

/// Everything a rendering adapter can observe on a form
#[derive(Debug, Clone)]
pub enum FormEvent {
    /// A path in the value store changed (empty path for whole-store writes)
    DataChange(DataChange),
    /// A field or the aggregate form state changed
    StateChange(StateChange),
    FieldChange {
        name: String,
        value: Value,
        old_value: Value,
    },
    FieldBlur {
        name: String,
    },
    FieldFocus {
        name: String,
    },
    ValidateStart {
        fields: Vec<String>,
    },
    ValidateEnd(FormValidationResult),
    SubmitStart {
        values: Value,
    },
    SubmitSuccess {
        values: Value,
    },
    /// Submission stopped by failed validation (`validation` set) or by the
    /// submit handler
    SubmitError {
        message: String,
        validation: Option<FormValidationResult>,
    },
    Reset {
        values: Value,
    },
    ExpandChange {
        expanded: bool,
    },
    /// A field was registered after construction at display position `index`
    FieldAdded {
        name: String,
        index: usize,
    },
    FieldRemoved {
        name: String,
        index: usize,
    },
    FieldUpdated {
        name: String,
    },
    FieldMoved {
        name: String,
        from: usize,
        to: usize,
    },
    GroupCollapse {
        name: String,
        collapsed: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormEventKind {
    DataChange,
    StateChange,
    FieldChange,
    FieldBlur,
    FieldFocus,
    ValidateStart,
    ValidateEnd,
    SubmitStart,
    SubmitSuccess,
    SubmitError,
    Reset,
    ExpandChange,
    FieldAdded,
    FieldRemoved,
    FieldUpdated,
    FieldMoved,
    GroupCollapse,
}

impl FormEventKind {
    pub const ALL: [FormEventKind; 17] = [
        FormEventKind::DataChange,
        FormEventKind::StateChange,
        FormEventKind::FieldChange,
        FormEventKind::FieldBlur,
        FormEventKind::FieldFocus,
        FormEventKind::ValidateStart,
        FormEventKind::ValidateEnd,
        FormEventKind::SubmitStart,
        FormEventKind::SubmitSuccess,
        FormEventKind::SubmitError,
        FormEventKind::Reset,
        FormEventKind::ExpandChange,
        FormEventKind::FieldAdded,
        FormEventKind::FieldRemoved,
        FormEventKind::FieldUpdated,
        FormEventKind::FieldMoved,
        FormEventKind::GroupCollapse,
    ];

    /// Wire name used by adapters, e.g. `"data:change"`
    pub fn name(self) -> &'static str {
        match self {
            FormEventKind::DataChange => "data:change",
            FormEventKind::StateChange => "state:change",
            FormEventKind::FieldChange => "field:change",
            FormEventKind::FieldBlur => "field:blur",
            FormEventKind::FieldFocus => "field:focus",
            FormEventKind::ValidateStart => "validate:start",
            FormEventKind::ValidateEnd => "validate:end",
            FormEventKind::SubmitStart => "submit:start",
            FormEventKind::SubmitSuccess => "submit:success",
            FormEventKind::SubmitError => "submit:error",
            FormEventKind::Reset => "reset",
            FormEventKind::ExpandChange => "expand:change",
            FormEventKind::FieldAdded => "field:added",
            FormEventKind::FieldRemoved => "field:removed",
            FormEventKind::FieldUpdated => "field:updated",
            FormEventKind::FieldMoved => "field:moved",
            FormEventKind::GroupCollapse => "group:collapse",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for FormEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl BusEvent for FormEvent {
    type Kind = FormEventKind;

    fn kind(&self) -> FormEventKind {
        match self {
            FormEvent::DataChange(_) => FormEventKind::DataChange,
            FormEvent::StateChange(_) => FormEventKind::StateChange,
            FormEvent::FieldChange { .. } => FormEventKind::FieldChange,
            FormEvent::FieldBlur { .. } => FormEventKind::FieldBlur,
            FormEvent::FieldFocus { .. } => FormEventKind::FieldFocus,
            FormEvent::ValidateStart { .. } => FormEventKind::ValidateStart,
            FormEvent::ValidateEnd(_) => FormEventKind::ValidateEnd,
            FormEvent::SubmitStart { .. } => FormEventKind::SubmitStart,
            FormEvent::SubmitSuccess { .. } => FormEventKind::SubmitSuccess,
            FormEvent::SubmitError { .. } => FormEventKind::SubmitError,
            FormEvent::Reset { .. } => FormEventKind::Reset,
            FormEvent::ExpandChange { .. } => FormEventKind::ExpandChange,
            FormEvent::FieldAdded { .. } => FormEventKind::FieldAdded,
            FormEvent::FieldRemoved { .. } => FormEventKind::FieldRemoved,
            FormEvent::FieldUpdated { .. } => FormEventKind::FieldUpdated,
            FormEvent::FieldMoved { .. } => FormEventKind::FieldMoved,
            FormEvent::GroupCollapse { .. } => FormEventKind::GroupCollapse,
        }
    }
}

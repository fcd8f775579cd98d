//! Error types for the form engine

use thiserror::Error;

/// Errors raised by the form engine
#[derive(Debug, Error)]
pub enum FormError {
    /// A component was used after `destroy()`
    #[error("{0} has been destroyed")]
    Destroyed(&'static str),

    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("index {index} out of range for `{path}` (len {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("invalid span: {0}")]
    InvalidSpan(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// The submit handler returned an error
    #[error("submit failed: {0}")]
    Submit(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, FormError>;

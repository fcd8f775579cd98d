//! Responsive span-based grid layout

pub mod calculator;
mod debounce;
mod engine;
mod grouping;
mod responsive;
mod types;

pub use debounce::Debouncer;
pub use engine::LayoutEngine;
pub use grouping::group_rows;
pub use responsive::{BreakpointName, Breakpoints};
pub use types::{
    ButtonMode, ButtonPosition, FieldLayout, GroupedLayout, GroupingOptions, LabelAlign,
    LabelWidth, LayoutConfig, LayoutField, LayoutResult, Spacing, Span,
};

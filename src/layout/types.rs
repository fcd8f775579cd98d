//! Layout configuration and results

use super::responsive::{BreakpointName, Breakpoints};
use crate::error::FormError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Number of grid columns a field asks for
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Span {
    Columns(i64),
    /// Whole row, written `-1`
    Full,
    /// Share of the row, written `"50%"`
    Percent(f64),
}

impl Default for Span {
    fn default() -> Self {
        Span::Columns(1)
    }
}

impl Span {
    /// Concrete column count within `[1, columns]`
    pub fn resolve(self, columns: usize) -> usize {
        let columns = columns.max(1);
        match self {
            Span::Full => columns,
            Span::Columns(n) => usize::try_from(n).unwrap_or(1).clamp(1, columns),
            Span::Percent(pct) => {
                let span = (pct / 100.0 * columns as f64).floor();
                if span.is_finite() && span >= 1.0 {
                    (span as usize).min(columns)
                } else {
                    1
                }
            }
        }
    }
}

impl From<i64> for Span {
    fn from(n: i64) -> Self {
        if n == -1 {
            Span::Full
        } else {
            Span::Columns(n)
        }
    }
}

impl FromStr for Span {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || FormError::InvalidSpan(s.to_string());
        if let Some(pct) = s.strip_suffix('%') {
            return pct.trim().parse::<f64>().map(Span::Percent).map_err(|_| invalid());
        }
        if let Ok(n) = s.parse::<i64>() {
            return Ok(Span::from(n));
        }
        s.parse::<f64>()
            .map(|n| Span::from(n.floor() as i64))
            .map_err(|_| invalid())
    }
}

impl TryFrom<Value> for Span {
    type Error = FormError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::Null => Ok(Span::default()),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.floor() as i64))
                .map(Span::from)
                .ok_or_else(|| FormError::InvalidSpan(value.to_string())),
            Value::String(s) => s.parse(),
            _ => Err(FormError::InvalidSpan(value.to_string())),
        }
    }
}

impl From<Span> for Value {
    fn from(span: Span) -> Self {
        match span {
            Span::Columns(n) => Value::from(n),
            Span::Full => Value::from(-1),
            Span::Percent(pct) => Value::from(format!("{pct}%")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelAlign {
    Left,
    #[default]
    Right,
    Top,
}

/// `"auto"` or a pixel width
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum LabelWidth {
    #[default]
    Auto,
    Fixed(f64),
}

impl TryFrom<Value> for LabelWidth {
    type Error = FormError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::Null => Ok(LabelWidth::Auto),
            Value::Number(n) => n
                .as_f64()
                .map(LabelWidth::Fixed)
                .ok_or_else(|| FormError::InvalidSpan(value.to_string())),
            Value::String(s) if s == "auto" => Ok(LabelWidth::Auto),
            Value::String(s) => s
                .trim_end_matches("px")
                .trim()
                .parse()
                .map(LabelWidth::Fixed)
                .map_err(|_| FormError::InvalidSpan(format!("label width {s}"))),
            _ => Err(FormError::InvalidSpan(format!("label width {value}"))),
        }
    }
}

impl From<LabelWidth> for Value {
    fn from(width: LabelWidth) -> Self {
        match width {
            LabelWidth::Auto => Value::from("auto"),
            LabelWidth::Fixed(px) => Value::from(px),
        }
    }
}

/// Where the action buttons go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonMode {
    /// After the last field when the row has room
    #[default]
    Inline,
    /// Always on a row of their own
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    /// Pixel width of one column when deriving the count from the container
    pub span_width: f64,
    pub max_span: usize,
    pub min_span: usize,
    /// Fixed column count, overriding everything else
    pub columns: Option<usize>,
    pub space: f64,
    pub gap: f64,
    pub label_align: LabelAlign,
    pub label_width: LabelWidth,
    pub responsive: bool,
    pub breakpoints: Breakpoints,
    /// Stretch the last field of an under-full row
    pub adjust_span: bool,
    pub debounce_ms: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            span_width: 200.0,
            max_span: 4,
            min_span: 1,
            columns: None,
            space: 16.0,
            gap: 8.0,
            label_align: LabelAlign::default(),
            label_width: LabelWidth::default(),
            responsive: true,
            breakpoints: Breakpoints::default(),
            adjust_span: false,
            debounce_ms: 100,
        }
    }
}

/// What the layout needs to know about a field
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutField {
    pub name: String,
    pub label: Option<String>,
    pub span: Span,
    pub visible: bool,
    pub required: bool,
}

impl LayoutField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            span: Span::default(),
            visible: true,
            required: false,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Position of one field in the grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldLayout {
    pub name: String,
    pub span: usize,
    pub row: usize,
    pub column: usize,
    pub visible: bool,
    pub in_preview: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResult {
    pub columns: usize,
    pub column_width: f64,
    pub label_width: f64,
    pub container_width: f64,
    pub need_wrap: bool,
    pub breakpoint: Option<BreakpointName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ButtonPosition {
    pub row: usize,
    pub column: usize,
    pub span: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Spacing {
    pub space: f64,
    pub gap: f64,
}

/// Preview/more split for collapsible forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingOptions {
    /// Rows shown while collapsed; 0 shows everything
    pub preview_rows: usize,
    pub collapsed: bool,
    /// Columns kept free on the last preview row while collapsed
    pub reserved_columns: usize,
    pub button_mode: ButtonMode,
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self {
            preview_rows: 1,
            collapsed: true,
            reserved_columns: 0,
            button_mode: ButtonMode::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedLayout {
    pub preview: Vec<Vec<FieldLayout>>,
    pub more: Vec<Vec<FieldLayout>>,
    /// Widest label per start column
    pub label_widths: Vec<f64>,
}

impl GroupedLayout {
    pub fn preview_count(&self) -> usize {
        self.preview.iter().map(Vec::len).sum()
    }

    pub fn more_count(&self) -> usize {
        self.more.iter().map(Vec::len).sum()
    }
}

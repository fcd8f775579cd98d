//! Pure grid arithmetic: columns, labels, buttons

use super::types::{ButtonMode, ButtonPosition, FieldLayout, LayoutField};
use std::collections::HashMap;

pub const FONT_SIZE: f64 = 14.0;
pub const LABEL_PADDING: f64 = 8.0;
pub const REQUIRED_MARKER_WIDTH: f64 = 8.0;
pub const MIN_LABEL_WIDTH: f64 = 80.0;

/// `clamp(floor(width / span_width), min_span, max_span)`; degenerate
/// inputs fall back to `min_span`
pub fn calculate_columns(width: f64, span_width: f64, max_span: usize, min_span: usize) -> usize {
    let min_span = min_span.max(1);
    let max_span = max_span.max(min_span);
    if width <= 0.0 || span_width <= 0.0 || !width.is_finite() {
        return min_span;
    }
    let fit = (width / span_width).floor() as usize;
    fit.clamp(min_span, max_span)
}

fn is_cjk(c: char) -> bool {
    ('\u{4E00}'..='\u{9FA5}').contains(&c)
}

/// Estimated rendered width of `text`
pub fn text_width(text: &str, font_size: f64) -> f64 {
    text.chars()
        .map(|c| if is_cjk(c) { font_size } else { font_size * 0.6 })
        .sum()
}

/// Label column width needed for one label
pub fn label_width(label: &str, required: bool) -> f64 {
    let marker = if required { REQUIRED_MARKER_WIDTH } else { 0.0 };
    (text_width(label, FONT_SIZE) + LABEL_PADDING * 2.0 + 16.0 + marker).ceil()
}

/// Widest label per start column, indexed by column
pub fn label_widths_by_column(
    layouts: &[FieldLayout],
    fields: &[LayoutField],
    columns: usize,
) -> Vec<f64> {
    let by_name: HashMap<&str, &LayoutField> =
        fields.iter().map(|field| (field.name.as_str(), field)).collect();
    let mut widths = vec![0.0_f64; columns.max(1)];

    for layout in layouts.iter().filter(|layout| layout.visible) {
        let Some(field) = by_name.get(layout.name.as_str()) else {
            continue;
        };
        let width = label_width(field.label.as_deref().unwrap_or_default(), field.required);
        if let Some(slot) = widths.get_mut(layout.column) {
            *slot = slot.max(width);
        }
    }

    widths
}

/// Slot for the action buttons after `last_row`, the last row on screen.
/// Inline buttons share that row when it has room for them.
pub fn button_position(
    last_row: &[FieldLayout],
    columns: usize,
    span: usize,
    mode: ButtonMode,
) -> ButtonPosition {
    let columns = columns.max(1);
    let Some(last) = last_row.last() else {
        return ButtonPosition {
            row: 0,
            column: 0,
            span: match mode {
                ButtonMode::Block => columns,
                ButtonMode::Inline => span.clamp(1, columns),
            },
        };
    };

    match mode {
        ButtonMode::Block => ButtonPosition {
            row: last.row + 1,
            column: 0,
            span: columns,
        },
        ButtonMode::Inline => {
            let span = span.clamp(1, columns);
            let used = last.column + last.span;
            if columns - used.min(columns) >= span {
                ButtonPosition {
                    row: last.row,
                    column: used,
                    span,
                }
            } else {
                ButtonPosition {
                    row: last.row + 1,
                    column: 0,
                    span,
                }
            }
        }
    }
}

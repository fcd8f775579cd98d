//! Preview/more row grouping for collapsible forms

use super::calculator::label_widths_by_column;
use super::types::{ButtonMode, FieldLayout, GroupedLayout, GroupingOptions, LayoutField};

struct RowBuilder {
    rows: Vec<Vec<FieldLayout>>,
    current: Vec<FieldLayout>,
    row: usize,
    column: usize,
}

impl RowBuilder {
    fn close(&mut self) {
        self.rows.push(std::mem::take(&mut self.current));
        self.row += 1;
        self.column = 0;
    }
}

/// Capacity of row `row`, reduced on the last preview row while collapsed
fn row_capacity(row: usize, columns: usize, options: &GroupingOptions) -> usize {
    let reserving = options.collapsed
        && options.preview_rows > 0
        && options.reserved_columns > 0
        && row + 1 == options.preview_rows;
    if reserving {
        columns.saturating_sub(options.reserved_columns).max(1)
    } else {
        columns
    }
}

/// Pack visible fields into rows and split them into preview and more
pub fn group_rows(
    fields: &[LayoutField],
    columns: usize,
    options: &GroupingOptions,
    adjust_span: bool,
) -> GroupedLayout {
    let columns = columns.max(1);
    let mut builder = RowBuilder {
        rows: Vec::new(),
        current: Vec::new(),
        row: 0,
        column: 0,
    };

    for field in fields.iter().filter(|field| field.visible) {
        let mut span = field.span.resolve(columns);
        let mut capacity = row_capacity(builder.row, columns, options);

        if builder.column + span > capacity && !builder.current.is_empty() {
            builder.close();
            capacity = row_capacity(builder.row, columns, options);
        }
        span = span.min(capacity);

        builder.current.push(FieldLayout {
            name: field.name.clone(),
            span,
            row: builder.row,
            column: builder.column,
            visible: true,
            in_preview: false,
        });
        builder.column += span;

        if builder.column >= capacity {
            builder.close();
        }
    }
    if !builder.current.is_empty() {
        builder.close();
    }

    let mut rows = builder.rows;
    if adjust_span {
        stretch_rows(&mut rows, columns, options);
    }

    let label_widths = {
        let flat: Vec<FieldLayout> = rows.iter().flatten().cloned().collect();
        label_widths_by_column(&flat, fields, columns)
    };

    let split = if options.preview_rows == 0 {
        rows.len()
    } else {
        options.preview_rows.min(rows.len())
    };
    let more = rows.split_off(split);
    let mut preview = rows;
    for layout in preview.iter_mut().flatten() {
        layout.in_preview = true;
    }

    GroupedLayout {
        preview,
        more,
        label_widths,
    }
}

/// Widen the last field of each under-full row to fill it. The final row
/// keeps its width in inline mode, where the buttons sit beside it.
fn stretch_rows(rows: &mut [Vec<FieldLayout>], columns: usize, options: &GroupingOptions) {
    let last_index = rows.len().saturating_sub(1);
    for (index, row) in rows.iter_mut().enumerate() {
        if index == last_index && options.button_mode != ButtonMode::Block {
            continue;
        }
        let capacity = row_capacity(index, columns, options);
        let Some(last) = row.last_mut() else {
            continue;
        };
        let used = last.column + last.span;
        if used < capacity {
            last.span += capacity - used;
        }
    }
}

//! Layout engine: owns the field list and keeps the grid current

use super::calculator::{self, MIN_LABEL_WIDTH};
use super::debounce::Debouncer;
use super::grouping::group_rows;
use super::responsive::BreakpointName;
use super::types::{
    ButtonMode, ButtonPosition, FieldLayout, GroupedLayout, GroupingOptions, LabelWidth,
    LayoutConfig, LayoutField, LayoutResult, Spacing,
};
use crate::sync::lock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug)]
struct LayoutState {
    config: LayoutConfig,
    fields: Vec<LayoutField>,
    container_width: f64,
    grouping: GroupingOptions,
    result: LayoutResult,
    layouts: Vec<FieldLayout>,
    grouped: GroupedLayout,
    destroyed: bool,
}

impl LayoutState {
    fn columns_for_width(&self) -> (usize, Option<BreakpointName>) {
        let config = &self.config;
        if let Some(columns) = config.columns {
            return (columns.max(1), None);
        }
        if config.responsive {
            let breakpoint = BreakpointName::for_width(self.container_width);
            return (config.breakpoints.columns(breakpoint), Some(breakpoint));
        }
        let columns = calculator::calculate_columns(
            self.container_width,
            config.span_width,
            config.max_span,
            config.min_span,
        );
        (columns, None)
    }

    fn recalculate(&mut self) {
        let (columns, breakpoint) = self.columns_for_width();

        let grouped = group_rows(&self.fields, columns, &self.grouping, self.config.adjust_span);
        let layouts = grouped
            .preview
            .iter()
            .chain(&grouped.more)
            .flatten()
            .cloned()
            .collect();

        let label_width = match self.config.label_width {
            LabelWidth::Fixed(px) => px,
            LabelWidth::Auto => grouped
                .label_widths
                .iter()
                .copied()
                .fold(MIN_LABEL_WIDTH, f64::max),
        };
        let visible = self.fields.iter().filter(|field| field.visible).count();

        self.result = LayoutResult {
            columns,
            column_width: self.container_width.max(0.0) / columns as f64,
            label_width,
            container_width: self.container_width,
            need_wrap: columns < visible,
            breakpoint,
        };
        self.layouts = layouts;
        self.grouped = grouped;

        debug!(
            columns,
            width = self.container_width,
            fields = self.fields.len(),
            "layout recalculated"
        );
    }
}

/// Recalculate and bump the generation counter
fn refresh(state: &Mutex<LayoutState>, changes: &watch::Sender<u64>) {
    {
        let mut state = lock(state);
        if state.destroyed {
            return;
        }
        state.recalculate();
    }
    changes.send_modify(|generation| *generation += 1);
}

/// Computes field positions for the current container width.
///
/// Width changes are debounced; everything else recalculates immediately.
/// Subscribe with [`LayoutEngine::changes`] to learn when the layout moved.
pub struct LayoutEngine {
    state: Arc<Mutex<LayoutState>>,
    changes: Arc<watch::Sender<u64>>,
    debouncer: Debouncer,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        let debouncer = Debouncer::new(Duration::from_millis(config.debounce_ms));
        let mut state = LayoutState {
            config,
            fields: Vec::new(),
            container_width: 0.0,
            grouping: GroupingOptions::default(),
            result: LayoutResult {
                columns: 1,
                column_width: 0.0,
                label_width: MIN_LABEL_WIDTH,
                container_width: 0.0,
                need_wrap: false,
                breakpoint: None,
            },
            layouts: Vec::new(),
            grouped: GroupedLayout::default(),
            destroyed: false,
        };
        state.recalculate();
        let (changes, _) = watch::channel(0);

        Self {
            state: Arc::new(Mutex::new(state)),
            changes: Arc::new(changes),
            debouncer,
        }
    }

    /// Set the starting width and lay out immediately
    pub fn init(&self, width: f64) {
        {
            let mut state = lock(&self.state);
            if state.destroyed {
                return;
            }
            state.container_width = width;
        }
        self.recalculate();
    }

    pub fn config(&self) -> LayoutConfig {
        lock(&self.state).config.clone()
    }

    pub fn update_config(&self, update: impl FnOnce(&mut LayoutConfig)) {
        {
            let mut state = lock(&self.state);
            if state.destroyed {
                return;
            }
            update(&mut state.config);
        }
        self.recalculate();
    }

    pub fn update_fields(&self, fields: Vec<LayoutField>) {
        {
            let mut state = lock(&self.state);
            if state.destroyed {
                return;
            }
            state.fields = fields;
        }
        self.recalculate();
    }

    /// Debounced; an unchanged width is ignored
    pub fn update_container_width(&self, width: f64) {
        {
            let mut state = lock(&self.state);
            if state.destroyed || state.container_width == width {
                return;
            }
            state.container_width = width;
        }

        let state = Arc::clone(&self.state);
        let changes = Arc::clone(&self.changes);
        self.debouncer.call(move || refresh(&state, &changes));
    }

    pub fn set_grouping(&self, grouping: GroupingOptions) {
        {
            let mut state = lock(&self.state);
            if state.destroyed || state.grouping == grouping {
                return;
            }
            state.grouping = grouping;
        }
        self.recalculate();
    }

    pub fn grouping(&self) -> GroupingOptions {
        lock(&self.state).grouping
    }

    pub fn recalculate(&self) {
        refresh(&self.state, &self.changes);
    }

    /// Apply a pending width change now
    pub fn flush(&self) {
        if self.debouncer.cancel() {
            self.recalculate();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Generation counter, bumped after each recalculation
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn layout_result(&self) -> LayoutResult {
        lock(&self.state).result.clone()
    }

    pub fn field_layouts(&self) -> Vec<FieldLayout> {
        lock(&self.state).layouts.clone()
    }

    pub fn field_layout(&self, name: &str) -> Option<FieldLayout> {
        lock(&self.state)
            .layouts
            .iter()
            .find(|layout| layout.name == name)
            .cloned()
    }

    pub fn grouped_layout(&self) -> GroupedLayout {
        lock(&self.state).grouped.clone()
    }

    pub fn columns(&self) -> usize {
        lock(&self.state).result.columns
    }

    /// Button slot after the last row on screen: the last preview row while
    /// collapsed, otherwise the last row overall
    pub fn button_position(&self, span: usize, mode: ButtonMode) -> ButtonPosition {
        let state = lock(&self.state);
        let grouped = &state.grouped;
        let shown = if state.grouping.collapsed || grouped.more.is_empty() {
            &grouped.preview
        } else {
            &grouped.more
        };
        let last_row = shown.last().map_or(&[][..], Vec::as_slice);
        calculator::button_position(last_row, state.result.columns, span, mode)
    }

    pub fn spacing(&self) -> Spacing {
        let state = lock(&self.state);
        Spacing {
            space: state.config.space,
            gap: state.config.gap,
        }
    }

    /// Cancel pending work and freeze the current layout
    pub fn destroy(&self) {
        self.debouncer.cancel();
        let mut state = lock(&self.state);
        state.destroyed = true;
        state.fields.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        lock(&self.state).destroyed
    }
}

impl std::fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

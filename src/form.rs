//! The form orchestrator.
//!
//! [`Form`] owns one of each component and keeps them in step: writes to the
//! value store update field state, queue validation and re-evaluate field
//! conditions, and every observable step is published on the event bus.

use crate::config::{FormConfig, FormDefinition};
use crate::data::path::{get_in, parse_path, set_in};
use crate::data::{DataChange, PathStore};
use crate::error::{FormError, Result};
use crate::events::{BoxFuture, EventBus, FormEvent, FormEventKind, ListenerId, Subscription};
use crate::fields::{Condition, DependencyGraph, FieldConfig, FieldGroup, GroupManager};
use crate::layout::{ButtonMode, GroupingOptions, LayoutEngine};
use crate::state::{FieldState, FormState, StateChange, StateStore};
use crate::sync::lock;
use crate::validation::{FieldValidationResult, FormValidationResult, Trigger, ValidationEngine};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info};
use uuid::Uuid;

/// Message carried by `submit:error` when validation blocks a submission
pub const VALIDATION_FAILED: &str = "validation failed";

pub type SubmitHandler = Arc<dyn Fn(Value) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;
type ChangeHandler = Arc<dyn Fn(&DataChange, &Value) + Send + Sync>;
type ValidateFailedHandler = Arc<dyn Fn(&FormValidationResult) + Send + Sync>;
type ExpandHandler = Arc<dyn Fn(bool) + Send + Sync>;
type ResetHandler = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle hooks supplied by the embedding application
#[derive(Clone, Default)]
pub struct FormCallbacks {
    on_submit: Option<SubmitHandler>,
    on_reset: Option<ResetHandler>,
    on_change: Option<ChangeHandler>,
    on_validate_failed: Option<ValidateFailedHandler>,
    on_expand_change: Option<ExpandHandler>,
}

impl FormCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_submit = Some(Arc::new(move |values| -> BoxFuture<anyhow::Result<()>> {
            Box::pin(handler(values))
        }));
        self
    }

    pub fn on_reset(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reset = Some(Arc::new(handler));
        self
    }

    /// Called after every effective write with the change and all values
    pub fn on_change(mut self, handler: impl Fn(&DataChange, &Value) + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(handler));
        self
    }

    pub fn on_validate_failed(
        mut self,
        handler: impl Fn(&FormValidationResult) + Send + Sync + 'static,
    ) -> Self {
        self.on_validate_failed = Some(Arc::new(handler));
        self
    }

    pub fn on_expand_change(mut self, handler: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_expand_change = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for FormCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormCallbacks")
            .field("on_submit", &self.on_submit.is_some())
            .field("on_reset", &self.on_reset.is_some())
            .field("on_change", &self.on_change.is_some())
            .field("on_validate_failed", &self.on_validate_failed.is_some())
            .field("on_expand_change", &self.on_expand_change.is_some())
            .finish()
    }
}

/// Everything needed to build a [`Form`]
#[derive(Debug, Clone, Default)]
pub struct FormOptions {
    pub config: FormConfig,
    pub fields: Vec<FieldConfig>,
    pub groups: Vec<FieldGroup>,
    pub callbacks: FormCallbacks,
    /// Lay out immediately at this width
    pub container_width: Option<f64>,
}

impl FormOptions {
    pub fn new(config: FormConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldConfig>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn group(mut self, group: FieldGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn callbacks(mut self, callbacks: FormCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn container_width(mut self, width: f64) -> Self {
        self.container_width = Some(width);
        self
    }
}

/// How a call to [`Form::submit`] ended when it did not fail outright
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Submitted { values: Value },
    /// Validation blocked the submission
    Invalid(FormValidationResult),
}

impl SubmitOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmitOutcome::Submitted { .. })
    }
}

/// `path` equals `prefix` or lies underneath it
fn is_within(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
}

/// Whether a write at `path` can change the value of `field`
fn touches(field: &str, path: &str) -> bool {
    path.is_empty() || is_within(path, field) || is_within(field, path)
}

fn grouping_for(config: &FormConfig, expanded: bool) -> GroupingOptions {
    let button = &config.button;
    let reserved_columns = if button.show && button.position == ButtonMode::Inline {
        button.span
    } else {
        0
    };
    GroupingOptions {
        preview_rows: config.expand.preview_rows,
        collapsed: !expanded,
        reserved_columns,
        button_mode: button.position,
    }
}

struct FormInner {
    config: FormConfig,
    data: PathStore,
    state: StateStore,
    graph: Mutex<DependencyGraph>,
    groups: Mutex<GroupManager>,
    validation: ValidationEngine,
    layout: LayoutEngine,
    events: EventBus<FormEvent>,
    callbacks: FormCallbacks,
    /// Fields waiting for change-triggered validation, in queue order
    pending: Mutex<Vec<String>>,
    expanded: AtomicBool,
    destroyed: AtomicBool,
}

impl FormInner {
    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(FormError::Destroyed("form"));
        }
        Ok(())
    }

    /// Register `field` at `index` in display order; returns its position
    fn register(&self, field: FieldConfig, index: Option<usize>) -> Result<usize> {
        parse_path(&field.name)?;
        let value = self.data.get(&field.name).unwrap_or(Value::Null);
        self.state.register_field(&field.name, value);
        self.sync_rules(&field);
        Ok(lock(&self.graph).register_field_at(field, index))
    }

    fn sync_rules(&self, field: &FieldConfig) {
        if field.rules.is_empty() {
            self.validation.remove_rules(&field.name);
        } else {
            self.validation.set_rules(&field.name, field.rules.clone());
        }
    }

    fn on_data_change(&self, change: &DataChange) {
        self.events.emit_sync(FormEvent::DataChange(change.clone()));

        let mut changed = Vec::new();
        for name in self.state.field_names() {
            if !touches(&name, &change.path) {
                continue;
            }
            let value = self.data.get(&name).unwrap_or(Value::Null);
            let old_value = self
                .state
                .field_state(&name)
                .map_or(Value::Null, |state| state.value);
            if old_value == value {
                continue;
            }
            self.state.set_field_value(&name, value.clone());
            self.events.emit_sync(FormEvent::FieldChange {
                name: name.clone(),
                value,
                old_value,
            });
            changed.push(name);
        }

        if !change.is_whole_store() && self.config.validate_on_change {
            self.enqueue(&changed);
        }

        let values = self.data.get_all();
        self.refresh_conditions(&values);

        if let Some(on_change) = &self.callbacks.on_change {
            on_change(change, &values);
        }
    }

    /// Queue `fields` and their dependents for change validation
    fn enqueue(&self, fields: &[String]) {
        if fields.is_empty() {
            return;
        }
        let mut targets = Vec::new();
        {
            let graph = lock(&self.graph);
            for field in fields {
                targets.push(field.clone());
                targets.extend(graph.dependents(field));
            }
        }
        let mut pending = lock(&self.pending);
        for target in targets {
            if !pending.contains(&target) {
                pending.push(target);
            }
        }
    }

    /// Re-evaluate every field's conditions and push them into state. The
    /// layout follows when a field's visibility flipped.
    fn refresh_conditions(&self, values: &Value) {
        let conditions: Vec<(String, Condition, Condition, Condition)> = lock(&self.graph)
            .all_fields()
            .into_iter()
            .map(|field| {
                (
                    field.name.clone(),
                    field.visible.clone(),
                    field.disabled.clone(),
                    field.readonly.clone(),
                )
            })
            .collect();

        let mut visibility_changed = false;
        for (name, visible, disabled, readonly) in conditions {
            let visible = visible.evaluate(values, true, &name, "visible");
            let disabled = self.config.disabled || disabled.evaluate(values, false, &name, "disabled");
            let readonly = self.config.readonly || readonly.evaluate(values, false, &name, "readonly");

            visibility_changed |= self.state.set_field_visible(&name, visible);
            self.state.set_field_disabled(&name, disabled);
            self.state.set_field_readonly(&name, readonly);
        }

        if visibility_changed {
            self.sync_layout();
        }
    }

    fn is_visible(&self, name: &str) -> bool {
        self.state.field_state(name).is_some_and(|state| state.visible)
    }

    fn sync_layout(&self) {
        let fields = lock(&self.graph)
            .all_fields()
            .into_iter()
            .map(|field| field.layout_field(self.is_visible(&field.name)))
            .collect();
        self.layout.update_fields(fields);
    }

    async fn run_validation(&self, name: &str, trigger: Option<Trigger>) -> FieldValidationResult {
        if !self.validation.has_rules(name) {
            return FieldValidationResult::passed(name);
        }
        let value = self.data.get(name).unwrap_or(Value::Null);
        let values = self.data.get_all();

        self.state.set_field_validating(name, true);
        let result = self.validation.validate_field(name, &value, &values, trigger).await;
        if result.cancelled {
            debug!("validation of `{name}` superseded");
        } else {
            self.state
                .set_field_validation_result(name, result.valid, result.errors.clone());
        }
        result
    }

    async fn drain_validation(&self) {
        loop {
            let queued = std::mem::take(&mut *lock(&self.pending));
            if queued.is_empty() {
                return;
            }
            for name in queued {
                if self.is_visible(&name) {
                    self.run_validation(&name, Some(Trigger::Change)).await;
                }
            }
        }
    }
}

/// A live form. Cloning yields another handle to the same form.
#[derive(Clone)]
pub struct Form {
    inner: Arc<FormInner>,
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("data", &self.inner.data)
            .field("state", &self.inner.state)
            .field("expanded", &self.is_expanded())
            .finish_non_exhaustive()
    }
}

impl Form {
    pub fn new(options: FormOptions) -> Result<Self> {
        let FormOptions {
            config,
            fields,
            groups,
            callbacks,
            container_width,
        } = options;

        let mut initial = match &config.initial_values {
            Value::Object(_) => config.initial_values.clone(),
            _ => Value::Object(Map::new()),
        };
        for field in &fields {
            if let Some(default) = &field.default_value {
                let segments = parse_path(&field.name)?;
                if get_in(&initial, &segments).is_none() {
                    set_in(&mut initial, &segments, default.clone())?;
                }
            }
        }

        let expanded = config.expand.default_expanded;
        let layout = LayoutEngine::new(config.layout.clone());
        layout.set_grouping(grouping_for(&config, expanded));

        let inner = Arc::new(FormInner {
            data: PathStore::new(initial),
            state: StateStore::new(),
            graph: Mutex::new(DependencyGraph::new()),
            groups: Mutex::new(GroupManager::new()),
            validation: ValidationEngine::new(config.validation.clone()),
            layout,
            events: EventBus::new(),
            callbacks,
            pending: Mutex::new(Vec::new()),
            expanded: AtomicBool::new(expanded),
            destroyed: AtomicBool::new(false),
            config,
        });

        let field_count = fields.len();
        for field in fields {
            inner.register(field, None)?;
        }
        lock(&inner.groups).register_groups(groups);
        inner.refresh_conditions(&inner.data.get_all());
        inner.sync_layout();
        if let Some(width) = container_width {
            inner.layout.init(width);
        }

        let weak: Weak<FormInner> = Arc::downgrade(&inner);
        inner.data.subscribe(move |change| {
            if let Some(inner) = weak.upgrade() {
                inner.on_data_change(change);
            }
            Ok(())
        });
        let weak: Weak<FormInner> = Arc::downgrade(&inner);
        inner.state.subscribe(move |change: &StateChange| {
            if let Some(inner) = weak.upgrade() {
                inner.events.emit_sync(FormEvent::StateChange(change.clone()));
            }
            Ok(())
        });

        info!(fields = field_count, "form created");
        Ok(Self { inner })
    }

    /// Build from a declarative definition
    pub fn from_definition(definition: &FormDefinition, callbacks: FormCallbacks) -> Result<Self> {
        Self::new(FormOptions {
            config: definition.config.clone(),
            fields: definition.field_configs()?,
            groups: definition.field_groups(),
            callbacks,
            container_width: None,
        })
    }

    pub fn config(&self) -> &FormConfig {
        &self.inner.config
    }

    // --- values ---

    pub fn field_value(&self, name: &str) -> Option<Value> {
        self.inner.data.get(name)
    }

    pub fn fields_value(&self) -> Value {
        self.inner.data.get_all()
    }

    /// Write one value and run any validation it queued
    pub async fn set_field_value(&self, name: &str, value: Value) -> Result<()> {
        self.inner.ensure_alive()?;
        self.inner.data.set(name, value, false)?;
        self.inner.drain_validation().await;
        Ok(())
    }

    /// Write several paths, then run the validation they queued
    pub async fn set_fields_value(&self, values: &Map<String, Value>) -> Result<()> {
        self.inner.ensure_alive()?;
        self.inner.data.set_many(values, false)?;
        self.inner.drain_validation().await;
        Ok(())
    }

    pub async fn insert_item(&self, path: &str, value: Value, index: Option<usize>) -> Result<()> {
        self.inner.ensure_alive()?;
        self.inner.data.insert_item(path, value, index)?;
        self.inner.drain_validation().await;
        Ok(())
    }

    pub async fn remove_item(&self, path: &str, index: usize) -> Result<Value> {
        self.inner.ensure_alive()?;
        let removed = self.inner.data.remove_item(path, index)?;
        self.inner.drain_validation().await;
        Ok(removed)
    }

    pub async fn move_item(&self, path: &str, from: usize, to: usize) -> Result<()> {
        self.inner.ensure_alive()?;
        self.inner.data.move_item(path, from, to)?;
        self.inner.drain_validation().await;
        Ok(())
    }

    // --- state ---

    pub fn field_state(&self, name: &str) -> Option<FieldState> {
        self.inner.state.field_state(name)
    }

    pub fn form_state(&self) -> FormState {
        self.inner.state.form_state()
    }

    // --- validation ---

    /// Validate one field and record the result in its state. Hidden fields
    /// are validated too when asked for explicitly.
    pub async fn validate_field(
        &self,
        name: &str,
        trigger: Option<Trigger>,
    ) -> Result<FieldValidationResult> {
        self.inner.ensure_alive()?;
        if !self.inner.state.has_field(name) {
            return Err(FormError::UnknownField(name.to_string()));
        }
        Ok(self.inner.run_validation(name, trigger).await)
    }

    /// Validate every visible field with the `submit` trigger
    pub async fn validate(&self) -> FormValidationResult {
        let inner = &self.inner;
        if inner.ensure_alive().is_err() {
            return FormValidationResult::default();
        }

        let fields: Vec<String> = lock(&inner.graph)
            .field_names()
            .into_iter()
            .filter(|name| inner.validation.has_rules(name) && inner.is_visible(name))
            .collect();

        inner
            .events
            .emit(FormEvent::ValidateStart {
                fields: fields.clone(),
            })
            .await;
        inner.state.set_form_validating(true);

        let mut results = Vec::with_capacity(fields.len());
        for name in &fields {
            results.push(inner.run_validation(name, Some(Trigger::Submit)).await);
        }
        let result: FormValidationResult = results.into_iter().collect();

        inner.state.set_form_validating(false);
        inner.events.emit(FormEvent::ValidateEnd(result.clone())).await;

        if !result.valid {
            debug!(errors = result.error_count, "form validation failed");
            if let Some(on_validate_failed) = &inner.callbacks.on_validate_failed {
                on_validate_failed(&result);
            }
        }
        result
    }

    /// Mark the field touched and validate it with the `blur` trigger
    pub async fn handle_field_blur(&self, name: &str) -> Result<()> {
        let inner = &self.inner;
        inner.ensure_alive()?;
        if !inner.state.has_field(name) {
            return Err(FormError::UnknownField(name.to_string()));
        }

        inner.state.set_field_touched(name, true);
        inner
            .events
            .emit(FormEvent::FieldBlur {
                name: name.to_string(),
            })
            .await;
        if inner.config.validate_on_blur {
            inner.run_validation(name, Some(Trigger::Blur)).await;
        }
        Ok(())
    }

    pub fn handle_field_focus(&self, name: &str) {
        if self.inner.ensure_alive().is_ok() {
            self.inner.events.emit_sync(FormEvent::FieldFocus {
                name: name.to_string(),
            });
        }
    }

    // --- lifecycle ---

    /// Validate (unless disabled) and hand the values to `on_submit`.
    ///
    /// Failed validation is reported as [`SubmitOutcome::Invalid`]; only a
    /// failing submit handler yields an error.
    pub async fn submit(&self) -> Result<SubmitOutcome> {
        let inner = &self.inner;
        inner.ensure_alive()?;

        if inner.config.validate_on_submit {
            let result = self.validate().await;
            if !result.valid {
                inner
                    .events
                    .emit(FormEvent::SubmitError {
                        message: VALIDATION_FAILED.to_string(),
                        validation: Some(result.clone()),
                    })
                    .await;
                return Ok(SubmitOutcome::Invalid(result));
            }
        }

        let values = inner.data.get_all();
        inner.state.set_form_submitting(true);
        inner
            .events
            .emit(FormEvent::SubmitStart {
                values: values.clone(),
            })
            .await;

        let outcome = match &inner.callbacks.on_submit {
            Some(on_submit) => on_submit(values.clone()).await,
            None => Ok(()),
        };
        inner.state.set_form_submitting(false);

        match outcome {
            Ok(()) => {
                inner
                    .events
                    .emit(FormEvent::SubmitSuccess {
                        values: values.clone(),
                    })
                    .await;
                info!("form submitted");
                Ok(SubmitOutcome::Submitted { values })
            }
            Err(err) => {
                let message = format!("{err:#}");
                inner
                    .events
                    .emit(FormEvent::SubmitError {
                        message: message.clone(),
                        validation: None,
                    })
                    .await;
                Err(FormError::Submit(message))
            }
        }
    }

    /// Restore initial values, clear field states and the validation cache
    pub fn reset(&self) {
        let inner = &self.inner;
        if inner.ensure_alive().is_err() {
            return;
        }
        lock(&inner.pending).clear();
        for name in inner.state.field_names() {
            inner.validation.cancel(&name);
        }

        inner.data.reset(false);
        inner.state.reset_all_field_states();
        inner.validation.clear_cache();

        inner.events.emit_sync(FormEvent::Reset {
            values: inner.data.get_all(),
        });
        if let Some(on_reset) = &inner.callbacks.on_reset {
            on_reset();
        }
    }

    pub fn snapshot(&self) -> Uuid {
        self.inner.data.snapshot()
    }

    /// Roll back to the latest snapshot; `false` when there is none
    pub fn restore_snapshot(&self) -> bool {
        self.inner.data.restore_snapshot(false)
    }

    // --- fields ---

    /// Register a field after construction at the end of the form. An
    /// existing field of the same name is replaced.
    pub fn add_field(&self, field: FieldConfig) -> Result<()> {
        self.add_field_at(field, None).map(|_| ())
    }

    /// Register a field at `index` in display order (`None` appends) and
    /// return where it landed. Replacing an existing field keeps its slot and
    /// emits `field:updated` instead of `field:added`.
    pub fn add_field_at(&self, field: FieldConfig, index: Option<usize>) -> Result<usize> {
        let inner = &self.inner;
        inner.ensure_alive()?;
        if let Some(default) = &field.default_value {
            if !inner.data.has(&field.name) {
                inner.data.set(&field.name, default.clone(), true)?;
            }
        }
        // reset returns a late field to the value it joined with
        if inner.data.initial_value(&field.name).is_none() {
            if let Some(value) = inner.data.get(&field.name) {
                inner.data.set_initial(&field.name, value)?;
            }
        }

        let name = field.name.clone();
        let replacing = lock(&inner.graph).has_field(&name);
        let index = inner.register(field, index)?;
        inner.refresh_conditions(&inner.data.get_all());
        inner.sync_layout();

        let event = if replacing {
            FormEvent::FieldUpdated { name }
        } else {
            FormEvent::FieldAdded { name, index }
        };
        inner.events.emit_sync(event);
        Ok(index)
    }

    /// Unregister a field. Its value stays in the store.
    pub fn remove_field(&self, name: &str) -> bool {
        let inner = &self.inner;
        if inner.ensure_alive().is_err() {
            return false;
        }
        let removed = {
            let mut graph = lock(&inner.graph);
            graph
                .position(name)
                .zip(graph.unregister_field(name))
                .map(|(index, _)| index)
        };
        let Some(index) = removed else {
            return false;
        };

        inner.validation.cancel(name);
        inner.validation.remove_rules(name);
        inner.state.unregister_field(name);
        lock(&inner.pending).retain(|pending| pending != name);
        inner.sync_layout();
        inner.events.emit_sync(FormEvent::FieldRemoved {
            name: name.to_string(),
            index,
        });
        true
    }

    /// Edit a field's configuration in place. Rules, conditions and layout
    /// follow the new configuration. Returns `false` for an unknown field.
    pub fn update_field(&self, name: &str, update: impl FnOnce(&mut FieldConfig)) -> Result<bool> {
        let inner = &self.inner;
        inner.ensure_alive()?;
        let updated = {
            let mut graph = lock(&inner.graph);
            if graph.update_field(name, update) {
                graph.field(name).cloned()
            } else {
                None
            }
        };
        let Some(field) = updated else {
            return Ok(false);
        };

        inner.sync_rules(&field);
        inner.refresh_conditions(&inner.data.get_all());
        inner.sync_layout();
        inner.events.emit_sync(FormEvent::FieldUpdated {
            name: name.to_string(),
        });
        Ok(true)
    }

    /// Move a field to display position `to`. Returns `false` when the field
    /// is unknown or `to` is out of range.
    pub fn move_field(&self, name: &str, to: usize) -> bool {
        let inner = &self.inner;
        if inner.ensure_alive().is_err() {
            return false;
        }
        let Some(from) = lock(&inner.graph).move_field(name, to) else {
            return false;
        };
        if from != to {
            inner.sync_layout();
            inner.events.emit_sync(FormEvent::FieldMoved {
                name: name.to_string(),
                from,
                to,
            });
        }
        true
    }

    /// Exchange the display positions of two fields
    pub fn swap_fields(&self, a: &str, b: &str) -> bool {
        let inner = &self.inner;
        if inner.ensure_alive().is_err() || !lock(&inner.graph).swap_fields(a, b) {
            return false;
        }
        inner.sync_layout();
        true
    }

    /// Register a copy of `name` under `new_name`. Returns `false` when
    /// `name` is unknown.
    pub fn clone_field(&self, name: &str, new_name: &str, index: Option<usize>) -> Result<bool> {
        let Some(mut field) = lock(&self.inner.graph).field(name).cloned() else {
            return Ok(false);
        };
        field.name = new_name.to_string();
        self.add_field_at(field, index)?;
        Ok(true)
    }

    /// Field names in display order
    pub fn field_names(&self) -> Vec<String> {
        lock(&self.inner.graph).field_names()
    }

    // --- groups ---

    pub fn add_group(&self, group: FieldGroup) {
        if self.inner.ensure_alive().is_ok() {
            lock(&self.inner.groups).register_group(group);
        }
    }

    pub fn remove_group(&self, name: &str) -> Option<FieldGroup> {
        lock(&self.inner.groups).unregister_group(name)
    }

    /// Group that `field` belongs to
    pub fn field_group(&self, field: &str) -> Option<String> {
        lock(&self.inner.groups).field_group(field).map(str::to_string)
    }

    pub fn is_group_collapsed(&self, name: &str) -> bool {
        lock(&self.inner.groups).is_group_collapsed(name)
    }

    /// Flip a collapsible group; returns the new state
    pub fn toggle_group(&self, name: &str) -> Option<bool> {
        let collapsed = !self.is_group_collapsed(name);
        self.set_group_collapsed(name, collapsed).then_some(collapsed)
    }

    /// Returns whether the state changed
    pub fn set_group_collapsed(&self, name: &str, collapsed: bool) -> bool {
        let inner = &self.inner;
        if inner.ensure_alive().is_err() {
            return false;
        }
        let changed = lock(&inner.groups).set_group_collapsed(name, collapsed);
        if changed {
            inner.events.emit_sync(FormEvent::GroupCollapse {
                name: name.to_string(),
                collapsed,
            });
        }
        changed
    }

    /// Registered, visible member fields of a shown, expanded group
    pub fn group_visible_fields(&self, name: &str) -> Vec<String> {
        let values = self.inner.data.get_all();
        let members = lock(&self.inner.groups).group_visible_fields(name, &values);
        members
            .into_iter()
            .filter(|field| self.inner.is_visible(field))
            .collect()
    }

    /// Lock the group registry for inspection
    pub fn field_groups(&self) -> MutexGuard<'_, GroupManager> {
        lock(&self.inner.groups)
    }

    /// Lock the dependency graph for inspection
    pub fn field_graph(&self) -> MutexGuard<'_, DependencyGraph> {
        lock(&self.inner.graph)
    }

    pub fn validation_engine(&self) -> &ValidationEngine {
        &self.inner.validation
    }

    pub fn layout_engine(&self) -> &LayoutEngine {
        &self.inner.layout
    }

    // --- expand ---

    pub fn is_expanded(&self) -> bool {
        self.inner.expanded.load(Ordering::Acquire)
    }

    /// Flip the expanded state; returns the new state
    pub fn toggle_expand(&self) -> bool {
        let expanded = !self.is_expanded();
        self.set_expanded(expanded);
        expanded
    }

    pub fn set_expanded(&self, expanded: bool) {
        let inner = &self.inner;
        if inner.ensure_alive().is_err() {
            return;
        }
        if inner.expanded.swap(expanded, Ordering::AcqRel) == expanded {
            return;
        }
        inner.layout.set_grouping(grouping_for(&inner.config, expanded));
        inner.events.emit_sync(FormEvent::ExpandChange { expanded });
        if let Some(on_expand_change) = &inner.callbacks.on_expand_change {
            on_expand_change(expanded);
        }
    }

    // --- events ---

    pub fn events(&self) -> &EventBus<FormEvent> {
        &self.inner.events
    }

    pub fn on<F>(&self, kind: FormEventKind, listener: F) -> Result<Subscription<FormEvent>>
    where
        F: Fn(&FormEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.on(kind, listener)
    }

    pub fn once<F>(&self, kind: FormEventKind, listener: F) -> Result<Subscription<FormEvent>>
    where
        F: Fn(&FormEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.once(kind, listener)
    }

    pub fn on_async<F, Fut>(
        &self,
        kind: FormEventKind,
        priority: i32,
        listener: F,
    ) -> Result<Subscription<FormEvent>>
    where
        F: Fn(FormEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.events.on_async(kind, priority, listener)
    }

    pub fn off(&self, kind: FormEventKind, id: Option<ListenerId>) {
        self.inner.events.off(kind, id);
    }

    /// Tear down every component. Later mutations fail with
    /// [`FormError::Destroyed`] or do nothing.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        lock(&inner.pending).clear();
        inner.layout.destroy();
        inner.validation.destroy();
        inner.data.destroy();
        inner.state.destroy();
        inner.events.destroy();
        lock(&inner.graph).clear();
        lock(&inner.groups).clear();
        info!("form destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Span;
    use crate::validation::{MockAsyncValidator, ValidationRule, ValidatorOutput};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn config(initial: Value) -> FormConfig {
        FormConfig {
            initial_values: initial,
            ..FormConfig::default()
        }
    }

    fn record(form: &Form, kinds: &[FormEventKind]) -> Arc<Mutex<Vec<FormEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in kinds {
            let seen = Arc::clone(&seen);
            form.on(*kind, move |event| {
                seen.lock().unwrap().push(event.clone());
                Ok(())
            })
            .unwrap();
        }
        seen
    }

    fn kinds(seen: &Arc<Mutex<Vec<FormEvent>>>) -> Vec<FormEventKind> {
        use crate::events::BusEvent;
        seen.lock().unwrap().iter().map(|event| event.kind()).collect()
    }

    fn signup() -> Form {
        Form::new(
            FormOptions::new(config(json!({"name": "", "password": ""})))
                .field(
                    FieldConfig::new("name")
                        .label("Name")
                        .rule(ValidationRule::required())
                        .rule(ValidationRule::min_length(3)),
                )
                .field(FieldConfig::new("password").rule(ValidationRule::min_length(8)))
                .field(
                    FieldConfig::new("confirm")
                        .rule(ValidationRule::confirm("password"))
                        .depends_on(["password"]),
                ),
        )
        .unwrap()
    }

    mod values {
        use super::*;
        use pretty_assertions::assert_eq;

        #[tokio::test]
        async fn test_construction_registers_fields() {
            let form = Form::new(
                FormOptions::new(config(json!({"name": "Ada"})))
                    .field(FieldConfig::new("name"))
                    .field(FieldConfig::new("role").default_value(json!("admin"))),
            )
            .unwrap();

            assert_eq!(form.field_value("role"), Some(json!("admin")));
            assert_eq!(form.field_state("name").unwrap().value, json!("Ada"));
            assert_eq!(form.form_state().field_count, 2);
            assert!(form.form_state().pristine);
            assert_eq!(form.layout_engine().field_layouts().len(), 2);
        }

        #[tokio::test]
        async fn test_set_value_updates_state_and_emits() {
            let form = signup();
            let seen = record(
                &form,
                &[FormEventKind::DataChange, FormEventKind::FieldChange],
            );

            form.set_field_value("name", json!("Grace")).await.unwrap();

            assert_eq!(
                kinds(&seen),
                vec![FormEventKind::DataChange, FormEventKind::FieldChange]
            );
            let state = form.field_state("name").unwrap();
            assert!(state.dirty);
            assert!(state.valid);
            assert!(form.form_state().dirty);

            let events = seen.lock().unwrap();
            match &events[1] {
                FormEvent::FieldChange {
                    name,
                    value,
                    old_value,
                } => {
                    assert_eq!(name, "name");
                    assert_eq!(value, &json!("Grace"));
                    assert_eq!(old_value, &json!(""));
                }
                other => panic!("unexpected event {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_same_value_is_a_no_op() {
            let form = signup();
            let seen = record(&form, &[FormEventKind::DataChange]);

            form.set_field_value("name", json!("")).await.unwrap();

            assert!(seen.lock().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_nested_paths_reach_parent_field() {
            let form = Form::new(
                FormOptions::new(config(json!({"address": {"city": "Oslo"}})))
                    .field(FieldConfig::new("address"))
                    .field(FieldConfig::new("address.city")),
            )
            .unwrap();

            form.set_field_value("address.city", json!("Bergen"))
                .await
                .unwrap();

            assert_eq!(
                form.field_state("address").unwrap().value,
                json!({"city": "Bergen"})
            );
            assert_eq!(
                form.field_state("address.city").unwrap().value,
                json!("Bergen")
            );
        }

        #[tokio::test]
        async fn test_set_fields_value_and_on_change() {
            let changes = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&changes);
            let form = Form::new(
                FormOptions::new(config(json!({})))
                    .field(FieldConfig::new("a"))
                    .field(FieldConfig::new("b"))
                    .callbacks(FormCallbacks::new().on_change(move |_, values| {
                        assert!(values.is_object());
                        counter.fetch_add(1, Ordering::SeqCst);
                    })),
            )
            .unwrap();

            let mut values = Map::new();
            values.insert("a".into(), json!(1));
            values.insert("b".into(), json!(2));
            form.set_fields_value(&values).await.unwrap();

            assert_eq!(form.fields_value(), json!({"a": 1, "b": 2}));
            assert_eq!(changes.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn test_array_helpers() {
            let form = Form::new(
                FormOptions::new(config(json!({"tags": ["a", "b"]})))
                    .field(FieldConfig::new("tags")),
            )
            .unwrap();

            form.insert_item("tags", json!("c"), None).await.unwrap();
            form.move_item("tags", 2, 0).await.unwrap();
            let removed = form.remove_item("tags", 1).await.unwrap();

            assert_eq!(removed, json!("a"));
            assert_eq!(form.field_state("tags").unwrap().value, json!(["c", "b"]));
            assert!(matches!(
                form.remove_item("tags", 9).await,
                Err(FormError::IndexOutOfRange { .. })
            ));
        }

        #[tokio::test]
        async fn test_invalid_path_is_rejected() {
            let form = signup();
            assert!(matches!(
                form.set_field_value("a[", json!(1)).await,
                Err(FormError::InvalidPath { .. })
            ));
        }
    }

    mod validation {
        use super::*;
        use pretty_assertions::assert_eq;

        #[tokio::test]
        async fn test_change_validation_records_errors() {
            let form = signup();

            form.set_field_value("name", json!("Al")).await.unwrap();

            let state = form.field_state("name").unwrap();
            assert!(!state.valid);
            assert_eq!(state.errors.len(), 1);
            assert!(!state.validating);
            assert!(!form.form_state().valid);
            assert_eq!(form.form_state().error_count, 1);
        }

        #[tokio::test]
        async fn test_change_validation_can_be_disabled() {
            let form = Form::new(
                FormOptions::new(FormConfig {
                    validate_on_change: false,
                    ..FormConfig::default()
                })
                .field(FieldConfig::new("name").rule(ValidationRule::min_length(3))),
            )
            .unwrap();

            form.set_field_value("name", json!("x")).await.unwrap();

            assert!(form.field_state("name").unwrap().valid);
        }

        #[tokio::test]
        async fn test_dependents_revalidate() {
            let form = signup();
            form.set_field_value("password", json!("correct horse"))
                .await
                .unwrap();
            form.set_field_value("confirm", json!("correct horse"))
                .await
                .unwrap();
            assert!(form.field_state("confirm").unwrap().valid);

            form.set_field_value("password", json!("battery staple"))
                .await
                .unwrap();

            assert!(!form.field_state("confirm").unwrap().valid);
            assert_eq!(form.field_graph().dependents("password"), vec!["confirm"]);
        }

        #[tokio::test]
        async fn test_blur_touches_and_validates() {
            let form = signup();
            let seen = record(&form, &[FormEventKind::FieldBlur]);

            form.handle_field_blur("name").await.unwrap();

            let state = form.field_state("name").unwrap();
            assert!(state.touched);
            assert!(!state.valid);
            assert_eq!(kinds(&seen), vec![FormEventKind::FieldBlur]);
            assert!(matches!(
                form.handle_field_blur("nope").await,
                Err(FormError::UnknownField(_))
            ));
        }

        #[tokio::test]
        async fn test_validate_emits_start_and_end() {
            let form = signup();
            let seen = record(
                &form,
                &[FormEventKind::ValidateStart, FormEventKind::ValidateEnd],
            );

            let result = form.validate().await;

            assert!(!result.valid);
            assert!(result.errors.contains_key("name"));
            assert_eq!(
                kinds(&seen),
                vec![FormEventKind::ValidateStart, FormEventKind::ValidateEnd]
            );
            assert!(!form.form_state().validating);
        }

        #[tokio::test]
        async fn test_async_validator_runs_through_form() {
            let mut mock = MockAsyncValidator::new();
            mock.expect_validate()
                .returning(|_, value, _| {
                    Ok(if value == &json!("taken") {
                        ValidatorOutput::fail("username taken")
                    } else {
                        ValidatorOutput::pass()
                    })
                });
            let form = Form::new(
                FormOptions::new(FormConfig::default()).field(
                    FieldConfig::new("username")
                        .rule(ValidationRule::async_validator(Arc::new(mock))),
                ),
            )
            .unwrap();

            form.set_field_value("username", json!("taken")).await.unwrap();

            assert_eq!(
                form.field_state("username").unwrap().errors,
                vec!["username taken".to_string()]
            );
        }

        #[tokio::test]
        async fn test_validate_field_unknown() {
            let form = signup();
            assert!(matches!(
                form.validate_field("ghost", None).await,
                Err(FormError::UnknownField(_))
            ));
            let result = form.validate_field("password", None).await.unwrap();
            assert!(result.valid);
        }
    }

    mod conditions {
        use super::*;

        fn account_form() -> Form {
            Form::new(
                FormOptions::new(FormConfig {
                    layout: crate::layout::LayoutConfig {
                        columns: Some(2),
                        ..Default::default()
                    },
                    ..config(json!({"kind": "personal"}))
                })
                .field(FieldConfig::new("kind"))
                .field(
                    FieldConfig::new("company")
                        .visible(Condition::computed(|v| Ok(v["kind"] == "business")))
                        .rule(ValidationRule::required()),
                )
                .field(
                    FieldConfig::new("vat")
                        .disabled(Condition::computed(|v| Ok(v["kind"] != "business"))),
                ),
            )
            .unwrap()
        }

        #[tokio::test]
        async fn test_visibility_follows_values() {
            let form = account_form();
            assert!(!form.field_state("company").unwrap().visible);
            assert!(form.field_state("vat").unwrap().disabled);
            assert!(form.layout_engine().field_layout("company").is_none());

            form.set_field_value("kind", json!("business")).await.unwrap();

            assert!(form.field_state("company").unwrap().visible);
            assert!(!form.field_state("vat").unwrap().disabled);
            assert!(form.layout_engine().field_layout("company").is_some());
        }

        #[tokio::test]
        async fn test_hidden_fields_skip_validation() {
            let form = account_form();

            assert!(form.validate().await.valid);

            form.set_field_value("kind", json!("business")).await.unwrap();
            assert!(!form.validate().await.valid);
        }

        #[tokio::test]
        async fn test_form_level_readonly() {
            let form = Form::new(
                FormOptions::new(FormConfig {
                    readonly: true,
                    ..FormConfig::default()
                })
                .field(FieldConfig::new("a")),
            )
            .unwrap();
            assert!(form.field_state("a").unwrap().readonly);
        }
    }

    mod submit {
        use super::*;
        use pretty_assertions::assert_eq;

        #[tokio::test]
        async fn test_invalid_submission_is_not_an_error() {
            let failed = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&failed);
            let form = Form::new(
                FormOptions::new(FormConfig::default())
                    .field(FieldConfig::new("name").rule(ValidationRule::required()))
                    .callbacks(
                        FormCallbacks::new()
                            .on_validate_failed(move |_| {
                                counter.fetch_add(1, Ordering::SeqCst);
                            })
                            .on_submit(|_| async {
                                Err::<(), _>(anyhow::anyhow!("must not submit"))
                            }),
                    ),
            )
            .unwrap();
            let seen = record(&form, &[FormEventKind::SubmitError, FormEventKind::SubmitStart]);

            let outcome = form.submit().await.unwrap();

            assert!(matches!(outcome, SubmitOutcome::Invalid(ref r) if r.error_count == 1));
            assert_eq!(failed.load(Ordering::SeqCst), 1);
            assert_eq!(kinds(&seen), vec![FormEventKind::SubmitError]);
        }

        #[tokio::test]
        async fn test_successful_submission() {
            let submitted = Arc::new(Mutex::new(None));
            let slot = Arc::clone(&submitted);
            let form = Form::new(
                FormOptions::new(config(json!({"name": "Ada"})))
                    .field(FieldConfig::new("name").rule(ValidationRule::required()))
                    .callbacks(FormCallbacks::new().on_submit(move |values| {
                        let slot = Arc::clone(&slot);
                        async move {
                            *slot.lock().unwrap() = Some(values);
                            Ok::<(), anyhow::Error>(())
                        }
                    })),
            )
            .unwrap();
            let seen = record(
                &form,
                &[FormEventKind::SubmitStart, FormEventKind::SubmitSuccess],
            );

            let outcome = form.submit().await.unwrap();

            assert!(outcome.is_submitted());
            assert_eq!(*submitted.lock().unwrap(), Some(json!({"name": "Ada"})));
            assert_eq!(
                kinds(&seen),
                vec![FormEventKind::SubmitStart, FormEventKind::SubmitSuccess]
            );
            assert!(!form.form_state().submitting);
        }

        #[tokio::test]
        async fn test_handler_failure_is_an_error() {
            let form = Form::new(
                FormOptions::new(FormConfig::default()).callbacks(
                    FormCallbacks::new()
                        .on_submit(|_| async { Err::<(), _>(anyhow::anyhow!("server down")) }),
                ),
            )
            .unwrap();
            let seen = record(&form, &[FormEventKind::SubmitError]);

            let err = form.submit().await.unwrap_err();

            assert!(matches!(err, FormError::Submit(ref message) if message == "server down"));
            assert_eq!(kinds(&seen), vec![FormEventKind::SubmitError]);
            assert!(!form.form_state().submitting);
        }

        #[tokio::test]
        async fn test_skip_validation_on_submit() {
            let form = Form::new(
                FormOptions::new(FormConfig {
                    validate_on_submit: false,
                    ..FormConfig::default()
                })
                .field(FieldConfig::new("name").rule(ValidationRule::required())),
            )
            .unwrap();

            assert!(form.submit().await.unwrap().is_submitted());
        }
    }

    mod lifecycle {
        use super::*;
        use pretty_assertions::assert_eq;

        #[tokio::test]
        async fn test_reset_restores_everything() {
            let resets = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&resets);
            let form = Form::new(
                FormOptions::new(config(json!({"name": ""})))
                    .field(FieldConfig::new("name").rule(ValidationRule::min_length(3)))
                    .callbacks(FormCallbacks::new().on_reset(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })),
            )
            .unwrap();
            form.set_field_value("name", json!("ab")).await.unwrap();
            form.handle_field_blur("name").await.unwrap();
            let seen = record(&form, &[FormEventKind::Reset]);

            form.reset();

            let state = form.field_state("name").unwrap();
            assert_eq!(state.value, json!(""));
            assert!(!state.dirty);
            assert!(!state.touched);
            assert!(state.valid);
            assert!(form.form_state().pristine);
            assert_eq!(kinds(&seen), vec![FormEventKind::Reset]);
            assert_eq!(resets.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_snapshot_round_trip() {
            let form = signup();
            form.set_field_value("name", json!("Ada")).await.unwrap();
            form.snapshot();
            form.set_field_value("name", json!("Grace")).await.unwrap();

            assert!(form.restore_snapshot());

            assert_eq!(form.field_value("name"), Some(json!("Ada")));
            assert_eq!(form.field_state("name").unwrap().value, json!("Ada"));
            assert!(!form.restore_snapshot());
        }

        #[tokio::test]
        async fn test_add_and_remove_fields() {
            let form = signup();

            form.add_field(
                FieldConfig::new("email")
                    .default_value(json!("a@b.co"))
                    .rule(ValidationRule::email()),
            )
            .unwrap();
            assert_eq!(form.field_value("email"), Some(json!("a@b.co")));
            assert!(form.layout_engine().field_layout("email").is_some());
            assert_eq!(form.form_state().field_count, 4);

            assert!(form.remove_field("email"));
            assert!(!form.remove_field("email"));
            assert!(form.field_state("email").is_none());
            assert!(!form.validation_engine().has_rules("email"));
            assert!(form.layout_engine().field_layout("email").is_none());
            assert_eq!(form.field_value("email"), Some(json!("a@b.co")));
        }

        #[tokio::test]
        async fn test_reset_keeps_late_field_default() {
            let form = signup();
            form.add_field(FieldConfig::new("nick").default_value(json!("anon")))
                .unwrap();
            form.set_field_value("nick", json!("ada")).await.unwrap();

            form.reset();

            assert_eq!(form.field_value("nick"), Some(json!("anon")));
            assert_eq!(form.field_state("nick").unwrap().value, json!("anon"));
            assert!(!form.field_state("nick").unwrap().dirty);
        }

        #[tokio::test]
        async fn test_expand_regroups_layout() {
            let toggles = Arc::new(Mutex::new(Vec::new()));
            let log = Arc::clone(&toggles);
            let mut options = FormOptions::new(FormConfig {
                layout: crate::layout::LayoutConfig {
                    columns: Some(4),
                    ..Default::default()
                },
                ..FormConfig::default()
            })
            .callbacks(FormCallbacks::new().on_expand_change(move |expanded| {
                log.lock().unwrap().push(expanded);
            }));
            for i in 0..5 {
                options = options.field(FieldConfig::new(format!("f{i}")).span(Span::Columns(1)));
            }
            let form = Form::new(options).unwrap();
            let seen = record(&form, &[FormEventKind::ExpandChange]);

            assert!(!form.is_expanded());
            assert_eq!(form.layout_engine().grouped_layout().preview_count(), 3);

            assert!(form.toggle_expand());
            assert_eq!(form.layout_engine().grouped_layout().preview_count(), 4);
            form.set_expanded(true);

            assert_eq!(*toggles.lock().unwrap(), vec![true]);
            assert_eq!(kinds(&seen), vec![FormEventKind::ExpandChange]);
        }

        #[tokio::test]
        async fn test_destroy_cascades() {
            let form = signup();
            form.destroy();

            assert!(form.is_destroyed());
            assert!(matches!(
                form.set_field_value("name", json!("x")).await,
                Err(FormError::Destroyed(_))
            ));
            assert!(form.on(FormEventKind::Reset, |_| Ok(())).is_err());
            assert!(matches!(form.submit().await, Err(FormError::Destroyed(_))));
            assert!(form.field_state("name").is_none());
            assert!(form.layout_engine().is_destroyed());
            form.reset();
            form.destroy();
        }

        #[tokio::test]
        async fn test_state_changes_are_published() {
            let form = signup();
            let seen = record(&form, &[FormEventKind::StateChange]);

            form.set_field_value("password", json!("x")).await.unwrap();

            assert!(seen
                .lock()
                .unwrap()
                .iter()
                .any(|event| matches!(event, FormEvent::StateChange(StateChange::Form(_)))));
        }
    }

    mod dynamic {
        use super::*;
        use crate::fields::FieldGroup;
        use pretty_assertions::assert_eq;

        #[tokio::test]
        async fn test_insert_move_and_swap() {
            let form = signup();
            let seen = record(
                &form,
                &[
                    FormEventKind::FieldAdded,
                    FormEventKind::FieldMoved,
                    FormEventKind::FieldRemoved,
                ],
            );

            let index = form.add_field_at(FieldConfig::new("email"), Some(1)).unwrap();
            assert_eq!(index, 1);
            assert_eq!(form.field_names(), vec!["name", "email", "password", "confirm"]);

            assert!(form.move_field("email", 3));
            assert!(!form.move_field("email", 9));
            assert!(form.swap_fields("name", "password"));
            assert_eq!(form.field_names(), vec!["password", "name", "confirm", "email"]);
            assert!(form.remove_field("name"));

            let events = seen.lock().unwrap();
            assert_eq!(events.len(), 3);
            assert!(matches!(&events[0], FormEvent::FieldAdded { name, index: 1 } if name == "email"));
            assert!(matches!(
                &events[1],
                FormEvent::FieldMoved { name, from: 1, to: 3 } if name == "email"
            ));
            assert!(matches!(&events[2], FormEvent::FieldRemoved { name, index: 1 } if name == "name"));
        }

        #[tokio::test]
        async fn test_replacing_field_keeps_position() {
            let form = signup();
            let seen = record(&form, &[FormEventKind::FieldAdded, FormEventKind::FieldUpdated]);

            let index = form
                .add_field_at(FieldConfig::new("name").label("Full name"), None)
                .unwrap();

            assert_eq!(index, 0);
            assert_eq!(form.field_names(), vec!["name", "password", "confirm"]);
            assert!(!form.validation_engine().has_rules("name"));
            assert_eq!(kinds(&seen), vec![FormEventKind::FieldUpdated]);
        }

        #[tokio::test]
        async fn test_update_field_resyncs_rules_and_conditions() {
            let form = signup();
            let seen = record(&form, &[FormEventKind::FieldUpdated]);

            let updated = form
                .update_field("password", |field| {
                    field.rules.clear();
                    field.visible = Condition::computed(|v| Ok(v["name"] != ""));
                })
                .unwrap();

            assert!(updated);
            assert!(!form.validation_engine().has_rules("password"));
            assert!(!form.field_state("password").unwrap().visible);
            assert!(form.layout_engine().field_layout("password").is_none());
            assert!(!form.update_field("missing", |_| {}).unwrap());
            assert_eq!(kinds(&seen), vec![FormEventKind::FieldUpdated]);
        }

        #[tokio::test]
        async fn test_clone_field() {
            let form = signup();

            assert!(form.clone_field("password", "password2", Some(2)).unwrap());
            assert!(!form.clone_field("missing", "other", None).unwrap());

            assert_eq!(
                form.field_names(),
                vec!["name", "password", "password2", "confirm"]
            );
            assert!(form.validation_engine().has_rules("password2"));
        }

        #[tokio::test]
        async fn test_groups_collapse_and_filter() {
            let form = Form::new(
                FormOptions::new(config(json!({"kind": "personal"})))
                    .field(FieldConfig::new("kind"))
                    .field(FieldConfig::new("company"))
                    .field(
                        FieldConfig::new("vat")
                            .visible(Condition::computed(|v| Ok(v["kind"] == "business"))),
                    )
                    .group(FieldGroup::new("basic").fields(["kind"]))
                    .group(
                        FieldGroup::new("business")
                            .fields(["company", "vat"])
                            .collapsible(true),
                    ),
            )
            .unwrap();
            let seen = record(&form, &[FormEventKind::GroupCollapse]);

            assert_eq!(form.field_group("vat").as_deref(), Some("business"));
            assert!(form.is_group_collapsed("business"));
            assert!(form.group_visible_fields("business").is_empty());

            assert_eq!(form.toggle_group("business"), Some(false));
            assert_eq!(form.group_visible_fields("business"), vec!["company"]);
            form.set_field_value("kind", json!("business")).await.unwrap();
            assert_eq!(form.group_visible_fields("business"), vec!["company", "vat"]);

            assert_eq!(form.toggle_group("basic"), None);
            assert!(!form.set_group_collapsed("business", false));
            assert!(form.remove_group("basic").is_some());
            assert_eq!(form.field_group("kind"), None);

            let events = seen.lock().unwrap();
            assert_eq!(events.len(), 1);
            assert!(matches!(
                &events[0],
                FormEvent::GroupCollapse { name, collapsed: false } if name == "business"
            ));
        }

        #[tokio::test]
        async fn test_destroy_clears_groups() {
            let form = signup();
            form.add_group(FieldGroup::new("all").fields(["name"]));

            form.destroy();

            assert!(form.field_groups().groups().is_empty());
            assert!(!form.move_field("name", 1));
        }
    }

    #[test]
    fn test_touches() {
        assert!(touches("a", ""));
        assert!(touches("a", "a"));
        assert!(touches("a", "a.b"));
        assert!(touches("a.b", "a"));
        assert!(touches("items", "items[0]"));
        assert!(!touches("ab", "a"));
        assert!(!touches("a", "ab.c"));
    }
}

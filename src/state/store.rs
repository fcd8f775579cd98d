//! Field and form state store

use super::field_state::FieldState;
use super::form_state::FormState;
use crate::sync::lock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Notification raised by [`StateStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    Field { name: String, state: FieldState },
    Form(FormState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateSubscriberId(u64);

type StateSubscriber = Arc<dyn Fn(&StateChange) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
struct StateInner {
    fields: BTreeMap<String, FieldState>,
    form: FormState,
    subscribers: Vec<(StateSubscriberId, StateSubscriber)>,
    next_subscriber: u64,
    destroyed: bool,
}

impl StateInner {
    /// Recompute the aggregate; returns it when something changed
    fn recompute(&mut self) -> Option<FormState> {
        let before = self.form.clone();
        self.form.recompute(self.fields.values());
        (self.form != before).then(|| self.form.clone())
    }
}

/// Per-field state plus the aggregate [`FormState`].
///
/// The aggregate is recomputed over every field, but only when a mutation
/// touches `valid`, `dirty`, `touched` or the error list. That full pass is
/// linear in the number of fields.
#[derive(Default)]
pub struct StateStore {
    inner: Mutex<StateInner>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("StateStore")
            .field("fields", &inner.fields.len())
            .field("form", &inner.form)
            .finish()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a field with a fresh state
    pub fn register_field(&self, name: &str, initial_value: Value) {
        let changes = {
            let mut inner = lock(&self.inner);
            if inner.destroyed {
                return;
            }
            let state = FieldState::new(initial_value);
            inner.fields.insert(name.to_string(), state.clone());
            let mut changes = vec![StateChange::Field {
                name: name.to_string(),
                state,
            }];
            changes.extend(inner.recompute().map(StateChange::Form));
            changes
        };
        self.notify(changes);
    }

    pub fn unregister_field(&self, name: &str) -> bool {
        let changes = {
            let mut inner = lock(&self.inner);
            if inner.fields.remove(name).is_none() {
                return false;
            }
            inner.recompute().map(StateChange::Form).into_iter().collect()
        };
        self.notify(changes);
        true
    }

    pub fn has_field(&self, name: &str) -> bool {
        lock(&self.inner).fields.contains_key(name)
    }

    pub fn field_names(&self) -> Vec<String> {
        lock(&self.inner).fields.keys().cloned().collect()
    }

    pub fn field_state(&self, name: &str) -> Option<FieldState> {
        lock(&self.inner).fields.get(name).cloned()
    }

    pub fn all_field_states(&self) -> BTreeMap<String, FieldState> {
        lock(&self.inner).fields.clone()
    }

    pub fn form_state(&self) -> FormState {
        lock(&self.inner).form.clone()
    }

    /// Apply `mutate` to one field. Emits the new field state when it
    /// changed, and the form state when the aggregate moved.
    fn update_field(&self, name: &str, mutate: impl FnOnce(&mut FieldState)) -> bool {
        let changes = {
            let mut inner = lock(&self.inner);
            let Some(state) = inner.fields.get_mut(name) else {
                tracing::debug!("state update for unknown field `{name}` ignored");
                return false;
            };
            let before = state.clone();
            mutate(state);
            if *state == before {
                return false;
            }
            let affects_form = state.aggregate_key() != before.aggregate_key();
            let mut changes = vec![StateChange::Field {
                name: name.to_string(),
                state: state.clone(),
            }];
            if affects_form {
                changes.extend(inner.recompute().map(StateChange::Form));
            }
            changes
        };
        self.notify(changes);
        true
    }

    pub fn set_field_value(&self, name: &str, value: Value) -> bool {
        self.update_field(name, |state| state.set_value(value))
    }

    pub fn set_field_touched(&self, name: &str, touched: bool) -> bool {
        self.update_field(name, |state| state.touched = touched)
    }

    pub fn set_field_validating(&self, name: &str, validating: bool) -> bool {
        self.update_field(name, |state| state.validating = validating)
    }

    pub fn set_field_disabled(&self, name: &str, disabled: bool) -> bool {
        self.update_field(name, |state| state.disabled = disabled)
    }

    pub fn set_field_readonly(&self, name: &str, readonly: bool) -> bool {
        self.update_field(name, |state| state.readonly = readonly)
    }

    pub fn set_field_visible(&self, name: &str, visible: bool) -> bool {
        self.update_field(name, |state| state.visible = visible)
    }

    pub fn set_field_validation_result(&self, name: &str, valid: bool, errors: Vec<String>) -> bool {
        self.update_field(name, |state| state.set_validation_result(valid, errors))
    }

    fn update_form(&self, mutate: impl FnOnce(&mut FormState)) {
        let change = {
            let mut inner = lock(&self.inner);
            let before = inner.form.clone();
            mutate(&mut inner.form);
            if inner.form == before {
                return;
            }
            StateChange::Form(inner.form.clone())
        };
        self.notify(vec![change]);
    }

    pub fn set_form_submitting(&self, submitting: bool) {
        self.update_form(|form| form.submitting = submitting);
    }

    pub fn set_form_validating(&self, validating: bool) {
        self.update_form(|form| form.validating = validating);
    }

    pub fn reset_field_state(&self, name: &str) -> bool {
        self.update_field(name, FieldState::reset)
    }

    /// Reset every field and clear the form's submitting/validating flags
    pub fn reset_all_field_states(&self) {
        let changes = {
            let mut inner = lock(&self.inner);
            let mut changes = Vec::new();
            for (name, state) in inner.fields.iter_mut() {
                let before = state.clone();
                state.reset();
                if *state != before {
                    changes.push(StateChange::Field {
                        name: name.clone(),
                        state: state.clone(),
                    });
                }
            }
            inner.form.submitting = false;
            inner.form.validating = false;
            inner.recompute();
            changes.push(StateChange::Form(inner.form.clone()));
            changes
        };
        self.notify(changes);
    }

    pub fn subscribe<F>(&self, subscriber: F) -> StateSubscriberId
    where
        F: Fn(&StateChange) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        inner.next_subscriber += 1;
        let id = StateSubscriberId(inner.next_subscriber);
        inner.subscribers.push((id, Arc::new(subscriber)));
        id
    }

    pub fn unsubscribe(&self, id: StateSubscriberId) -> bool {
        let mut inner = lock(&self.inner);
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(existing, _)| *existing != id);
        inner.subscribers.len() != before
    }

    pub fn destroy(&self) {
        let mut inner = lock(&self.inner);
        inner.fields.clear();
        inner.subscribers.clear();
        inner.form = FormState::default();
        inner.destroyed = true;
    }

    fn notify(&self, changes: Vec<StateChange>) {
        if changes.is_empty() {
            return;
        }
        let subscribers: Vec<StateSubscriber> = lock(&self.inner)
            .subscribers
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();
        for change in &changes {
            for subscriber in &subscribers {
                if let Err(err) = subscriber(change) {
                    tracing::error!("state subscriber failed: {err:#}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn recording(store: &StateStore) -> Arc<Mutex<Vec<StateChange>>> {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        store.subscribe(move |change| {
            sink.lock().unwrap().push(change.clone());
            Ok(())
        });
        changes
    }

    fn form_changes(changes: &Mutex<Vec<StateChange>>) -> usize {
        changes
            .lock()
            .unwrap()
            .iter()
            .filter(|change| matches!(change, StateChange::Form(_)))
            .count()
    }

    #[test]
    fn test_dirty_then_reset() {
        let store = StateStore::new();
        store.register_field("name", json!("John"));

        store.set_field_value("name", json!("Alice"));
        assert!(store.field_state("name").unwrap().dirty);
        assert!(store.form_state().dirty);

        store.set_field_validation_result("name", false, vec!["too short".into()]);
        store.reset_all_field_states();

        let state = store.field_state("name").unwrap();
        assert_eq!(state.value, json!("John"));
        assert!(!state.dirty);
        assert!(state.errors.is_empty());
        assert!(store.form_state().pristine);
    }

    #[test]
    fn test_form_aggregates_validity() {
        let store = StateStore::new();
        store.register_field("a", json!(null));
        store.register_field("b", json!(null));

        store.set_field_validation_result("a", false, vec!["x".into(), "y".into()]);
        let form = store.form_state();
        assert!(!form.valid);
        assert_eq!(form.error_count, 2);
        assert_eq!(form.field_count, 2);

        store.set_field_validation_result("a", true, Vec::new());
        assert!(store.form_state().valid);
        assert_eq!(store.form_state().error_count, 0);
    }

    #[test]
    fn test_only_aggregate_attributes_recompute_form() {
        let store = StateStore::new();
        store.register_field("a", json!(1));
        let changes = recording(&store);

        store.set_field_disabled("a", true);
        store.set_field_validating("a", true);
        store.set_field_visible("a", false);
        assert_eq!(form_changes(&changes), 0);

        store.set_field_touched("a", true);
        assert_eq!(form_changes(&changes), 1);
    }

    #[test]
    fn test_unchanged_mutation_is_silent() {
        let store = StateStore::new();
        store.register_field("a", json!(1));
        let changes = recording(&store);

        assert!(!store.set_field_value("a", json!(1)));
        assert!(!store.set_field_touched("unknown", true));
        assert!(changes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_form_flags() {
        let store = StateStore::new();
        store.set_form_submitting(true);
        store.set_form_validating(true);
        assert!(store.form_state().submitting);
        assert!(store.form_state().validating);

        store.reset_all_field_states();
        assert!(!store.form_state().submitting);
    }

    #[test]
    fn test_unregister_updates_count() {
        let store = StateStore::new();
        store.register_field("a", json!(1));
        store.register_field("b", json!(2));

        assert!(store.unregister_field("a"));
        assert!(!store.unregister_field("a"));
        assert_eq!(store.form_state().field_count, 1);
        assert_eq!(store.field_names(), vec!["b".to_string()]);
    }
}

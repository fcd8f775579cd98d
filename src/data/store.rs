//! Path-addressed value store with snapshots and change notification

use super::path::{delete_in, get_in, parse_path, set_in, values_equal};
use crate::error::Result;
use crate::sync::lock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A single write to the store. `path` is empty for whole-store writes
/// (reset, snapshot restore).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataChange {
    pub path: String,
    pub value: Value,
    pub old_value: Value,
}

impl DataChange {
    pub fn is_whole_store(&self) -> bool {
        self.path.is_empty()
    }
}

/// Saved deep copy of the store's values
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub values: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Subscriber = Arc<dyn Fn(&DataChange) -> anyhow::Result<()> + Send + Sync>;

struct StoreInner {
    data: Value,
    initial: Value,
    snapshots: Vec<Snapshot>,
    subscribers: Vec<(SubscriberId, Subscriber)>,
    next_subscriber: u64,
    destroyed: bool,
}

/// Nested form values addressed by paths such as `profile.age` or
/// `items[0].id`.
///
/// Subscribers are called synchronously after each effective write, once the
/// store's lock has been released, so they may read the store again.
pub struct PathStore {
    inner: Mutex<StoreInner>,
}

impl std::fmt::Debug for PathStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("PathStore")
            .field("data", &inner.data)
            .field("snapshots", &inner.snapshots.len())
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

fn as_object(values: Value) -> Value {
    match values {
        Value::Object(_) => values,
        _ => Value::Object(Map::new()),
    }
}

impl PathStore {
    /// Create a store; non-object initial values are replaced by `{}`
    pub fn new(initial: Value) -> Self {
        let initial = as_object(initial);
        Self {
            inner: Mutex::new(StoreInner {
                data: initial.clone(),
                initial,
                snapshots: Vec::new(),
                subscribers: Vec::new(),
                next_subscriber: 1,
                destroyed: false,
            }),
        }
    }

    /// Value at `path`, or `None` when absent or when the path is malformed
    pub fn get(&self, path: &str) -> Option<Value> {
        let segments = match parse_path(path) {
            Ok(segments) => segments,
            Err(err) => {
                tracing::debug!("{err}");
                return None;
            }
        };
        get_in(&lock(&self.inner).data, &segments).cloned()
    }

    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).unwrap_or(default)
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Deep copy of every value
    pub fn get_all(&self) -> Value {
        lock(&self.inner).data.clone()
    }

    pub fn initial_values(&self) -> Value {
        lock(&self.inner).initial.clone()
    }

    /// Write `value` at `path`. Returns `Ok(false)` without notifying when
    /// the stored value is already deep-equal; numbers compare by value, so
    /// `1` and `1.0` are equal.
    pub fn set(&self, path: &str, value: Value, silent: bool) -> Result<bool> {
        let segments = parse_path(path)?;
        let change = {
            let mut inner = lock(&self.inner);
            if inner.destroyed {
                return Ok(false);
            }
            let current = get_in(&inner.data, &segments);
            if current.is_some_and(|current| values_equal(current, &value)) {
                return Ok(false);
            }
            let old_value = current.cloned().unwrap_or(Value::Null);
            set_in(&mut inner.data, &segments, value.clone())?;
            DataChange {
                path: path.to_string(),
                value,
                old_value,
            }
        };

        if !silent {
            self.notify(&change);
        }
        Ok(true)
    }

    /// Apply each entry through [`PathStore::set`]; every changed key raises
    /// its own notification. Returns how many keys changed.
    pub fn set_many(&self, values: &Map<String, Value>, silent: bool) -> Result<usize> {
        let mut changed = 0;
        for (path, value) in values {
            if self.set(path, value.clone(), silent)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Remove an object key or splice an array element
    pub fn delete(&self, path: &str, silent: bool) -> Result<bool> {
        let segments = parse_path(path)?;
        let change = {
            let mut inner = lock(&self.inner);
            if inner.destroyed {
                return Ok(false);
            }
            let Some(old_value) = get_in(&inner.data, &segments).cloned() else {
                return Ok(false);
            };
            if !delete_in(&mut inner.data, &segments) {
                return Ok(false);
            }
            DataChange {
                path: path.to_string(),
                value: Value::Null,
                old_value,
            }
        };

        if !silent {
            self.notify(&change);
        }
        Ok(true)
    }

    /// Value at `path` in the initial values
    pub fn initial_value(&self, path: &str) -> Option<Value> {
        let segments = parse_path(path).ok()?;
        get_in(&lock(&self.inner).initial, &segments).cloned()
    }

    /// Record `value` at `path` in the initial values only. Used when a field
    /// joins after construction so a later reset keeps its value.
    pub fn set_initial(&self, path: &str, value: Value) -> Result<()> {
        let segments = parse_path(path)?;
        let mut inner = lock(&self.inner);
        if inner.destroyed {
            return Ok(());
        }
        set_in(&mut inner.initial, &segments, value)
    }

    /// Restore the values captured at construction (or by `reset_to`)
    pub fn reset(&self, silent: bool) {
        let change = {
            let mut inner = lock(&self.inner);
            if inner.destroyed {
                return;
            }
            let values = inner.initial.clone();
            let old_value = std::mem::replace(&mut inner.data, values.clone());
            whole_store_change(values, old_value)
        };
        if !silent {
            self.notify(&change);
        }
    }

    /// Replace both the current and the initial values
    pub fn reset_to(&self, values: Value, silent: bool) {
        let values = as_object(values);
        let change = {
            let mut inner = lock(&self.inner);
            if inner.destroyed {
                return;
            }
            inner.initial = values.clone();
            let old_value = std::mem::replace(&mut inner.data, values.clone());
            whole_store_change(values, old_value)
        };
        if !silent {
            self.notify(&change);
        }
    }

    /// Push a deep copy of the current values and return its id
    pub fn snapshot(&self) -> Uuid {
        let mut inner = lock(&self.inner);
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            taken_at: Utc::now(),
            values: inner.data.clone(),
        };
        let id = snapshot.id;
        inner.snapshots.push(snapshot);
        tracing::debug!("snapshot {id} taken ({} on stack)", inner.snapshots.len());
        id
    }

    /// Pop the most recent snapshot and replace all values with it
    pub fn restore_snapshot(&self, silent: bool) -> bool {
        let change = {
            let mut inner = lock(&self.inner);
            let Some(snapshot) = inner.snapshots.pop() else {
                return false;
            };
            let old_value = std::mem::replace(&mut inner.data, snapshot.values.clone());
            whole_store_change(snapshot.values, old_value)
        };
        if !silent {
            self.notify(&change);
        }
        true
    }

    pub fn clear_snapshots(&self) {
        lock(&self.inner).snapshots.clear();
    }

    pub fn snapshot_count(&self) -> usize {
        lock(&self.inner).snapshots.len()
    }

    /// Whether the value at `path` (or the whole store) differs from the
    /// initial values
    pub fn is_dirty(&self, path: Option<&str>) -> bool {
        let inner = lock(&self.inner);
        match path {
            None => !values_equal(&inner.data, &inner.initial),
            Some(path) => match parse_path(path) {
                Ok(segments) => {
                    match (get_in(&inner.data, &segments), get_in(&inner.initial, &segments)) {
                        (Some(current), Some(initial)) => !values_equal(current, initial),
                        (current, initial) => current.is_some() != initial.is_some(),
                    }
                }
                Err(_) => false,
            },
        }
    }

    pub fn subscribe<F>(&self, subscriber: F) -> SubscriberId
    where
        F: Fn(&DataChange) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        let id = SubscriberId(inner.next_subscriber);
        inner.next_subscriber += 1;
        inner.subscribers.push((id, Arc::new(subscriber)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut inner = lock(&self.inner);
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(existing, _)| *existing != id);
        inner.subscribers.len() != before
    }

    /// Drop values, snapshots and subscribers; later writes are ignored
    pub fn destroy(&self) {
        let mut inner = lock(&self.inner);
        inner.subscribers.clear();
        inner.snapshots.clear();
        inner.data = Value::Object(Map::new());
        inner.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        lock(&self.inner).destroyed
    }

    fn notify(&self, change: &DataChange) {
        let subscribers: Vec<Subscriber> = lock(&self.inner)
            .subscribers
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();
        for subscriber in subscribers {
            if let Err(err) = subscriber(change) {
                tracing::error!("data subscriber failed for `{}`: {err:#}", change.path);
            }
        }
    }
}

fn whole_store_change(value: Value, old_value: Value) -> DataChange {
    DataChange {
        path: String::new(),
        value,
        old_value,
    }
}

//! Array-valued fields: add, remove and reorder items

use super::store::PathStore;
use crate::error::{FormError, Result};
use serde_json::Value;

impl PathStore {
    /// Items of the array at `path`; absent or null counts as empty
    fn items(&self, path: &str) -> Result<Vec<Value>> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(FormError::InvalidPath {
                path: path.to_string(),
                reason: "value is not an array".to_string(),
            }),
        }
    }

    pub fn item_count(&self, path: &str) -> usize {
        self.items(path).map_or(0, |items| items.len())
    }

    /// Insert `value` at `index`, or append when `index` is `None`
    pub fn insert_item(&self, path: &str, value: Value, index: Option<usize>) -> Result<()> {
        let mut items = self.items(path)?;
        let index = index.unwrap_or(items.len());
        if index > items.len() {
            return Err(FormError::IndexOutOfRange {
                path: path.to_string(),
                index,
                len: items.len(),
            });
        }
        items.insert(index, value);
        self.set(path, Value::Array(items), false)?;
        Ok(())
    }

    /// Remove and return the item at `index`
    pub fn remove_item(&self, path: &str, index: usize) -> Result<Value> {
        let mut items = self.items(path)?;
        if index >= items.len() {
            return Err(FormError::IndexOutOfRange {
                path: path.to_string(),
                index,
                len: items.len(),
            });
        }
        let removed = items.remove(index);
        self.set(path, Value::Array(items), false)?;
        Ok(removed)
    }

    /// Move the item at `from` so it ends up at `to`
    pub fn move_item(&self, path: &str, from: usize, to: usize) -> Result<()> {
        let mut items = self.items(path)?;
        let len = items.len();
        for index in [from, to] {
            if index >= len {
                return Err(FormError::IndexOutOfRange {
                    path: path.to_string(),
                    index,
                    len,
                });
            }
        }
        if from == to {
            return Ok(());
        }
        let item = items.remove(from);
        items.insert(to, item);
        self.set(path, Value::Array(items), false)?;
        Ok(())
    }
}

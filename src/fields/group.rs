//! Named field groups that can be collapsed or hidden as a unit

use super::condition::Condition;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// A titled section of fields
#[derive(Debug, Clone)]
pub struct FieldGroup {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Member field names in display order
    pub fields: Vec<String>,
    pub collapsible: bool,
    pub default_collapsed: bool,
    pub visible: Condition,
}

impl FieldGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            fields: Vec::new(),
            collapsible: false,
            default_collapsed: false,
            visible: Condition::Static(true),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Allow collapsing; `collapsed` is the starting state
    pub fn collapsible(mut self, collapsed: bool) -> Self {
        self.collapsible = true;
        self.default_collapsed = collapsed;
        self
    }

    pub fn visible(mut self, condition: impl Into<Condition>) -> Self {
        self.visible = condition.into();
        self
    }
}

/// Registry of [`FieldGroup`]s with a field to group lookup.
///
/// A field belongs to at most one group; registering it in a second group
/// moves it there.
#[derive(Debug, Default)]
pub struct GroupManager {
    groups: Vec<FieldGroup>,
    collapsed: HashSet<String>,
    field_to_group: HashMap<String, String>,
}

impl GroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|group| group.name == name)
    }

    /// Register or replace a group
    pub fn register_group(&mut self, group: FieldGroup) {
        if let Some(previous) = self.unregister_group(&group.name) {
            warn!(group = %previous.name, "replacing field group");
        }
        for field in &group.fields {
            if let Some(other) = self.field_to_group.insert(field.clone(), group.name.clone()) {
                if let Some(slot) = self.slot(&other) {
                    self.groups[slot].fields.retain(|member| member != field);
                }
            }
        }
        if group.collapsible && group.default_collapsed {
            self.collapsed.insert(group.name.clone());
        }
        self.groups.push(group);
    }

    pub fn register_groups(&mut self, groups: impl IntoIterator<Item = FieldGroup>) {
        for group in groups {
            self.register_group(group);
        }
    }

    pub fn unregister_group(&mut self, name: &str) -> Option<FieldGroup> {
        let slot = self.slot(name)?;
        let group = self.groups.remove(slot);
        for field in &group.fields {
            self.field_to_group.remove(field);
        }
        self.collapsed.remove(name);
        Some(group)
    }

    pub fn group(&self, name: &str) -> Option<&FieldGroup> {
        self.slot(name).map(|slot| &self.groups[slot])
    }

    /// Groups in registration order
    pub fn groups(&self) -> &[FieldGroup] {
        &self.groups
    }

    /// Name of the group `field` belongs to
    pub fn field_group(&self, field: &str) -> Option<&str> {
        self.field_to_group.get(field).map(String::as_str)
    }

    /// Flip a collapsible group. Returns the new state, or `None` for an
    /// unknown or non-collapsible group.
    pub fn toggle_group(&mut self, name: &str) -> Option<bool> {
        let collapsed = !self.is_group_collapsed(name);
        self.set_group_collapsed(name, collapsed).then_some(collapsed)
    }

    /// Returns whether the state changed
    pub fn set_group_collapsed(&mut self, name: &str, collapsed: bool) -> bool {
        if !self.group(name).is_some_and(|group| group.collapsible) {
            return false;
        }
        if collapsed {
            self.collapsed.insert(name.to_string())
        } else {
            self.collapsed.remove(name)
        }
    }

    pub fn is_group_collapsed(&self, name: &str) -> bool {
        self.collapsed.contains(name)
    }

    /// Whether the group's own condition shows it; failing predicates show it
    pub fn is_group_visible(&self, name: &str, values: &Value) -> bool {
        self.group(name)
            .is_some_and(|group| group.visible.evaluate(values, true, name, "visible"))
    }

    /// Member fields on screen: none while the group is hidden or collapsed
    pub fn group_visible_fields(&self, name: &str, values: &Value) -> Vec<String> {
        match self.group(name) {
            Some(group) if !self.is_group_collapsed(name) && self.is_group_visible(name, values) => {
                group.fields.clone()
            }
            _ => Vec::new(),
        }
    }

    /// Visible fields of every group, in group order
    pub fn all_visible_fields(&self, values: &Value) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|group| self.group_visible_fields(&group.name, values))
            .collect()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.collapsed.clear();
        self.field_to_group.clear();
    }
}

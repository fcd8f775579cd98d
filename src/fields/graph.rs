//! Field registry with dependency edges

use super::condition::Condition;
use crate::layout::{LayoutField, Span};
use crate::validation::ValidationRule;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// Everything the form knows about one field
#[derive(Debug, Clone)]
pub struct FieldConfig {
    pub name: String,
    pub label: Option<String>,
    pub span: Span,
    pub rules: Vec<ValidationRule>,
    pub required: bool,
    pub default_value: Option<Value>,
    pub disabled: Condition,
    pub readonly: Condition,
    pub visible: Condition,
    /// Fields whose changes revalidate this one
    pub dependencies: Vec<String>,
    pub placeholder: Option<String>,
    pub tooltip: Option<String>,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            span: Span::default(),
            rules: Vec::new(),
            required: false,
            default_value: None,
            disabled: Condition::Static(false),
            readonly: Condition::Static(false),
            visible: Condition::Static(true),
            dependencies: Vec::new(),
            placeholder: None,
            tooltip: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn span(mut self, span: impl Into<Span>) -> Self {
        self.span = span.into();
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = ValidationRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn disabled(mut self, condition: impl Into<Condition>) -> Self {
        self.disabled = condition.into();
        self
    }

    pub fn readonly(mut self, condition: impl Into<Condition>) -> Self {
        self.readonly = condition.into();
        self
    }

    pub fn visible(mut self, condition: impl Into<Condition>) -> Self {
        self.visible = condition.into();
        self
    }

    pub fn depends_on<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    /// Whether a required marker is shown, from the flag or a `required` rule
    pub fn is_required(&self) -> bool {
        self.required || self.rules.iter().any(ValidationRule::is_required)
    }

    pub(crate) fn layout_field(&self, visible: bool) -> LayoutField {
        LayoutField {
            name: self.name.clone(),
            label: self.label.clone(),
            span: self.span,
            visible,
            required: self.is_required(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct NodeId(usize);

#[derive(Debug)]
struct Node {
    name: String,
    /// `None` for fields only known as a dependency target
    config: Option<FieldConfig>,
    depends_on: BTreeSet<NodeId>,
    dependents: BTreeSet<NodeId>,
}

impl Node {
    fn is_orphan(&self) -> bool {
        self.config.is_none() && self.depends_on.is_empty() && self.dependents.is_empty()
    }
}

/// Registered fields in display order, with forward and reverse dependency
/// edges kept in sync.
///
/// Nodes live in an arena; slots of removed fields and of dependency targets
/// nobody points at any more are recycled.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: HashMap<String, NodeId>,
    order: Vec<NodeId>,
    free: Vec<NodeId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node_id(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let node = Node {
            name: name.to_string(),
            config: None,
            depends_on: BTreeSet::new(),
            dependents: BTreeSet::new(),
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        };
        self.index.insert(name.to_string(), id);
        id
    }

    /// Return `id` to the free list once nothing refers to it
    fn release_if_orphan(&mut self, id: NodeId) {
        if self.nodes[id.0].is_orphan() {
            let name = std::mem::take(&mut self.nodes[id.0].name);
            self.index.remove(&name);
            self.free.push(id);
        }
    }

    fn registered(&self, name: &str) -> Option<&Node> {
        self.index
            .get(name)
            .map(|id| &self.nodes[id.0])
            .filter(|node| node.config.is_some())
    }

    fn names(&self, ids: &BTreeSet<NodeId>) -> Vec<String> {
        ids.iter().map(|id| self.nodes[id.0].name.clone()).collect()
    }

    fn set_edges(&mut self, id: NodeId, dependencies: &[String]) {
        let old = std::mem::take(&mut self.nodes[id.0].depends_on);
        let mut dropped = Vec::new();
        for dep in old {
            self.nodes[dep.0].dependents.remove(&id);
            dropped.push(dep);
        }
        for dep in dependencies {
            let dep = self.node_id(dep);
            self.nodes[id.0].depends_on.insert(dep);
            self.nodes[dep.0].dependents.insert(id);
        }
        for dep in dropped {
            if dep != id {
                self.release_if_orphan(dep);
            }
        }
    }

    /// Register or replace a field. New fields go to the end.
    pub fn register_field(&mut self, config: FieldConfig) {
        self.register_field_at(config, None);
    }

    /// Register a field at `index` in display order (clamped; `None`
    /// appends). A field that already exists is replaced in place. Returns
    /// the field's position.
    pub fn register_field_at(&mut self, config: FieldConfig, index: Option<usize>) -> usize {
        let id = self.node_id(&config.name);
        let dependencies = config.dependencies.clone();
        if self.nodes[id.0].config.replace(config).is_none() {
            let at = index.map_or(self.order.len(), |index| index.min(self.order.len()));
            self.order.insert(at, id);
        }
        self.set_edges(id, &dependencies);

        if self.has_circular_dependency(&self.nodes[id.0].name) {
            warn!(field = %self.nodes[id.0].name, "circular field dependency");
        }
        self.order.iter().position(|other| *other == id).unwrap_or_default()
    }

    /// Remove a field and every edge touching it
    pub fn unregister_field(&mut self, name: &str) -> Option<FieldConfig> {
        let id = *self.index.get(name)?;
        let config = self.nodes[id.0].config.take()?;
        self.order.retain(|other| *other != id);

        self.set_edges(id, &[]);
        let dependents = std::mem::take(&mut self.nodes[id.0].dependents);
        for dependent in dependents {
            self.nodes[dependent.0].depends_on.remove(&id);
            if let Some(config) = self.nodes[dependent.0].config.as_mut() {
                config.dependencies.retain(|dep| dep != name);
            }
        }
        self.release_if_orphan(id);
        Some(config)
    }

    /// Position of `name` in display order
    pub fn position(&self, name: &str) -> Option<usize> {
        let id = self.index.get(name)?;
        self.order.iter().position(|other| other == id)
    }

    /// Move a field to `to` in display order. Returns the old position, or
    /// `None` when the field is unknown or `to` is out of range.
    pub fn move_field(&mut self, name: &str, to: usize) -> Option<usize> {
        let from = self.position(name)?;
        if to >= self.order.len() {
            return None;
        }
        let id = self.order.remove(from);
        self.order.insert(to, id);
        Some(from)
    }

    /// Exchange the display positions of two fields
    pub fn swap_fields(&mut self, a: &str, b: &str) -> bool {
        match (self.position(a), self.position(b)) {
            (Some(a), Some(b)) => {
                self.order.swap(a, b);
                true
            }
            _ => false,
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.registered(name).is_some()
    }

    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.registered(name).and_then(|node| node.config.as_ref())
    }

    /// Edit a field in place; edges follow any change to `dependencies`
    pub fn update_field(&mut self, name: &str, update: impl FnOnce(&mut FieldConfig)) -> bool {
        let Some(&id) = self.index.get(name) else {
            return false;
        };
        let Some(config) = self.nodes[id.0].config.as_mut() else {
            return false;
        };
        let before = config.dependencies.clone();
        update(config);
        config.name = name.to_string();

        let after = config.dependencies.clone();
        if before != after {
            self.set_edges(id, &after);
        }
        true
    }

    pub fn all_fields(&self) -> Vec<&FieldConfig> {
        self.order
            .iter()
            .filter_map(|id| self.nodes[id.0].config.as_ref())
            .collect()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.order
            .iter()
            .map(|id| self.nodes[id.0].name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Fields `name` depends on
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.index
            .get(name)
            .map(|id| self.names(&self.nodes[id.0].depends_on))
            .unwrap_or_default()
    }

    /// Fields that depend on `name`
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.index
            .get(name)
            .map(|id| self.names(&self.nodes[id.0].dependents))
            .unwrap_or_default()
    }

    /// Whether a dependency cycle is reachable from `name`
    pub fn has_circular_dependency(&self, name: &str) -> bool {
        let Some(&start) = self.index.get(name) else {
            return false;
        };
        let mut on_path = vec![false; self.nodes.len()];
        let mut done = vec![false; self.nodes.len()];
        self.reaches_cycle(start, &mut on_path, &mut done)
    }

    fn reaches_cycle(&self, id: NodeId, on_path: &mut [bool], done: &mut [bool]) -> bool {
        if on_path[id.0] {
            return true;
        }
        if done[id.0] {
            return false;
        }
        on_path[id.0] = true;
        for dep in &self.nodes[id.0].depends_on {
            if self.reaches_cycle(*dep, on_path, done) {
                return true;
            }
        }
        on_path[id.0] = false;
        done[id.0] = true;
        false
    }

    /// Unknown fields are hidden; failing predicates show the field
    pub fn is_field_visible(&self, name: &str, values: &Value) -> bool {
        self.field(name)
            .is_some_and(|config| config.visible.evaluate(values, true, name, "visible"))
    }

    pub fn is_field_disabled(&self, name: &str, values: &Value) -> bool {
        self.field(name)
            .is_some_and(|config| config.disabled.evaluate(values, false, name, "disabled"))
    }

    pub fn is_field_readonly(&self, name: &str, values: &Value) -> bool {
        self.field(name)
            .is_some_and(|config| config.readonly.evaluate(values, false, name, "readonly"))
    }

    pub fn visible_fields(&self, values: &Value) -> Vec<&FieldConfig> {
        self.all_fields()
            .into_iter()
            .filter(|config| config.visible.evaluate(values, true, &config.name, "visible"))
            .collect()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.order.clear();
        self.free.clear();
    }
}

//! Field configuration, conditions, groups and the dependency graph

mod condition;
mod graph;
mod group;

pub use condition::{Condition, Predicate};
pub use graph::{DependencyGraph, FieldConfig};
pub use group::{FieldGroup, GroupManager};

//! Static or computed field flags

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::error;

pub type Predicate = Arc<dyn Fn(&Value) -> anyhow::Result<bool> + Send + Sync>;

/// A boolean that may depend on the current form values
#[derive(Clone)]
pub enum Condition {
    Static(bool),
    Computed(Predicate),
}

impl Condition {
    pub fn computed<F>(predicate: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Condition::Computed(Arc::new(predicate))
    }

    /// Evaluate against `values`; a failing predicate yields `fallback`
    pub fn evaluate(&self, values: &Value, fallback: bool, field: &str, flag: &str) -> bool {
        match self {
            Condition::Static(value) => *value,
            Condition::Computed(predicate) => match predicate(values) {
                Ok(value) => value,
                Err(err) => {
                    error!(field, flag, error = %err, "condition failed, using {fallback}");
                    fallback
                }
            },
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Condition::Computed(_))
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Condition::Static(value)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Condition::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_static_and_computed() {
        let values = json!({"kind": "company"});
        assert!(Condition::from(true).evaluate(&values, false, "f", "visible"));

        let is_company = Condition::computed(|v| Ok(v["kind"] == "company"));
        assert!(is_company.evaluate(&values, false, "f", "visible"));
        assert!(!is_company.evaluate(&json!({}), true, "f", "visible"));
        assert!(is_company.is_computed());
    }

    #[test]
    fn test_failure_uses_fallback() {
        let broken = Condition::computed(|_| anyhow::bail!("boom"));
        assert!(broken.evaluate(&json!({}), true, "f", "visible"));
        assert!(!broken.evaluate(&json!({}), false, "f", "disabled"));
    }
}

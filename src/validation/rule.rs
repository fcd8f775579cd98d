//! Validation rule model

use super::traits::AsyncValidator;
use crate::error::{FormError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle moment at which a rule runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Change,
    Blur,
    Submit,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Change => "change",
            Trigger::Blur => "blur",
            Trigger::Submit => "submit",
        }
    }
}

/// Warnings are reported but never fail validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleLevel {
    #[default]
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordLevel {
    Weak,
    Medium,
    Strong,
}

/// Rules shipped with the engine
#[derive(Debug, Clone)]
pub enum BuiltinRule {
    Required,
    Email,
    Url,
    Phone,
    Number,
    Integer,
    Min(f64),
    Max(f64),
    Range { min: f64, max: f64 },
    MinLength(usize),
    MaxLength(usize),
    Length { min: usize, max: usize },
    Pattern(Regex),
    OneOf(Vec<Value>),
    /// Must equal the value at another path
    Confirm(String),
    CompareWith { field: String, op: CompareOp },
    IdCard,
    CreditCard,
    Ip,
    PostalCode,
    /// Allowed file extensions, without the dot
    FileType(Vec<String>),
    PasswordStrength(PasswordLevel),
}

impl BuiltinRule {
    pub fn type_name(&self) -> &'static str {
        match self {
            BuiltinRule::Required => "required",
            BuiltinRule::Email => "email",
            BuiltinRule::Url => "url",
            BuiltinRule::Phone => "phone",
            BuiltinRule::Number => "number",
            BuiltinRule::Integer => "integer",
            BuiltinRule::Min(_) => "min",
            BuiltinRule::Max(_) => "max",
            BuiltinRule::Range { .. } => "range",
            BuiltinRule::MinLength(_) => "minLength",
            BuiltinRule::MaxLength(_) => "maxLength",
            BuiltinRule::Length { .. } => "length",
            BuiltinRule::Pattern(_) => "pattern",
            BuiltinRule::OneOf(_) => "oneOf",
            BuiltinRule::Confirm(_) => "confirm",
            BuiltinRule::CompareWith { .. } => "compareWith",
            BuiltinRule::IdCard => "idCard",
            BuiltinRule::CreditCard => "creditCard",
            BuiltinRule::Ip => "ip",
            BuiltinRule::PostalCode => "postalCode",
            BuiltinRule::FileType(_) => "fileType",
            BuiltinRule::PasswordStrength(_) => "passwordStrength",
        }
    }

    /// Parameters in the shape a [`RuleSpec`] carries them
    pub fn params(&self) -> Value {
        match self {
            BuiltinRule::Min(n) | BuiltinRule::Max(n) => json!(n),
            BuiltinRule::Range { min, max } => json!([min, max]),
            BuiltinRule::MinLength(n) | BuiltinRule::MaxLength(n) => json!(n),
            BuiltinRule::Length { min, max } => json!({"min": min, "max": max}),
            BuiltinRule::Pattern(re) => json!(re.as_str()),
            BuiltinRule::OneOf(options) => Value::Array(options.clone()),
            BuiltinRule::Confirm(field) => json!(field),
            BuiltinRule::CompareWith { field, op } => json!({"field": field, "operator": op}),
            BuiltinRule::FileType(types) => json!(types),
            BuiltinRule::PasswordStrength(level) => json!(level),
            _ => Value::Null,
        }
    }

    /// Path of another field whose value this rule reads
    pub fn referenced_field(&self) -> Option<&str> {
        match self {
            BuiltinRule::Confirm(field) | BuiltinRule::CompareWith { field, .. } => {
                Some(field.as_str())
            }
            _ => None,
        }
    }
}

/// Result of running one validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorOutput {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidatorOutput {
    pub fn pass() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

impl From<bool> for ValidatorOutput {
    fn from(valid: bool) -> Self {
        Self {
            valid,
            message: None,
        }
    }
}

/// A bare message means failure
impl From<&str> for ValidatorOutput {
    fn from(message: &str) -> Self {
        Self::fail(message)
    }
}

impl From<String> for ValidatorOutput {
    fn from(message: String) -> Self {
        Self::fail(message)
    }
}

/// What a synchronous validator sees besides the value under test
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub field: &'a str,
    pub values: &'a Value,
    pub params: &'a Value,
}

pub type ValidatorFn =
    Arc<dyn Fn(&Value, &RuleContext<'_>) -> anyhow::Result<ValidatorOutput> + Send + Sync>;

/// How a rule is executed
#[derive(Clone)]
pub enum RuleKind {
    Builtin(BuiltinRule),
    /// Resolved through the engine's validator registry
    Named { type_name: String, params: Value },
    Custom(ValidatorFn),
    Async(Arc<dyn AsyncValidator>),
}

impl fmt::Debug for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Builtin(rule) => f.debug_tuple("Builtin").field(rule).finish(),
            RuleKind::Named { type_name, params } => f
                .debug_struct("Named")
                .field("type_name", type_name)
                .field("params", params)
                .finish(),
            RuleKind::Custom(_) => f.write_str("Custom(..)"),
            RuleKind::Async(_) => f.write_str("Async(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationRule {
    pub kind: RuleKind,
    pub message: Option<String>,
    /// `None` runs on every trigger
    pub trigger: Option<Trigger>,
    /// Execution rank, lowest first; equal ranks keep declared order
    pub priority: i32,
    pub level: RuleLevel,
    /// Applies to async validators
    pub timeout: Option<Duration>,
}

impl ValidationRule {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            message: None,
            trigger: None,
            priority: 0,
            level: RuleLevel::Error,
            timeout: None,
        }
    }

    pub fn builtin(rule: BuiltinRule) -> Self {
        Self::new(RuleKind::Builtin(rule))
    }

    pub fn required() -> Self {
        Self::builtin(BuiltinRule::Required)
    }

    pub fn email() -> Self {
        Self::builtin(BuiltinRule::Email)
    }

    pub fn min_length(len: usize) -> Self {
        Self::builtin(BuiltinRule::MinLength(len))
    }

    pub fn max_length(len: usize) -> Self {
        Self::builtin(BuiltinRule::MaxLength(len))
    }

    pub fn min(value: f64) -> Self {
        Self::builtin(BuiltinRule::Min(value))
    }

    pub fn max(value: f64) -> Self {
        Self::builtin(BuiltinRule::Max(value))
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(Self::builtin(BuiltinRule::Pattern(Regex::new(pattern)?)))
    }

    pub fn confirm(field: impl Into<String>) -> Self {
        Self::builtin(BuiltinRule::Confirm(field.into()))
    }

    pub fn named(type_name: impl Into<String>, params: Value) -> Self {
        Self::new(RuleKind::Named {
            type_name: type_name.into(),
            params,
        })
    }

    pub fn custom<F>(validator: F) -> Self
    where
        F: Fn(&Value, &RuleContext<'_>) -> anyhow::Result<ValidatorOutput> + Send + Sync + 'static,
    {
        Self::new(RuleKind::Custom(Arc::new(validator)))
    }

    pub fn async_validator(validator: Arc<dyn AsyncValidator>) -> Self {
        Self::new(RuleKind::Async(validator))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn on(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn as_warning(mut self) -> Self {
        self.level = RuleLevel::Warning;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Name used for registry overrides and cache keys
    pub fn type_name(&self) -> &str {
        match &self.kind {
            RuleKind::Builtin(rule) => rule.type_name(),
            RuleKind::Named { type_name, .. } => type_name,
            RuleKind::Custom(_) => "custom",
            RuleKind::Async(_) => "async",
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self.kind, RuleKind::Builtin(BuiltinRule::Required))
    }

    /// Whether the rule runs for `trigger`; `None` selects every rule
    pub fn applies_to(&self, trigger: Option<Trigger>) -> bool {
        match (self.trigger, trigger) {
            (None, _) | (_, None) => true,
            (Some(own), Some(requested)) => own == requested,
        }
    }
}

/// Declarative rule as found in form definition files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleSpec {
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    pub priority: i32,
    pub level: RuleLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn invalid_rule(spec: &RuleSpec, expected: &str) -> FormError {
    FormError::InvalidRule(format!(
        "`{}` expects {expected}, got {}",
        spec.rule_type, spec.value
    ))
}

fn number_param(spec: &RuleSpec) -> Result<f64> {
    spec.value
        .as_f64()
        .ok_or_else(|| invalid_rule(spec, "a number"))
}

fn length_param(spec: &RuleSpec) -> Result<usize> {
    spec.value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid_rule(spec, "a non-negative integer"))
}

fn string_param(spec: &RuleSpec) -> Result<String> {
    spec.value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid_rule(spec, "a string"))
}

/// `[min, max]` or `{"min": .., "max": ..}`
fn bounds_param(spec: &RuleSpec) -> Option<(Value, Value)> {
    match &spec.value {
        Value::Array(pair) if pair.len() == 2 => Some((pair[0].clone(), pair[1].clone())),
        Value::Object(map) => Some((map.get("min")?.clone(), map.get("max")?.clone())),
        _ => None,
    }
}

impl TryFrom<RuleSpec> for ValidationRule {
    type Error = FormError;

    fn try_from(spec: RuleSpec) -> Result<Self> {
        let builtin = match spec.rule_type.as_str() {
            "required" => Some(BuiltinRule::Required),
            "email" => Some(BuiltinRule::Email),
            "url" => Some(BuiltinRule::Url),
            "phone" => Some(BuiltinRule::Phone),
            "number" => Some(BuiltinRule::Number),
            "integer" => Some(BuiltinRule::Integer),
            "min" => Some(BuiltinRule::Min(number_param(&spec)?)),
            "max" => Some(BuiltinRule::Max(number_param(&spec)?)),
            "range" => {
                let (min, max) = bounds_param(&spec)
                    .and_then(|(min, max)| Some((min.as_f64()?, max.as_f64()?)))
                    .ok_or_else(|| invalid_rule(&spec, "[min, max]"))?;
                Some(BuiltinRule::Range { min, max })
            }
            "minLength" | "min_length" => Some(BuiltinRule::MinLength(length_param(&spec)?)),
            "maxLength" | "max_length" => Some(BuiltinRule::MaxLength(length_param(&spec)?)),
            "length" => {
                let (min, max) = bounds_param(&spec)
                    .and_then(|(min, max)| Some((min.as_u64()? as usize, max.as_u64()? as usize)))
                    .ok_or_else(|| invalid_rule(&spec, "[min, max] lengths"))?;
                Some(BuiltinRule::Length { min, max })
            }
            "pattern" => Some(BuiltinRule::Pattern(Regex::new(&string_param(&spec)?)?)),
            "oneOf" | "one_of" => match &spec.value {
                Value::Array(options) => Some(BuiltinRule::OneOf(options.clone())),
                _ => return Err(invalid_rule(&spec, "an array of options")),
            },
            "confirm" => Some(BuiltinRule::Confirm(string_param(&spec)?)),
            "compareWith" | "compare_with" => {
                let field = spec.value.get("field").and_then(Value::as_str);
                let op = spec
                    .value
                    .get("operator")
                    .cloned()
                    .and_then(|op| serde_json::from_value::<CompareOp>(op).ok());
                match (field, op) {
                    (Some(field), Some(op)) => Some(BuiltinRule::CompareWith {
                        field: field.to_string(),
                        op,
                    }),
                    _ => return Err(invalid_rule(&spec, "{\"field\", \"operator\"}")),
                }
            }
            "idCard" | "id_card" => Some(BuiltinRule::IdCard),
            "creditCard" | "credit_card" => Some(BuiltinRule::CreditCard),
            "ip" => Some(BuiltinRule::Ip),
            "postalCode" | "postal_code" => Some(BuiltinRule::PostalCode),
            "fileType" | "file_type" => {
                let types = serde_json::from_value::<Vec<String>>(spec.value.clone())
                    .map_err(|_| invalid_rule(&spec, "an array of extensions"))?;
                Some(BuiltinRule::FileType(types))
            }
            "passwordStrength" | "password_strength" => {
                let level = serde_json::from_value::<PasswordLevel>(spec.value.clone())
                    .map_err(|_| invalid_rule(&spec, "weak, medium or strong"))?;
                Some(BuiltinRule::PasswordStrength(level))
            }
            "" => return Err(FormError::InvalidRule("rule type is missing".to_string())),
            _ => None,
        };

        let kind = match builtin {
            Some(rule) => RuleKind::Builtin(rule),
            None => RuleKind::Named {
                type_name: spec.rule_type.clone(),
                params: spec.value.clone(),
            },
        };

        Ok(Self {
            kind,
            message: spec.message,
            trigger: spec.trigger,
            priority: spec.priority,
            level: spec.level,
            timeout: spec.timeout_ms.map(Duration::from_millis),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec(json: Value) -> RuleSpec {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_trigger_filter() {
        let any = ValidationRule::required();
        let blur = ValidationRule::required().on(Trigger::Blur);

        assert!(any.applies_to(Some(Trigger::Change)));
        assert!(blur.applies_to(Some(Trigger::Blur)));
        assert!(!blur.applies_to(Some(Trigger::Change)));
        assert!(blur.applies_to(None));
    }

    #[test]
    fn test_spec_to_builtin() {
        let rule = ValidationRule::try_from(spec(json!({
            "type": "minLength",
            "value": 3,
            "message": "too short",
            "trigger": "blur",
            "priority": 2
        })))
        .unwrap();

        assert!(matches!(rule.kind, RuleKind::Builtin(BuiltinRule::MinLength(3))));
        assert_eq!(rule.message.as_deref(), Some("too short"));
        assert_eq!(rule.trigger, Some(Trigger::Blur));
        assert_eq!(rule.priority, 2);
        assert_eq!(rule.type_name(), "minLength");
    }

    #[test]
    fn test_spec_range_and_compare() {
        let range = ValidationRule::try_from(spec(json!({"type": "range", "value": [1, 5]}))).unwrap();
        assert!(matches!(
            range.kind,
            RuleKind::Builtin(BuiltinRule::Range { min, max }) if min == 1.0 && max == 5.0
        ));

        let compare = ValidationRule::try_from(spec(json!({
            "type": "compareWith",
            "value": {"field": "start", "operator": "gte"}
        })))
        .unwrap();
        assert!(matches!(
            compare.kind,
            RuleKind::Builtin(BuiltinRule::CompareWith { op: CompareOp::Gte, .. })
        ));
    }

    #[test]
    fn test_unknown_type_becomes_named() {
        let rule = ValidationRule::try_from(spec(json!({
            "type": "uniqueUsername",
            "level": "warning"
        })))
        .unwrap();

        assert!(matches!(rule.kind, RuleKind::Named { ref type_name, .. } if type_name == "uniqueUsername"));
        assert_eq!(rule.level, RuleLevel::Warning);
    }

    #[test]
    fn test_bad_params_are_rejected() {
        for bad in [
            json!({"type": "min", "value": "x"}),
            json!({"type": "pattern", "value": "("}),
            json!({"type": "range", "value": [1]}),
            json!({"type": "passwordStrength", "value": "extreme"}),
            json!({"value": 1}),
        ] {
            assert!(ValidationRule::try_from(spec(bad.clone())).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_output_conversions() {
        assert_eq!(ValidatorOutput::from(true), ValidatorOutput::pass());
        assert_eq!(ValidatorOutput::from("nope"), ValidatorOutput::fail("nope"));
        assert!(!ValidatorOutput::from(false).valid);
    }
}

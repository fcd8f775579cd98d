//! Rule registry and execution

use super::builtins;
use super::cache::{CacheKey, CachedOutcome, ValidationCache, DEFAULT_CACHE_SIZE};
use super::rule::{RuleContext, RuleKind, RuleLevel, Trigger, ValidationRule, ValidatorFn, ValidatorOutput};
use super::traits::AsyncValidator;
use crate::data::path::{get_in, parse_path};
use crate::state::GENERIC_ERROR;
use crate::sync::lock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const TIMEOUT_MESSAGE: &str = "validation timed out";

/// What to do with a rule whose type has no registered validator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownValidatorPolicy {
    /// Fail the rule with an "unknown validator" message
    #[default]
    Reject,
    /// Log a warning and treat the rule as passing
    Pass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub enable_cache: bool,
    pub cache_size: usize,
    pub unknown_validator: UnknownValidatorPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_size: DEFAULT_CACHE_SIZE,
            unknown_validator: UnknownValidatorPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValidationResult {
    pub field: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Superseded by a newer run for the same field; must not be applied
    pub cancelled: bool,
}

impl FieldValidationResult {
    pub fn passed(field: &str) -> Self {
        Self {
            field: field.to_string(),
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            cancelled: false,
        }
    }

    fn cancelled(field: &str) -> Self {
        Self {
            cancelled: true,
            ..Self::passed(field)
        }
    }

    fn from_outcome(field: &str, outcome: CachedOutcome) -> Self {
        Self {
            field: field.to_string(),
            valid: outcome.valid,
            errors: outcome.errors,
            warnings: outcome.warnings,
            cancelled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormValidationResult {
    pub valid: bool,
    pub error_count: usize,
    pub fields: BTreeMap<String, FieldValidationResult>,
    /// Failing fields only
    pub errors: BTreeMap<String, Vec<String>>,
    pub warnings: BTreeMap<String, Vec<String>>,
}

impl Default for FormValidationResult {
    fn default() -> Self {
        Self {
            valid: true,
            error_count: 0,
            fields: BTreeMap::new(),
            errors: BTreeMap::new(),
            warnings: BTreeMap::new(),
        }
    }
}

impl FromIterator<FieldValidationResult> for FormValidationResult {
    fn from_iter<I: IntoIterator<Item = FieldValidationResult>>(results: I) -> Self {
        let mut aggregate = Self::default();
        for result in results {
            if !result.valid {
                aggregate.valid = false;
                aggregate.error_count += result.errors.len();
                aggregate
                    .errors
                    .insert(result.field.clone(), result.errors.clone());
            }
            if !result.warnings.is_empty() {
                aggregate
                    .warnings
                    .insert(result.field.clone(), result.warnings.clone());
            }
            aggregate.fields.insert(result.field.clone(), result);
        }
        aggregate
    }
}

/// Per-field cancellation flag for in-flight runs
#[derive(Default)]
struct CancelToken {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Default)]
struct EngineInner {
    rules: BTreeMap<String, Vec<ValidationRule>>,
    validators: HashMap<String, ValidatorFn>,
    in_flight: HashMap<String, Arc<CancelToken>>,
    destroyed: bool,
}

/// Runs validation rules per field with trigger filtering, result caching
/// and per-field cancellation.
///
/// Rules run in ascending `priority` order and stop at the first failing
/// error-level rule. Validator failures and errors never escape as `Err`;
/// they become failing results.
pub struct ValidationEngine {
    inner: Mutex<EngineInner>,
    cache: Option<Mutex<ValidationCache>>,
    config: EngineConfig,
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("ValidationEngine")
            .field("fields", &inner.rules.len())
            .field("validators", &inner.validators.len())
            .field("config", &self.config)
            .finish()
    }
}

fn value_at<'a>(values: &'a Value, path: &str) -> Option<&'a Value> {
    parse_path(path).ok().and_then(|segments| get_in(values, &segments))
}

fn call(validator: &ValidatorFn, value: &Value, ctx: &RuleContext<'_>) -> anyhow::Result<ValidatorOutput> {
    validator(value, ctx)
}

impl ValidationEngine {
    pub fn new(config: EngineConfig) -> Self {
        let cache = config
            .enable_cache
            .then(|| Mutex::new(ValidationCache::new(config.cache_size)));
        Self {
            inner: Mutex::new(EngineInner::default()),
            cache,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn add_rules(&self, field: &str, rules: Vec<ValidationRule>) {
        lock(&self.inner)
            .rules
            .entry(field.to_string())
            .or_default()
            .extend(rules);
        self.clear_field_cache(field);
    }

    pub fn set_rules(&self, field: &str, rules: Vec<ValidationRule>) {
        lock(&self.inner).rules.insert(field.to_string(), rules);
        self.clear_field_cache(field);
    }

    pub fn rules(&self, field: &str) -> Vec<ValidationRule> {
        lock(&self.inner).rules.get(field).cloned().unwrap_or_default()
    }

    pub fn has_rules(&self, field: &str) -> bool {
        lock(&self.inner)
            .rules
            .get(field)
            .is_some_and(|rules| !rules.is_empty())
    }

    pub fn remove_rules(&self, field: &str) -> bool {
        let removed = lock(&self.inner).rules.remove(field).is_some();
        self.clear_field_cache(field);
        removed
    }

    /// Fields that have rules, in name order
    pub fn fields(&self) -> Vec<String> {
        lock(&self.inner).rules.keys().cloned().collect()
    }

    /// Register a validator for `type_name`. It overrides a builtin of the
    /// same name and resolves `Named` rules.
    pub fn register_validator<F>(&self, type_name: &str, validator: F)
    where
        F: Fn(&Value, &RuleContext<'_>) -> anyhow::Result<ValidatorOutput> + Send + Sync + 'static,
    {
        lock(&self.inner)
            .validators
            .insert(type_name.to_string(), Arc::new(validator));
        self.clear_cache();
    }

    /// Remove a registered validator; builtins of the same name apply again
    pub fn unregister_validator(&self, type_name: &str) -> bool {
        let removed = lock(&self.inner).validators.remove(type_name).is_some();
        if removed {
            self.clear_cache();
        }
        removed
    }

    fn registered(&self, type_name: &str) -> Option<ValidatorFn> {
        lock(&self.inner).validators.get(type_name).cloned()
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            lock(cache).clear();
        }
    }

    fn clear_field_cache(&self, field: &str) {
        if let Some(cache) = &self.cache {
            lock(cache).clear_field(field);
        }
    }

    /// Cancel the in-flight run for `field`, if any
    pub fn cancel(&self, field: &str) {
        if let Some(token) = lock(&self.inner).in_flight.remove(field) {
            token.cancel();
        }
    }

    fn cache_key(
        &self,
        field: &str,
        value: &Value,
        values: &Value,
        trigger: Option<Trigger>,
        rules: &[ValidationRule],
    ) -> CacheKey {
        let mut types: Vec<&str> = rules.iter().map(ValidationRule::type_name).collect();
        types.sort_unstable();

        let mut fingerprint = format!(
            "{}|{}|{}",
            trigger.map_or("*", Trigger::as_str),
            types.join(","),
            value
        );
        for rule in rules {
            if let RuleKind::Builtin(builtin) = &rule.kind {
                if let Some(other) = builtin.referenced_field() {
                    let other_value = value_at(values, other).cloned().unwrap_or(Value::Null);
                    fingerprint.push_str(&format!("|{other}={other_value}"));
                }
            }
        }

        CacheKey {
            field: field.to_string(),
            fingerprint,
        }
    }

    /// Register a fresh token for `field`, cancelling the previous one
    fn begin(&self, field: &str) -> Arc<CancelToken> {
        let token = Arc::new(CancelToken::default());
        let previous = lock(&self.inner)
            .in_flight
            .insert(field.to_string(), Arc::clone(&token));
        if let Some(previous) = previous {
            tracing::debug!("superseding in-flight validation of `{field}`");
            previous.cancel();
        }
        token
    }

    fn finish(&self, field: &str, token: &Arc<CancelToken>) {
        let mut inner = lock(&self.inner);
        if inner
            .in_flight
            .get(field)
            .is_some_and(|current| Arc::ptr_eq(current, token))
        {
            inner.in_flight.remove(field);
        }
    }

    /// Validate one field. `trigger` selects rules declared for it (plus
    /// rules without a trigger); `None` runs every rule.
    pub async fn validate_field(
        &self,
        field: &str,
        value: &Value,
        values: &Value,
        trigger: Option<Trigger>,
    ) -> FieldValidationResult {
        let mut rules: Vec<ValidationRule> = {
            let inner = lock(&self.inner);
            if inner.destroyed {
                return FieldValidationResult::passed(field);
            }
            inner
                .rules
                .get(field)
                .map(|rules| {
                    rules
                        .iter()
                        .filter(|rule| rule.applies_to(trigger))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        if rules.is_empty() {
            return FieldValidationResult::passed(field);
        }
        // stable: equal priorities keep declared order
        rules.sort_by_key(|rule| rule.priority);

        let key = self.cache_key(field, value, values, trigger, &rules);
        // a newer run supersedes older ones even when it is answered from cache
        let token = self.begin(field);
        let hit = self.cache.as_ref().and_then(|cache| lock(cache).get(&key));
        if let Some(hit) = hit {
            tracing::debug!("validation cache hit for `{field}`");
            self.finish(field, &token);
            return FieldValidationResult::from_outcome(field, hit);
        }

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            outcome = self.run_rules(field, value, values, &rules) => Some(outcome),
        };
        self.finish(field, &token);

        match outcome {
            Some(outcome) if !token.is_cancelled() => {
                if let Some(cache) = &self.cache {
                    lock(cache).put(key, outcome.clone());
                }
                FieldValidationResult::from_outcome(field, outcome)
            }
            _ => {
                tracing::debug!("validation of `{field}` was cancelled");
                FieldValidationResult::cancelled(field)
            }
        }
    }

    async fn run_rules(
        &self,
        field: &str,
        value: &Value,
        values: &Value,
        rules: &[ValidationRule],
    ) -> CachedOutcome {
        let mut warnings = Vec::new();
        for rule in rules {
            let output = self.execute_rule(rule, field, value, values).await;
            if output.valid {
                continue;
            }
            let message = output
                .message
                .unwrap_or_else(|| GENERIC_ERROR.to_string());
            match rule.level {
                RuleLevel::Warning => warnings.push(message),
                RuleLevel::Error => {
                    return CachedOutcome {
                        valid: false,
                        errors: vec![message],
                        warnings,
                    }
                }
            }
        }
        CachedOutcome {
            valid: true,
            errors: Vec::new(),
            warnings,
        }
    }

    async fn execute_rule(
        &self,
        rule: &ValidationRule,
        field: &str,
        value: &Value,
        values: &Value,
    ) -> ValidatorOutput {
        let outcome = match &rule.kind {
            RuleKind::Custom(validator) => {
                let ctx = RuleContext {
                    field,
                    values,
                    params: &Value::Null,
                };
                call(validator, value, &ctx)
            }
            RuleKind::Async(validator) => {
                run_async(validator.as_ref(), rule.timeout, field, value, values).await
            }
            RuleKind::Builtin(builtin) => match self.registered(builtin.type_name()) {
                Some(validator) => {
                    let params = builtin.params();
                    let ctx = RuleContext {
                        field,
                        values,
                        params: &params,
                    };
                    call(&validator, value, &ctx)
                }
                None => Ok(builtins::run(builtin, value, values, rule.message.as_deref())),
            },
            RuleKind::Named { type_name, params } => match self.registered(type_name) {
                Some(validator) => {
                    let ctx = RuleContext {
                        field,
                        values,
                        params,
                    };
                    call(&validator, value, &ctx)
                }
                None => match self.config.unknown_validator {
                    UnknownValidatorPolicy::Reject => {
                        Ok(ValidatorOutput::fail(format!("unknown validator: {type_name}")))
                    }
                    UnknownValidatorPolicy::Pass => {
                        tracing::warn!("validator `{type_name}` not found; treating as passing");
                        Ok(ValidatorOutput::pass())
                    }
                },
            },
        };

        match outcome {
            Ok(output) if output.valid => output,
            Ok(output) => ValidatorOutput {
                valid: false,
                message: output.message.or_else(|| rule.message.clone()),
            },
            Err(err) => {
                tracing::error!(
                    "error in `{}` validator for field `{field}`: {err:#}",
                    rule.type_name()
                );
                ValidatorOutput::fail(format!("validation error: {err}"))
            }
        }
    }

    /// Validate `fields` one after another, reading each value from `values`
    pub async fn validate_fields<S: AsRef<str>>(
        &self,
        fields: &[S],
        values: &Value,
        trigger: Option<Trigger>,
    ) -> FormValidationResult {
        let mut results = Vec::with_capacity(fields.len());
        for field in fields {
            let field = field.as_ref();
            let value = value_at(values, field).cloned().unwrap_or(Value::Null);
            results.push(self.validate_field(field, &value, values, trigger).await);
        }
        results.into_iter().collect()
    }

    /// Validate every field that has rules
    pub async fn validate_all(&self, values: &Value, trigger: Option<Trigger>) -> FormValidationResult {
        let fields = self.fields();
        self.validate_fields(&fields, values, trigger).await
    }

    /// Drop rules and validators and cancel in-flight runs
    pub fn destroy(&self) {
        let tokens: Vec<Arc<CancelToken>> = {
            let mut inner = lock(&self.inner);
            inner.rules.clear();
            inner.validators.clear();
            inner.destroyed = true;
            inner.in_flight.drain().map(|(_, token)| token).collect()
        };
        for token in tokens {
            token.cancel();
        }
        self.clear_cache();
    }
}

async fn run_async(
    validator: &dyn AsyncValidator,
    timeout: Option<Duration>,
    field: &str,
    value: &Value,
    values: &Value,
) -> anyhow::Result<ValidatorOutput> {
    let validation = validator.validate(field, value, values);
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, validation).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!("validation of `{field}` exceeded {limit:?}");
                Ok(ValidatorOutput::fail(TIMEOUT_MESSAGE))
            }
        },
        None => validation.await,
    }
}

//! Validation rules and the engine that runs them

pub mod builtins;
mod cache;
mod engine;
mod rule;
mod traits;

pub use cache::{CacheKey, CachedOutcome, ValidationCache, DEFAULT_CACHE_SIZE};
pub use engine::{
    EngineConfig, FieldValidationResult, FormValidationResult, UnknownValidatorPolicy,
    ValidationEngine, TIMEOUT_MESSAGE,
};
pub use rule::{
    BuiltinRule, CompareOp, PasswordLevel, RuleContext, RuleKind, RuleLevel, RuleSpec, Trigger,
    ValidationRule, ValidatorFn, ValidatorOutput,
};
pub use traits::{AsyncValidator, FnValidator};

#[cfg(test)]
pub use traits::MockAsyncValidator;

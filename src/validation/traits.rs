//! Trait abstraction for asynchronous validators to enable mocking in tests

use super::rule::ValidatorOutput;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;

/// A validator that needs to await something, such as a uniqueness check
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AsyncValidator: Send + Sync {
    /// Validate `value` of `field`; `values` holds the whole form
    async fn validate(
        &self,
        field: &str,
        value: &Value,
        values: &Value,
    ) -> anyhow::Result<ValidatorOutput>;
}

/// Adapts an async closure taking owned arguments into an [`AsyncValidator`]
pub struct FnValidator<F, Fut> {
    validate: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnValidator<F, Fut>
where
    F: Fn(String, Value, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ValidatorOutput>> + Send,
{
    pub fn new(validate: F) -> Self {
        Self {
            validate,
            _future: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> AsyncValidator for FnValidator<F, Fut>
where
    F: Fn(String, Value, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ValidatorOutput>> + Send,
{
    async fn validate(
        &self,
        field: &str,
        value: &Value,
        values: &Value,
    ) -> anyhow::Result<ValidatorOutput> {
        (self.validate)(field.to_string(), value.clone(), values.clone()).await
    }
}

//! Retry decorator for transient translation failures.

use crate::{TranslationRequest, Translator};
use async_trait::async_trait;
use crosstalk_foundation::{ProviderError, RetryPolicy};
use std::time::{Duration, Instant};

/// Wraps a translator with the standard retry budget: transient errors are
/// retried with backoff while the budget lasts, permanent errors pass
/// through untouched.
pub struct RetryingTranslator<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Translator> RetryingTranslator<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T: Translator> Translator for RetryingTranslator<T> {
    async fn translate(
        &self,
        request: &TranslationRequest,
        deadline: Duration,
    ) -> Result<String, ProviderError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.inner.translate(request, deadline).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() => {
                    let Some(delay) = self.policy.delay_for(attempt) else {
                        return Err(err);
                    };
                    if !self.policy.within_budget(started.elapsed() + delay) {
                        return Err(err);
                    }
                    tracing::debug!(
                        target: "translate",
                        attempt,
                        "transient translation failure, retrying in {delay:?}: {err}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

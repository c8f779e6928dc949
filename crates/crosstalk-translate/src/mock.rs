//! Programmable translator for tests.

use crate::{TranslationRequest, Translator};
use async_trait::async_trait;
use crosstalk_foundation::ProviderError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

enum Mode {
    /// Always answer with this text.
    Fixed(String),
    /// Answer with "{target-tag}:{input}", handy for asserting routing.
    Prefixing,
}

pub struct MockTranslator {
    mode: Mode,
    latency: Mutex<Duration>,
    queued_failures: Mutex<VecDeque<ProviderError>>,
    calls: AtomicU64,
}

impl MockTranslator {
    pub fn new(fixed: impl Into<String>) -> Self {
        Self {
            mode: Mode::Fixed(fixed.into()),
            latency: Mutex::new(Duration::ZERO),
            queued_failures: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
        }
    }

    pub fn prefixing() -> Self {
        Self {
            mode: Mode::Prefixing,
            latency: Mutex::new(Duration::ZERO),
            queued_failures: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Every call sleeps this long before answering; combined with a paused
    /// tokio clock this drives deadline scenarios precisely.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Queue `count` copies of `error` to be returned before any success.
    pub fn fail_next(&self, count: usize, error: ProviderError) {
        let mut queue = self.queued_failures.lock();
        for _ in 0..count {
            queue.push_back(error.clone());
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        request: &TranslationRequest,
        deadline: Duration,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            if latency > deadline {
                tokio::time::sleep(deadline).await;
                return Err(ProviderError::Timeout(deadline));
            }
            tokio::time::sleep(latency).await;
        }

        if let Some(err) = self.queued_failures.lock().pop_front() {
            return Err(err);
        }

        Ok(match &self.mode {
            Mode::Fixed(text) => text.clone(),
            Mode::Prefixing => format!("{}:{}", request.target.as_str(), request.text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TranslationPreferences;
    use crosstalk_foundation::Language;

    fn request(text: &str) -> TranslationRequest {
        TranslationRequest {
            text: text.into(),
            source: Language::Spanish,
            target: Language::English,
            preferences: TranslationPreferences::default(),
        }
    }

    #[tokio::test]
    async fn prefixing_mode_exposes_target_language() {
        let translator = MockTranslator::prefixing();
        let out = translator
            .translate(&request("hola"), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(out, "en:hola");
    }

    #[tokio::test(start_paused = true)]
    async fn latency_beyond_deadline_times_out() {
        let translator = MockTranslator::new("hi");
        translator.set_latency(Duration::from_millis(650));
        let result = translator
            .translate(&request("hola"), Duration::from_millis(500))
            .await;
        assert!(matches!(result, Err(ProviderError::Timeout(_))));
    }
}

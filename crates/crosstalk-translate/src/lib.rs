//! Text translation between room languages.
//!
//! The translator is deliberately dumb plumbing: one request, one translated
//! string, a deadline, and a closed error set. Streaming partial translations
//! buys nothing at utterance granularity, so the contract stays unary.

pub mod mock;
pub mod openai;
pub mod retry;

pub use mock::MockTranslator;
pub use openai::{LlmTranslator, LlmTranslatorConfig};
pub use retry::RetryingTranslator;

use async_trait::async_trait;
use crosstalk_foundation::{Language, ProviderError};
use std::time::Duration;

/// Per-request translation preferences, snapshotted from the listener's
/// profile at pipeline construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranslationPreferences {
    pub formal_tone: bool,
    pub preserve_emotion: bool,
}

#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub text: String,
    pub source: Language,
    pub target: Language,
    pub preferences: TranslationPreferences,
}

/// Translation backends.
///
/// Implementations must return no later than shortly after `deadline` and
/// must release provider resources promptly when the returned future is
/// dropped; the buffer cancels in-flight interim translations by dropping.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        request: &TranslationRequest,
        deadline: Duration,
    ) -> Result<String, ProviderError>;
}

//! LLM-backed translator over the chat-completions API.

use crate::{TranslationRequest, Translator};
use async_trait::async_trait;
use crosstalk_foundation::ProviderError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct LlmTranslatorConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
}

impl LlmTranslatorConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.into(),
            model: DEFAULT_MODEL.into(),
        }
    }
}

pub struct LlmTranslator {
    config: LlmTranslatorConfig,
    client: reqwest::Client,
}

impl LlmTranslator {
    pub fn new(config: LlmTranslatorConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Build the system prompt for a request. Spoken output feeds straight
    /// into TTS, so the instructions insist on a bare translation with no
    /// commentary and a length close to the original.
    fn system_prompt(request: &TranslationRequest) -> String {
        let tone = if request.preferences.formal_tone {
            "formal and professional"
        } else {
            "natural and conversational"
        };
        let emotion = if request.preferences.preserve_emotion {
            "preserve the emotional tone and intensity"
        } else {
            "maintain clarity"
        };
        format!(
            "You are an expert real-time translator. Translate the following text \
             from {source} to {target}.\n\
             Guidelines:\n\
             - Keep the translation {tone}\n\
             - {emotion}\n\
             - Maintain cultural context appropriateness\n\
             - Preserve speaker intent and meaning\n\
             - Keep response length similar to the original\n\
             - For informal speech, use appropriate colloquialisms in the target language\n\
             Respond ONLY with the translated text, no explanations.",
            source = request.source.display_name(),
            target = request.target.display_name(),
        )
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(
        &self,
        request: &TranslationRequest,
        deadline: Duration,
    ) -> Result<String, ProviderError> {
        if request.source == request.target {
            return Ok(request.text.clone());
        }
        if request.text.trim().is_empty() {
            return Err(ProviderError::InvalidInput("empty text".into()));
        }

        let system = Self::system_prompt(request);
        let body = ChatRequest {
            model: &self.config.model,
            temperature: TEMPERATURE,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.text,
                },
            ],
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .timeout(deadline)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(deadline)
                } else {
                    ProviderError::Unavailable(e.to_string())
                }
            })?;

        match response.status().as_u16() {
            200 => {}
            401 | 403 => {
                return Err(ProviderError::AuthFailure(
                    "translation provider rejected credentials".into(),
                ))
            }
            429 => return Err(ProviderError::RateLimited("chat completions 429".into())),
            status if status >= 500 => {
                return Err(ProviderError::Unavailable(format!(
                    "chat completions returned {status}"
                )))
            }
            status => {
                return Err(ProviderError::InvalidInput(format!(
                    "chat completions returned {status}"
                )))
            }
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("bad response body: {e}")))?;

        let translated = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        let translated = translated.trim();
        if translated.is_empty() {
            return Err(ProviderError::Unavailable("empty translation".into()));
        }

        tracing::debug!(
            target: "translate",
            source = %request.source,
            target_lang = %request.target,
            "translated {} -> {} chars",
            request.text.len(),
            translated.len()
        );
        Ok(translated.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TranslationPreferences;
    use crosstalk_foundation::Language;

    fn request(formal: bool, preserve: bool) -> TranslationRequest {
        TranslationRequest {
            text: "Hola amigo".into(),
            source: Language::Spanish,
            target: Language::English,
            preferences: TranslationPreferences {
                formal_tone: formal,
                preserve_emotion: preserve,
            },
        }
    }

    #[test]
    fn prompt_reflects_preferences() {
        let formal = LlmTranslator::system_prompt(&request(true, false));
        assert!(formal.contains("formal and professional"));
        assert!(formal.contains("maintain clarity"));

        let casual = LlmTranslator::system_prompt(&request(false, true));
        assert!(casual.contains("natural and conversational"));
        assert!(casual.contains("preserve the emotional tone"));
        assert!(casual.contains("from Spanish to English"));
    }

    #[tokio::test]
    async fn same_language_short_circuits_without_network() {
        let translator = LlmTranslator::new(LlmTranslatorConfig::new("unused"));
        let mut req = request(false, true);
        req.target = Language::Spanish;
        let out = translator
            .translate(&req, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(out, "Hola amigo");
    }

    #[tokio::test]
    async fn empty_text_is_invalid() {
        let translator = LlmTranslator::new(LlmTranslatorConfig::new("unused"));
        let mut req = request(false, true);
        req.text = "   ".into();
        assert!(matches!(
            translator.translate(&req, Duration::from_millis(1)).await,
            Err(ProviderError::InvalidInput(_))
        ));
    }
}

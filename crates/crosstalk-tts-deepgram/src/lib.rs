//! Deepgram Aura speech synthesis.
//!
//! One POST per request; the response body is linear16 PCM streamed
//! chunk-by-chunk into the pipeline's audio sink, so playback starts as soon
//! as the provider emits the first bytes.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use crosstalk_foundation::{AudioFrame, ProviderError};
use crosstalk_tts::{
    next_synthesis_id, SynthesisEvent, SynthesisHandle, TtsEngine, VoiceAvatar,
};
use futures_util::StreamExt;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};
use url::Url;

const DEFAULT_ENDPOINT: &str = "https://api.deepgram.com/v1/speak";
const SAMPLE_RATE_HZ: u32 = 16_000;
/// Emit in 20 ms frames: 320 samples, 640 bytes of linear16.
const FRAME_BYTES: usize = 640;

#[derive(Debug, Clone)]
pub struct DeepgramTtsConfig {
    pub api_key: String,
    pub endpoint: String,
}

impl DeepgramTtsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.into(),
        }
    }
}

pub struct DeepgramTtsEngine {
    config: DeepgramTtsConfig,
    client: reqwest::Client,
}

impl DeepgramTtsEngine {
    pub fn new(config: DeepgramTtsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn speak_url(&self, voice_id: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.config.endpoint)
            .map_err(|e| ProviderError::InvalidInput(format!("bad endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("model", voice_id)
            .append_pair("encoding", "linear16")
            .append_pair("sample_rate", &SAMPLE_RATE_HZ.to_string())
            .append_pair("container", "none");
        Ok(url)
    }
}

#[async_trait]
impl TtsEngine for DeepgramTtsEngine {
    fn name(&self) -> &str {
        "deepgram-aura"
    }

    async fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceAvatar,
        sink: crosstalk_tts::engine::AudioSink,
    ) -> Result<SynthesisHandle, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::InvalidInput("empty text".into()));
        }
        if self.config.api_key.is_empty() {
            return Err(ProviderError::AuthFailure("missing Deepgram API key".into()));
        }

        let url = self.speak_url(&voice.voice_id)?;
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Token {}", self.config.api_key))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        match response.status().as_u16() {
            200 => {}
            401 | 403 => {
                return Err(ProviderError::AuthFailure(
                    "deepgram rejected credentials".into(),
                ))
            }
            404 => {
                return Err(ProviderError::VoiceUnavailable {
                    voice_id: voice.voice_id.clone(),
                })
            }
            429 => return Err(ProviderError::RateLimited("speak 429".into())),
            status if status >= 500 => {
                return Err(ProviderError::Unavailable(format!("speak returned {status}")))
            }
            status => {
                return Err(ProviderError::InvalidInput(format!(
                    "speak returned {status}"
                )))
            }
        }

        let synthesis_id = next_synthesis_id();
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = oneshot::channel();
        let voice_id = voice.voice_id.clone();

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut pending = BytesMut::new();
            let mut timestamp_ms: u64 = 0;

            loop {
                let chunk: Option<Result<Bytes, reqwest::Error>> = tokio::select! {
                    chunk = body.next() => chunk,
                    _ = cancel_rx.changed() => {
                        debug!(target: "tts", synthesis_id, "synthesis cancelled mid-stream");
                        let _ = done_tx.send(SynthesisEvent::Cancelled { synthesis_id });
                        return;
                    }
                };

                match chunk {
                    Some(Ok(bytes)) => {
                        pending.extend_from_slice(&bytes);
                        while pending.len() >= FRAME_BYTES {
                            if *cancel_rx.borrow() {
                                let _ = done_tx.send(SynthesisEvent::Cancelled { synthesis_id });
                                return;
                            }
                            let frame_bytes = pending.split_to(FRAME_BYTES);
                            let frame = le_bytes_to_frame(&frame_bytes, timestamp_ms);
                            timestamp_ms += 20;
                            if sink.send(frame).await.is_err() {
                                let _ = done_tx.send(SynthesisEvent::Cancelled { synthesis_id });
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!(target: "tts", synthesis_id, voice_id = %voice_id, "speak stream error: {e}");
                        let _ = done_tx.send(SynthesisEvent::Failed {
                            synthesis_id,
                            error: ProviderError::Unavailable(e.to_string()),
                        });
                        return;
                    }
                    None => break,
                }
            }

            // Flush the sub-frame tail.
            if !pending.is_empty() && !*cancel_rx.borrow() {
                let frame = le_bytes_to_frame(&pending, timestamp_ms);
                let _ = sink.send(frame).await;
            }
            let _ = done_tx.send(SynthesisEvent::Completed { synthesis_id });
        });

        Ok(SynthesisHandle::new(synthesis_id, cancel_tx, done_rx))
    }
}

fn le_bytes_to_frame(bytes: &[u8], timestamp_ms: u64) -> AudioFrame {
    let mut data = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        data.push(i16::from_le_bytes([pair[0], pair[1]]));
    }
    AudioFrame {
        data,
        sample_rate_hz: SAMPLE_RATE_HZ,
        channels: 1,
        timestamp_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speak_url_selects_voice_model() {
        let engine = DeepgramTtsEngine::new(DeepgramTtsConfig::new("key"));
        let url = engine.speak_url("aura-2-celeste-es").unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("model=aura-2-celeste-es"));
        assert!(query.contains("encoding=linear16"));
        assert!(query.contains("sample_rate=16000"));
        assert!(query.contains("container=none"));
    }

    #[test]
    fn le_bytes_decode_into_samples() {
        let frame = le_bytes_to_frame(&[0x02, 0x01, 0xFE, 0xFF], 40);
        assert_eq!(frame.data, vec![0x0102, -2]);
        assert_eq!(frame.timestamp_ms, 40);
    }
}

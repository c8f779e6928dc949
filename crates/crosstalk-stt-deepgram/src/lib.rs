//! Deepgram live-transcription plugin.
//!
//! Speaks the `/v1/listen` WebSocket protocol: binary PCM frames out, JSON
//! result messages in. Interim results, disabled formatting and a tight
//! utterance-end window come straight from the stream configuration.

mod protocol;

pub use protocol::{ListenMessage, ResultAlternative};

use async_trait::async_trait;
use crosstalk_foundation::{AudioFrame, Language, ProviderError};
use crosstalk_stt::{
    PluginCapabilities, PluginInfo, SttPlugin, SttStream, SttStreamConfig, TranscriptEvent,
};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_ENDPOINT: &str = "wss://api.deepgram.com/v1/listen";
const DEFAULT_MODEL: &str = "nova-2";
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
const FRAME_QUEUE_CAPACITY: usize = 64;
const EVENT_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct DeepgramSttConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
}

impl DeepgramSttConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.into(),
            model: DEFAULT_MODEL.into(),
        }
    }
}

pub struct DeepgramSttPlugin {
    config: DeepgramSttConfig,
}

impl DeepgramSttPlugin {
    pub fn new(config: DeepgramSttConfig) -> Self {
        Self { config }
    }

    /// Build the listen URL for a stream configuration.
    fn listen_url(&self, config: &SttStreamConfig) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.config.endpoint)
            .map_err(|e| ProviderError::InvalidInput(format!("bad endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("model", &self.config.model)
            .append_pair("language", config.language.locale())
            .append_pair("encoding", "linear16")
            .append_pair("sample_rate", &config.sample_rate_hz.to_string())
            .append_pair("channels", "1")
            .append_pair("interim_results", bool_str(config.interim_results))
            .append_pair("punctuate", bool_str(config.punctuate))
            .append_pair("smart_format", bool_str(config.smart_format))
            .append_pair("profanity_filter", bool_str(config.profanity_filter))
            .append_pair("utterance_end_ms", &config.utterance_end_ms.to_string())
            .append_pair("vad_events", "true");
        Ok(url)
    }
}

fn bool_str(v: bool) -> &'static str {
    if v {
        "true"
    } else {
        "false"
    }
}

#[async_trait]
impl SttPlugin for DeepgramSttPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: "deepgram".into(),
            name: "Deepgram live transcription".into(),
            requires_network: true,
            supported_languages: Language::ALL.to_vec(),
        }
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities {
            streaming: true,
            interim_results: true,
            utterance_end: true,
        }
    }

    async fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    async fn open_stream(&self, config: SttStreamConfig) -> Result<SttStream, ProviderError> {
        config.validate()?;
        if self.config.api_key.is_empty() {
            return Err(ProviderError::AuthFailure("missing Deepgram API key".into()));
        }

        let url = self.listen_url(&config)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ProviderError::InvalidInput(format!("bad ws request: {e}")))?;
        let auth = format!("Token {}", self.config.api_key)
            .parse()
            .map_err(|_| ProviderError::AuthFailure("api key not header-safe".into()))?;
        request.headers_mut().insert("Authorization", auth);

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(map_connect_error)?;
        debug!(target: "stt", language = %config.language, "deepgram listen socket open");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (frames_tx, mut frames_rx) = mpsc::channel::<AudioFrame>(FRAME_QUEUE_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<TranscriptEvent>(EVENT_QUEUE_CAPACITY);

        let driver = tokio::spawn(async move {
            let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
            keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Segment ids are synthesized: Deepgram scopes results to the
            // current utterance, so the counter advances on utterance end.
            let mut segment_id: u64 = 0;
            let mut input_closed = false;

            loop {
                tokio::select! {
                    maybe_frame = frames_rx.recv(), if !input_closed => {
                        match maybe_frame {
                            Some(frame) => {
                                let bytes = pcm_to_le_bytes(&frame.data);
                                if let Err(e) = ws_tx.send(WsMessage::Binary(bytes)).await {
                                    warn!(target: "stt", "deepgram send failed: {e}");
                                    break;
                                }
                            }
                            None => {
                                // Input closed: ask the server to flush
                                // finals, then keep reading until it closes.
                                input_closed = true;
                                let _ = ws_tx
                                    .send(WsMessage::Text(r#"{"type":"CloseStream"}"#.into()))
                                    .await;
                            }
                        }
                    }
                    _ = keepalive.tick() => {
                        if ws_tx
                            .send(WsMessage::Text(r#"{"type":"KeepAlive"}"#.into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    maybe_msg = ws_rx.next() => {
                        let Some(msg) = maybe_msg else { break };
                        let text = match msg {
                            Ok(WsMessage::Text(text)) => text,
                            Ok(WsMessage::Close(_)) => break,
                            Ok(_) => continue,
                            Err(e) => {
                                warn!(target: "stt", "deepgram socket error: {e}");
                                let _ = events_tx
                                    .send(TranscriptEvent::Error {
                                        code: "socket".into(),
                                        message: e.to_string(),
                                    })
                                    .await;
                                break;
                            }
                        };

                        for event in protocol::parse_message(&text, &mut segment_id) {
                            if events_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            debug!(target: "stt", "deepgram listen socket closed");
        });

        Ok(SttStream::new(frames_tx, events_rx, driver))
    }
}

fn pcm_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

fn map_connect_error(err: tokio_tungstenite::tungstenite::Error) -> ProviderError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match &err {
        WsError::Http(response) => match response.status().as_u16() {
            401 | 403 => ProviderError::AuthFailure(format!("deepgram rejected key: {err}")),
            429 => ProviderError::RateLimited(err.to_string()),
            _ => ProviderError::Unavailable(err.to_string()),
        },
        _ => ProviderError::Unavailable(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_url_carries_low_latency_flags() {
        let plugin = DeepgramSttPlugin::new(DeepgramSttConfig::new("key"));
        let config = SttStreamConfig::low_latency(Language::Spanish);
        let url = plugin.listen_url(&config).unwrap();
        let query = url.query().unwrap();

        assert!(query.contains("model=nova-2"));
        assert!(query.contains("language=es-US"));
        assert!(query.contains("encoding=linear16"));
        assert!(query.contains("interim_results=true"));
        assert!(query.contains("punctuate=false"));
        assert!(query.contains("smart_format=false"));
        assert!(query.contains("profanity_filter=false"));
        assert!(query.contains("utterance_end_ms=500"));
    }

    #[test]
    fn pcm_bytes_are_little_endian() {
        assert_eq!(pcm_to_le_bytes(&[0x0102, -2]), vec![0x02, 0x01, 0xFE, 0xFF]);
    }

    #[tokio::test]
    async fn missing_key_fails_fast() {
        let plugin = DeepgramSttPlugin::new(DeepgramSttConfig::new(""));
        let result = plugin
            .open_stream(SttStreamConfig::low_latency(Language::English))
            .await;
        assert!(matches!(result, Err(ProviderError::AuthFailure(_))));
    }
}

//! VAD gate adapting batch transcription backends to the streaming contract.
//!
//! Speech frames are buffered between detected utterance boundaries; on
//! utterance end the buffered audio goes to the backend in one request and
//! the result is emitted as a `Final` followed by `UtteranceEnd`. Interim
//! events are inherently unavailable from batch backends, which is why this
//! path is the fallback, not the default.

use crate::plugin::{BatchSttBackend, PluginCapabilities, PluginInfo, SttPlugin};
use crate::stream::SttStream;
use crate::types::{SttStreamConfig, TranscriptEvent};
use async_trait::async_trait;
use crosstalk_foundation::{AudioFrame, ProviderError};
use crosstalk_vad::{EnergyVad, VadConfig, VadEngine, VadEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const FRAME_QUEUE_CAPACITY: usize = 64;
const EVENT_QUEUE_CAPACITY: usize = 16;
/// Hard cap on buffered utterance audio: 30 s at 16 kHz.
const MAX_UTTERANCE_SAMPLES: usize = 16_000 * 30;

pub struct VadGatedStt<B: BatchSttBackend + 'static> {
    backend: Arc<B>,
    vad_config: VadConfig,
}

impl<B: BatchSttBackend + 'static> VadGatedStt<B> {
    pub fn new(backend: B, vad_config: VadConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            vad_config,
        }
    }
}

#[async_trait]
impl<B: BatchSttBackend + 'static> SttPlugin for VadGatedStt<B> {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: format!("vad-gated-{}", self.backend.id()),
            name: format!("VAD-gated {}", self.backend.id()),
            requires_network: true,
            supported_languages: Vec::new(),
        }
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities {
            streaming: true,
            interim_results: false,
            utterance_end: true,
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn open_stream(&self, config: SttStreamConfig) -> Result<SttStream, ProviderError> {
        config.validate()?;

        let (frames_tx, mut frames_rx) = mpsc::channel::<AudioFrame>(FRAME_QUEUE_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<TranscriptEvent>(EVENT_QUEUE_CAPACITY);

        let backend = Arc::clone(&self.backend);
        let mut vad = EnergyVad::new(self.vad_config.clone());
        let language = config.language;

        let driver = tokio::spawn(async move {
            let frame_size = vad.required_frame_size_samples();
            let mut pending: Vec<i16> = Vec::new();
            let mut utterance: Vec<i16> = Vec::new();
            let mut in_speech = false;
            let mut segment_id: u64 = 0;
            let mut utterance_start_ms: u64 = 0;

            while let Some(frame) = frames_rx.recv().await {
                pending.extend_from_slice(&frame.data);

                while pending.len() >= frame_size {
                    let chunk: Vec<i16> = pending.drain(..frame_size).collect();

                    if in_speech {
                        utterance.extend_from_slice(&chunk);
                        if utterance.len() > MAX_UTTERANCE_SAMPLES {
                            warn!(target: "stt", "utterance exceeded buffer cap, forcing flush");
                        }
                    }

                    let event = match vad.process(&chunk) {
                        Ok(ev) => ev,
                        Err(err) => {
                            let _ = events_tx
                                .send(TranscriptEvent::Error {
                                    code: "vad".into(),
                                    message: err,
                                })
                                .await;
                            continue;
                        }
                    };

                    match event {
                        Some(VadEvent::SpeechStart { timestamp_ms, .. }) => {
                            in_speech = true;
                            utterance.clear();
                            utterance.extend_from_slice(&chunk);
                            utterance_start_ms = timestamp_ms;
                            debug!(target: "stt", segment_id, "utterance started");
                        }
                        Some(VadEvent::SpeechEnd { timestamp_ms, .. })
                            if in_speech && !utterance.is_empty() =>
                        {
                            in_speech = false;
                            let samples = std::mem::take(&mut utterance);
                            flush_utterance(
                                &*backend,
                                &samples,
                                language,
                                segment_id,
                                utterance_start_ms,
                                timestamp_ms,
                                &events_tx,
                            )
                            .await;
                            segment_id += 1;
                        }
                        _ => {}
                    }

                    if in_speech && utterance.len() > MAX_UTTERANCE_SAMPLES {
                        in_speech = false;
                        if let Some(VadEvent::SpeechEnd { timestamp_ms, .. }) = vad.finish() {
                            let samples = std::mem::take(&mut utterance);
                            flush_utterance(
                                &*backend,
                                &samples,
                                language,
                                segment_id,
                                utterance_start_ms,
                                timestamp_ms,
                                &events_tx,
                            )
                            .await;
                            segment_id += 1;
                        }
                    }
                }
            }

            // Input closed: flush whatever utterance is still open.
            if in_speech && !utterance.is_empty() {
                if let Some(VadEvent::SpeechEnd { timestamp_ms, .. }) = vad.finish() {
                    flush_utterance(
                        &*backend,
                        &utterance,
                        language,
                        segment_id,
                        utterance_start_ms,
                        timestamp_ms,
                        &events_tx,
                    )
                    .await;
                }
            }
            debug!(target: "stt", "vad-gated stream closed");
        });

        Ok(SttStream::new(frames_tx, events_rx, driver))
    }
}

async fn flush_utterance<B: BatchSttBackend>(
    backend: &B,
    samples: &[i16],
    language: crosstalk_foundation::Language,
    segment_id: u64,
    ts_start_ms: u64,
    ts_end_ms: u64,
    events_tx: &mpsc::Sender<TranscriptEvent>,
) {
    match backend.transcribe(samples, language).await {
        Ok(result) if !result.text.trim().is_empty() => {
            let _ = events_tx
                .send(TranscriptEvent::Final {
                    segment_id,
                    text: result.text,
                    confidence: result.confidence,
                    ts_start_ms,
                    ts_end_ms,
                })
                .await;
            let _ = events_tx
                .send(TranscriptEvent::UtteranceEnd { segment_id })
                .await;
        }
        Ok(_) => {
            debug!(target: "stt", segment_id, "empty transcription discarded");
        }
        Err(err) => {
            warn!(target: "stt", segment_id, "batch transcription failed: {err}");
            let _ = events_tx
                .send(TranscriptEvent::Error {
                    code: "transcribe".into(),
                    message: err.to_string(),
                })
                .await;
        }
    }
}

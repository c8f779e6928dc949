//! Scripted STT plugin for tests.
//!
//! Emits a fixed sequence of transcript events on a virtual timeline,
//! independent of the audio pushed in. Tests drive interim/final ordering
//! and supersession scenarios with it.

use crate::plugin::{PluginCapabilities, PluginInfo, SttPlugin};
use crate::stream::SttStream;
use crate::types::{SttStreamConfig, TranscriptEvent};
use async_trait::async_trait;
use crosstalk_foundation::{AudioFrame, Language, ProviderError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One scripted event: emitted `at_ms` after the stream opens.
#[derive(Debug, Clone)]
pub struct ScriptedEvent {
    pub at_ms: u64,
    pub event: TranscriptEvent,
}

pub struct MockSttPlugin {
    script: Arc<Vec<ScriptedEvent>>,
    /// When set, opening a stream fails with this error.
    open_error: Option<ProviderError>,
}

impl MockSttPlugin {
    pub fn with_script(script: Vec<ScriptedEvent>) -> Self {
        Self {
            script: Arc::new(script),
            open_error: None,
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            script: Arc::new(Vec::new()),
            open_error: Some(error),
        }
    }

    /// Convenience script: one interim at `t0`, a revised interim, then the
    /// final plus utterance end.
    pub fn interim_then_final(
        segment_id: u64,
        interim: &str,
        revised: &str,
        final_text: &str,
    ) -> Self {
        Self::with_script(vec![
            ScriptedEvent {
                at_ms: 0,
                event: TranscriptEvent::Interim {
                    segment_id,
                    text: interim.into(),
                    confidence: 0.5,
                    ts_start_ms: 0,
                    ts_end_ms: 120,
                },
            },
            ScriptedEvent {
                at_ms: 260,
                event: TranscriptEvent::Interim {
                    segment_id,
                    text: revised.into(),
                    confidence: 0.7,
                    ts_start_ms: 0,
                    ts_end_ms: 260,
                },
            },
            ScriptedEvent {
                at_ms: 520,
                event: TranscriptEvent::Final {
                    segment_id,
                    text: final_text.into(),
                    confidence: 0.95,
                    ts_start_ms: 0,
                    ts_end_ms: 520,
                },
            },
            ScriptedEvent {
                at_ms: 520,
                event: TranscriptEvent::UtteranceEnd { segment_id },
            },
        ])
    }
}

#[async_trait]
impl SttPlugin for MockSttPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: "mock".into(),
            name: "Scripted mock STT".into(),
            requires_network: false,
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
        self.open_error.is_none()
    }

    async fn open_stream(&self, config: SttStreamConfig) -> Result<SttStream, ProviderError> {
        config.validate()?;
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }

        let (frames_tx, mut frames_rx) = mpsc::channel::<AudioFrame>(16);
        let (events_tx, events_rx) = mpsc::channel(16);
        let script = Arc::clone(&self.script);

        let driver = tokio::spawn(async move {
            // Drain audio in the background so pushes never observe a full
            // queue during a test.
            let drain = tokio::spawn(async move { while frames_rx.recv().await.is_some() {} });

            let mut elapsed = 0u64;
            for scripted in script.iter() {
                if scripted.at_ms > elapsed {
                    tokio::time::sleep(Duration::from_millis(scripted.at_ms - elapsed)).await;
                    elapsed = scripted.at_ms;
                }
                if events_tx.send(scripted.event.clone()).await.is_err() {
                    break;
                }
            }
            drop(events_tx);
            let _ = drain.await;
        });

        Ok(SttStream::new(frames_tx, events_rx, driver))
    }
}

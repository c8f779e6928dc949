//! No-op STT plugin. Accepts audio, produces nothing. Useful as a pipeline
//! placeholder when transcription is disabled in a test scenario.

use crate::plugin::{PluginCapabilities, PluginInfo, SttPlugin};
use crate::stream::SttStream;
use crate::types::SttStreamConfig;
use async_trait::async_trait;
use crosstalk_foundation::{AudioFrame, Language, ProviderError};
use tokio::sync::mpsc;

#[derive(Default)]
pub struct NoOpSttPlugin;

impl NoOpSttPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SttPlugin for NoOpSttPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: "noop".into(),
            name: "No-op STT".into(),
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
        true
    }

    async fn open_stream(&self, config: SttStreamConfig) -> Result<SttStream, ProviderError> {
        config.validate()?;
        let (frames_tx, mut frames_rx) = mpsc::channel::<AudioFrame>(16);
        let (events_tx, events_rx) = mpsc::channel(1);

        let driver = tokio::spawn(async move {
            // Hold the event sender so the stream stays open while audio flows.
            let _events_tx = events_tx;
            while frames_rx.recv().await.is_some() {}
        });

        Ok(SttStream::new(frames_tx, events_rx, driver))
    }
}

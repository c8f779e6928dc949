//! STT plugin architecture.
//!
//! Any transcription backend implements [`SttPlugin`]; backends without a
//! streaming mode implement [`BatchSttBackend`] instead and are adapted by
//! the VAD gate. The registry owns factories and picks the best available
//! plugin by preference order.

use crate::stream::SttStream;
use crate::types::SttStreamConfig;
use async_trait::async_trait;
use crosstalk_foundation::{Language, ProviderError};

/// Metadata about an STT plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    /// Unique identifier (e.g. "deepgram", "mock").
    pub id: String,
    pub name: String,
    pub requires_network: bool,
    pub supported_languages: Vec<Language>,
}

/// What a plugin can do. `open_stream` is only legal when `streaming` is
/// true; batch-only backends must come wrapped in the VAD gate, which
/// advertises streaming on their behalf.
#[derive(Debug, Clone, Copy, Default)]
pub struct PluginCapabilities {
    pub streaming: bool,
    pub interim_results: bool,
    pub utterance_end: bool,
}

/// The main trait all STT plugins implement.
#[async_trait]
pub trait SttPlugin: Send + Sync {
    fn info(&self) -> PluginInfo;

    fn capabilities(&self) -> PluginCapabilities;

    /// Whether the backend is reachable and ready.
    async fn is_available(&self) -> bool;

    /// Open a live transcription stream for one speaker.
    async fn open_stream(&self, config: SttStreamConfig) -> Result<SttStream, ProviderError>;
}

/// Request/response transcription for backends without a streaming mode.
/// Only usable behind [`crate::VadGatedStt`].
#[async_trait]
pub trait BatchSttBackend: Send + Sync {
    fn id(&self) -> &str;

    async fn transcribe(
        &self,
        samples: &[i16],
        language: Language,
    ) -> Result<BatchTranscription, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct BatchTranscription {
    pub text: String,
    pub confidence: f32,
}

/// Factory for creating plugin instances.
pub trait SttPluginFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn SttPlugin>, ProviderError>;
    fn plugin_info(&self) -> PluginInfo;
    fn check_requirements(&self) -> Result<(), ProviderError>;
}

/// Registry of STT plugin factories with preference ordering.
#[derive(Default)]
pub struct SttPluginRegistry {
    factories: Vec<Box<dyn SttPluginFactory>>,
    preferred_order: Vec<String>,
}

impl SttPluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Box<dyn SttPluginFactory>) {
        self.factories.push(factory);
    }

    pub fn set_preferred_order(&mut self, order: Vec<String>) {
        self.preferred_order = order;
    }

    pub fn available_plugins(&self) -> Vec<PluginInfo> {
        self.factories
            .iter()
            .filter(|f| f.check_requirements().is_ok())
            .map(|f| f.plugin_info())
            .collect()
    }

    pub fn create_plugin(&self, id: &str) -> Result<Box<dyn SttPlugin>, ProviderError> {
        let plugin = self
            .factories
            .iter()
            .find(|f| f.plugin_info().id == id)
            .ok_or_else(|| ProviderError::Unavailable(format!("stt plugin '{id}' not found")))?
            .create()?;

        // The latency contract requires interim results and utterance-end
        // signalling. A batch backend reaches this point only through the
        // VAD gate, which provides both.
        if !plugin.capabilities().streaming {
            return Err(ProviderError::InvalidInput(format!(
                "stt plugin '{id}' is not streaming-capable; wrap it in a VAD gate"
            )));
        }
        Ok(plugin)
    }

    /// Create the best available plugin, honoring preference order first.
    pub fn create_best_available(&self) -> Result<Box<dyn SttPlugin>, ProviderError> {
        for plugin_id in &self.preferred_order {
            if let Ok(plugin) = self.create_plugin(plugin_id) {
                return Ok(plugin);
            }
        }

        for factory in &self.factories {
            if factory.check_requirements().is_ok() {
                if let Ok(plugin) = self.create_plugin(&factory.plugin_info().id) {
                    return Ok(plugin);
                }
            }
        }

        Err(ProviderError::Unavailable(
            "no streaming STT plugin available".into(),
        ))
    }
}

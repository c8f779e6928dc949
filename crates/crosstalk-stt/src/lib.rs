//! Streaming speech-to-text for the translation pipeline.
//!
//! The contract is interim-first: a conforming backend must deliver interim
//! hypotheses, a final per segment and an explicit utterance-end signal.
//! Batch backends participate only through the VAD-gated adapter.

pub mod plugin;
pub mod plugins;
pub mod stream;
pub mod types;
pub mod vad_gate;

pub use plugin::{
    BatchSttBackend, PluginCapabilities, PluginInfo, SttPlugin, SttPluginFactory,
    SttPluginRegistry,
};
pub use plugins::{MockSttPlugin, NoOpSttPlugin, ScriptedEvent};
pub use stream::{SttFrameSink, SttStream};
pub use types::{SttStreamConfig, TranscriptEvent};
pub use vad_gate::VadGatedStt;

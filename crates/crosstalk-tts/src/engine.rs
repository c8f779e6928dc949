//! TTS engine abstraction and synthesis lifecycle.

use crate::types::VoiceAvatar;
use async_trait::async_trait;
use crosstalk_foundation::{AudioFrame, ProviderError};
use tokio::sync::{mpsc, oneshot, watch};

/// Lifecycle events for one synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisEvent {
    Started { synthesis_id: u64 },
    Completed { synthesis_id: u64 },
    Failed { synthesis_id: u64, error: ProviderError },
    Cancelled { synthesis_id: u64 },
}

/// Handle to an in-flight synthesis.
///
/// Audio frames land in the sink passed to `synthesize` in order; the handle
/// reports how the request ended. `cancel()` stops emission and drops any
/// audio the engine has buffered but not yet written.
pub struct SynthesisHandle {
    pub synthesis_id: u64,
    cancel_tx: watch::Sender<bool>,
    done_rx: oneshot::Receiver<SynthesisEvent>,
}

impl SynthesisHandle {
    pub fn new(
        synthesis_id: u64,
        cancel_tx: watch::Sender<bool>,
        done_rx: oneshot::Receiver<SynthesisEvent>,
    ) -> Self {
        Self {
            synthesis_id,
            cancel_tx,
            done_rx,
        }
    }

    /// Request cancellation. Idempotent; the terminal event reports whether
    /// the request finished before the signal landed.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Wait for the terminal event.
    pub async fn finished(self) -> SynthesisEvent {
        let id = self.synthesis_id;
        self.done_rx
            .await
            .unwrap_or(SynthesisEvent::Cancelled { synthesis_id: id })
    }
}

/// Sink for synthesized audio, bounded so a stalled consumer back-pressures
/// the engine instead of buffering unboundedly.
pub type AudioSink = mpsc::Sender<AudioFrame>;

/// Core TTS engine interface.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the engine can currently synthesize with this avatar.
    async fn is_available(&self) -> bool;

    /// Synthesize `text` with `voice`, writing frames into `sink` in order.
    /// Returns once the request is accepted; audio flows asynchronously.
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceAvatar,
        sink: AudioSink,
    ) -> Result<SynthesisHandle, ProviderError>;
}

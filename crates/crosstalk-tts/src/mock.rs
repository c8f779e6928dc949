//! Deterministic TTS engine for tests.
//!
//! Produces one 20 ms PCM frame per word of input so tests can assert frame
//! counts, and honors cancellation between frames.

use crate::engine::{AudioSink, SynthesisEvent, SynthesisHandle, TtsEngine};
use crate::next_synthesis_id;
use crate::types::VoiceAvatar;
use async_trait::async_trait;
use crosstalk_foundation::{AudioFrame, ProviderError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};

const SAMPLE_RATE_HZ: u32 = 16_000;
const FRAME_SAMPLES: usize = 320; // 20 ms at 16 kHz

pub struct MockTtsEngine {
    /// Per-frame emission delay; zero emits as fast as the sink accepts.
    frame_delay: Mutex<Duration>,
    /// Voice ids that fail with `VoiceUnavailable`.
    unavailable_voices: Mutex<Vec<String>>,
    syntheses_started: AtomicU64,
    syntheses_cancelled: Arc<AtomicU64>,
}

impl Default for MockTtsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTtsEngine {
    pub fn new() -> Self {
        Self {
            frame_delay: Mutex::new(Duration::ZERO),
            unavailable_voices: Mutex::new(Vec::new()),
            syntheses_started: AtomicU64::new(0),
            syntheses_cancelled: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_frame_delay(&self, delay: Duration) {
        *self.frame_delay.lock() = delay;
    }

    pub fn mark_voice_unavailable(&self, voice_id: impl Into<String>) {
        self.unavailable_voices.lock().push(voice_id.into());
    }

    pub fn syntheses_started(&self) -> u64 {
        self.syntheses_started.load(Ordering::Relaxed)
    }

    pub fn syntheses_cancelled(&self) -> u64 {
        self.syntheses_cancelled.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TtsEngine for MockTtsEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceAvatar,
        sink: AudioSink,
    ) -> Result<SynthesisHandle, ProviderError> {
        if self.unavailable_voices.lock().contains(&voice.voice_id) {
            return Err(ProviderError::VoiceUnavailable {
                voice_id: voice.voice_id.clone(),
            });
        }
        if text.trim().is_empty() {
            return Err(ProviderError::InvalidInput("empty text".into()));
        }

        self.syntheses_started.fetch_add(1, Ordering::Relaxed);
        let synthesis_id = next_synthesis_id();
        let frame_count = text.split_whitespace().count().max(1);
        let frame_delay = *self.frame_delay.lock();

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = oneshot::channel();
        let cancelled_counter = Arc::clone(&self.syntheses_cancelled);

        tokio::spawn(async move {
            for i in 0..frame_count {
                if *cancel_rx.borrow() {
                    cancelled_counter.fetch_add(1, Ordering::Relaxed);
                    let _ = done_tx.send(SynthesisEvent::Cancelled { synthesis_id });
                    return;
                }
                if !frame_delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(frame_delay) => {}
                        _ = cancel_rx.changed() => {
                            cancelled_counter.fetch_add(1, Ordering::Relaxed);
                            let _ = done_tx.send(SynthesisEvent::Cancelled { synthesis_id });
                            return;
                        }
                    }
                }
                let frame = AudioFrame {
                    data: vec![(synthesis_id as i16).wrapping_mul(3); FRAME_SAMPLES],
                    sample_rate_hz: SAMPLE_RATE_HZ,
                    channels: 1,
                    timestamp_ms: (i * 20) as u64,
                };
                if sink.send(frame).await.is_err() {
                    let _ = done_tx.send(SynthesisEvent::Cancelled { synthesis_id });
                    return;
                }
            }
            let _ = done_tx.send(SynthesisEvent::Completed { synthesis_id });
        });

        Ok(SynthesisHandle::new(synthesis_id, cancel_tx, done_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VoiceGender;
    use crosstalk_foundation::Language;
    use tokio::sync::mpsc;

    fn avatar(voice_id: &str) -> VoiceAvatar {
        VoiceAvatar {
            voice_id: voice_id.into(),
            provider: "mock".into(),
            language: Language::English,
            display_name: "Test".into(),
            gender: VoiceGender::Neutral,
            accent: "none".into(),
            description: "test".into(),
        }
    }

    #[tokio::test]
    async fn one_frame_per_word_then_completed() {
        let engine = MockTtsEngine::new();
        let (sink, mut rx) = mpsc::channel(16);
        let handle = engine
            .synthesize("hello there friend", &avatar("v1"), sink)
            .await
            .unwrap();

        let mut frames = 0;
        while rx.recv().await.is_some() {
            frames += 1;
        }
        assert_eq!(frames, 3);
        assert!(matches!(
            handle.finished().await,
            SynthesisEvent::Completed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_emission() {
        let engine = MockTtsEngine::new();
        engine.set_frame_delay(Duration::from_millis(20));
        let (sink, mut rx) = mpsc::channel(16);
        let handle = engine
            .synthesize("one two three four five six", &avatar("v1"), sink)
            .await
            .unwrap();

        handle.cancel();
        assert!(matches!(
            handle.finished().await,
            SynthesisEvent::Cancelled { .. }
        ));
        // At most one frame may have slipped out before the signal landed.
        let mut leaked = 0;
        while rx.try_recv().is_ok() {
            leaked += 1;
        }
        assert!(leaked <= 1, "cancelled synthesis leaked {leaked} frames");
        assert_eq!(engine.syntheses_cancelled(), 1);
    }

    #[tokio::test]
    async fn unavailable_voice_is_reported() {
        let engine = MockTtsEngine::new();
        engine.mark_voice_unavailable("broken");
        let (sink, _rx) = mpsc::channel(4);
        let result = engine.synthesize("hola", &avatar("broken"), sink).await;
        assert!(matches!(
            result,
            Err(ProviderError::VoiceUnavailable { .. })
        ));
    }
}

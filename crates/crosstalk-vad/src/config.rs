use serde::{Deserialize, Serialize};

use crate::{FRAME_SIZE_SAMPLES, SAMPLE_RATE_HZ};

/// Energy-VAD tuning.
///
/// The silence debounce doubles as the utterance-end window: once speech has
/// been absent for `silence_debounce_ms` the utterance is closed and the
/// gated STT backend is flushed. Keeping it at or under 500 ms is what holds
/// the end-to-end latency ceiling for batch backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    pub onset_threshold_db: f32,
    pub offset_threshold_db: f32,
    pub speech_debounce_ms: u32,
    pub silence_debounce_ms: u32,
    pub frame_size_samples: usize,
    pub sample_rate_hz: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            onset_threshold_db: -40.0,
            offset_threshold_db: -45.0,
            speech_debounce_ms: 96,
            silence_debounce_ms: 448,
            frame_size_samples: FRAME_SIZE_SAMPLES,
            sample_rate_hz: SAMPLE_RATE_HZ,
        }
    }
}

impl VadConfig {
    pub fn frame_duration_ms(&self) -> f32 {
        (self.frame_size_samples as f32 * 1000.0) / self.sample_rate_hz as f32
    }

    pub fn speech_debounce_frames(&self) -> u32 {
        (self.speech_debounce_ms as f32 / self.frame_duration_ms()).ceil() as u32
    }

    pub fn silence_debounce_frames(&self) -> u32 {
        (self.silence_debounce_ms as f32 / self.frame_duration_ms()).ceil() as u32
    }
}

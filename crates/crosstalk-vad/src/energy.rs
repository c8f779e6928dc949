use crate::config::VadConfig;
use crate::engine::VadEngine;
use crate::state::VadStateMachine;
use crate::types::{VadEvent, VadState};

/// Energy-based VAD over RMS/dBFS with debounced transitions.
///
/// Good enough to gate a batch STT backend into utterance-shaped requests;
/// not meant to compete with ML detectors on noisy input.
pub struct EnergyVad {
    config: VadConfig,
    state_machine: VadStateMachine,
    epsilon: f32,
}

impl EnergyVad {
    pub fn new(config: VadConfig) -> Self {
        let state_machine = VadStateMachine::new(&config);
        Self {
            config,
            state_machine,
            epsilon: 1e-10,
        }
    }

    fn calculate_rms(&self, frame: &[i16]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }

        let sum_squares: i64 = frame
            .iter()
            .map(|&sample| {
                let s = sample as i64;
                s * s
            })
            .sum();

        let mean_square = sum_squares as f64 / frame.len() as f64;
        (mean_square.sqrt() / 32768.0) as f32
    }

    fn rms_to_dbfs(&self, rms: f32) -> f32 {
        if rms <= self.epsilon {
            return -100.0;
        }
        20.0 * rms.log10()
    }

    pub fn calculate_dbfs(&self, frame: &[i16]) -> f32 {
        let rms = self.calculate_rms(frame);
        self.rms_to_dbfs(rms)
    }

    /// Close an in-progress utterance without further audio.
    pub fn finish(&mut self) -> Option<VadEvent> {
        self.state_machine.force_end(-100.0)
    }
}

impl VadEngine for EnergyVad {
    fn process(&mut self, frame: &[i16]) -> Result<Option<VadEvent>, String> {
        if frame.len() != self.config.frame_size_samples {
            return Err(format!(
                "expected {} samples, got {}",
                self.config.frame_size_samples,
                frame.len()
            ));
        }

        let energy_db = self.calculate_dbfs(frame);
        let threshold = match self.state_machine.current_state() {
            VadState::Silence => self.config.onset_threshold_db,
            VadState::Speech => self.config.offset_threshold_db,
        };
        let is_speech = energy_db > threshold;
        Ok(self.state_machine.process(is_speech, energy_db))
    }

    fn reset(&mut self) {
        self.state_machine.reset();
    }

    fn current_state(&self) -> VadState {
        self.state_machine.current_state()
    }

    fn required_sample_rate(&self) -> u32 {
        self.config.sample_rate_hz
    }

    fn required_frame_size_samples(&self) -> usize {
        self.config.frame_size_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FRAME_SIZE_SAMPLES;

    fn loud_frame() -> Vec<i16> {
        (0..FRAME_SIZE_SAMPLES)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / FRAME_SIZE_SAMPLES as f32;
                (phase.sin() * 16384.0) as i16
            })
            .collect()
    }

    #[test]
    fn silence_returns_low_dbfs() {
        let vad = EnergyVad::new(VadConfig::default());
        let silence = vec![0i16; FRAME_SIZE_SAMPLES];
        assert!(vad.calculate_dbfs(&silence) <= -100.0);
    }

    #[test]
    fn full_scale_returns_zero_dbfs() {
        let vad = EnergyVad::new(VadConfig::default());
        let full_scale = vec![32767i16; FRAME_SIZE_SAMPLES];
        assert!((vad.calculate_dbfs(&full_scale) - 0.0).abs() < 0.1);
    }

    #[test]
    fn wrong_frame_size_is_rejected() {
        let mut vad = EnergyVad::new(VadConfig::default());
        assert!(vad.process(&[0i16; 100]).is_err());
    }

    #[test]
    fn loud_frames_drive_speech_start() {
        let mut vad = EnergyVad::new(VadConfig::default());
        let frame = loud_frame();
        let mut event = None;
        for _ in 0..8 {
            if let Some(ev) = vad.process(&frame).unwrap() {
                event = Some(ev);
                break;
            }
        }
        assert!(matches!(event, Some(VadEvent::SpeechStart { .. })));
        assert_eq!(vad.current_state(), VadState::Speech);
    }
}

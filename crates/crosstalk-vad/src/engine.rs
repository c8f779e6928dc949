use crate::types::{VadEvent, VadState};

/// Interface for VAD engines.
///
/// Keeps the gated-STT wrapper independent of the detection strategy; an
/// ML-based engine can live in its own crate against this trait.
pub trait VadEngine: Send {
    fn process(&mut self, frame: &[i16]) -> Result<Option<VadEvent>, String>;
    fn reset(&mut self);
    fn current_state(&self) -> VadState;
    fn required_sample_rate(&self) -> u32;
    fn required_frame_size_samples(&self) -> usize;
}

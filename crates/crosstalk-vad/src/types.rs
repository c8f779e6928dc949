/// Utterance boundary events emitted by a VAD engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VadEvent {
    SpeechStart {
        timestamp_ms: u64,
        energy_db: f32,
    },
    SpeechEnd {
        timestamp_ms: u64,
        duration_ms: u64,
        energy_db: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    Silence,
    Speech,
}

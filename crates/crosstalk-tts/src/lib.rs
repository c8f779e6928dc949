//! Streaming text-to-speech abstraction.

pub mod catalog;
pub mod engine;
pub mod mock;
pub mod types;

pub use catalog::VoiceCatalog;
pub use engine::{SynthesisEvent, SynthesisHandle, TtsEngine};
pub use mock::MockTtsEngine;
pub use types::{VoiceAvatar, VoiceGender};

/// Monotonically increasing synthesis ids, unique within the process.
pub fn next_synthesis_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

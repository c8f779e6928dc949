//! Transcript events and stream configuration.

use crosstalk_foundation::{Language, ProviderError};
use serde::{Deserialize, Serialize};

/// Events produced by a live transcription stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    /// Revisable hypothesis for an in-progress segment.
    Interim {
        segment_id: u64,
        text: String,
        confidence: f32,
        ts_start_ms: u64,
        ts_end_ms: u64,
    },
    /// Stable hypothesis; no further revisions for this segment.
    Final {
        segment_id: u64,
        text: String,
        confidence: f32,
        ts_start_ms: u64,
        ts_end_ms: u64,
    },
    /// The speaker finished the utterance containing this segment.
    UtteranceEnd { segment_id: u64 },
    /// Backend error that did not terminate the stream.
    Error { code: String, message: String },
}

impl TranscriptEvent {
    pub fn segment_id(&self) -> Option<u64> {
        match self {
            TranscriptEvent::Interim { segment_id, .. }
            | TranscriptEvent::Final { segment_id, .. }
            | TranscriptEvent::UtteranceEnd { segment_id } => Some(*segment_id),
            TranscriptEvent::Error { .. } => None,
        }
    }
}

/// Stream configuration tuned for simultaneous interpretation.
///
/// The defaults trade transcription polish for latency: no punctuation, no
/// smart formatting, no profanity filtering, no language detection, and an
/// utterance-end window capped at 500 ms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttStreamConfig {
    pub language: Language,
    pub sample_rate_hz: u32,
    pub interim_results: bool,
    pub punctuate: bool,
    pub smart_format: bool,
    pub profanity_filter: bool,
    pub utterance_end_ms: u32,
    pub detect_language: bool,
}

impl SttStreamConfig {
    pub const MAX_UTTERANCE_END_MS: u32 = 500;

    /// The only constructor pipelines use.
    pub fn low_latency(language: Language) -> Self {
        Self {
            language,
            sample_rate_hz: 16_000,
            interim_results: true,
            punctuate: false,
            smart_format: false,
            profanity_filter: false,
            utterance_end_ms: Self::MAX_UTTERANCE_END_MS,
            detect_language: false,
        }
    }

    /// Rejects configurations that would break the latency contract.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if !self.interim_results {
            return Err(ProviderError::InvalidInput(
                "interim results are required for simultaneous interpretation".into(),
            ));
        }
        if self.utterance_end_ms == 0 || self.utterance_end_ms > Self::MAX_UTTERANCE_END_MS {
            return Err(ProviderError::InvalidInput(format!(
                "utterance_end_ms must be in 1..={}, got {}",
                Self::MAX_UTTERANCE_END_MS,
                self.utterance_end_ms
            )));
        }
        if self.detect_language {
            return Err(ProviderError::InvalidInput(
                "language detection must be off; the caller supplies the language".into(),
            ));
        }
        Ok(())
    }
}

//! Wire messages for the Deepgram listen protocol.

use crosstalk_stt::TranscriptEvent;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ListenMessage {
    /// Transcription result, interim or final per `is_final`.
    Results {
        channel: ResultChannel,
        #[serde(default)]
        is_final: bool,
        #[serde(default)]
        start: f64,
        #[serde(default)]
        duration: f64,
    },
    /// The utterance-end marker requested via `utterance_end_ms`.
    UtteranceEnd {
        #[serde(default)]
        last_word_end: f64,
    },
    /// Sent when `vad_events` is on; carries no transcript.
    SpeechStarted {
        #[serde(default)]
        timestamp: f64,
    },
    Metadata {
        #[serde(default)]
        request_id: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct ResultChannel {
    pub alternatives: Vec<ResultAlternative>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResultAlternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Parse one socket message into transcript events.
///
/// Deepgram does not number segments; the caller-provided counter is the
/// segment id for everything until the next `UtteranceEnd`, which consumes
/// it and advances.
pub fn parse_message(text: &str, segment_id: &mut u64) -> Vec<TranscriptEvent> {
    let message: ListenMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            tracing::debug!(target: "stt", "unrecognized deepgram message: {err}");
            return Vec::new();
        }
    };

    match message {
        ListenMessage::Results {
            channel,
            is_final,
            start,
            duration,
        } => {
            let Some(alt) = channel.alternatives.first() else {
                return Vec::new();
            };
            if alt.transcript.trim().is_empty() {
                return Vec::new();
            }
            let ts_start_ms = (start * 1000.0) as u64;
            let ts_end_ms = ((start + duration) * 1000.0) as u64;
            let event = if is_final {
                TranscriptEvent::Final {
                    segment_id: *segment_id,
                    text: alt.transcript.clone(),
                    confidence: alt.confidence,
                    ts_start_ms,
                    ts_end_ms,
                }
            } else {
                TranscriptEvent::Interim {
                    segment_id: *segment_id,
                    text: alt.transcript.clone(),
                    confidence: alt.confidence,
                    ts_start_ms,
                    ts_end_ms,
                }
            };
            vec![event]
        }
        ListenMessage::UtteranceEnd { .. } => {
            let event = TranscriptEvent::UtteranceEnd {
                segment_id: *segment_id,
            };
            *segment_id += 1;
            vec![event]
        }
        ListenMessage::SpeechStarted { .. } | ListenMessage::Metadata { .. } => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interim_result_maps_to_interim_event() {
        let raw = r#"{
            "type": "Results",
            "channel": {"alternatives": [{"transcript": "hola ami", "confidence": 0.61}]},
            "is_final": false,
            "start": 0.0,
            "duration": 0.48
        }"#;
        let mut segment_id = 3;
        let events = parse_message(raw, &mut segment_id);
        assert_eq!(events.len(), 1);
        match &events[0] {
            TranscriptEvent::Interim {
                segment_id, text, ts_end_ms, ..
            } => {
                assert_eq!(*segment_id, 3);
                assert_eq!(text, "hola ami");
                assert_eq!(*ts_end_ms, 480);
            }
            other => panic!("expected Interim, got {other:?}"),
        }
        // Interims do not advance the segment counter.
        assert_eq!(segment_id, 3);
    }

    #[test]
    fn final_then_utterance_end_advances_segment() {
        let final_raw = r#"{
            "type": "Results",
            "channel": {"alternatives": [{"transcript": "hola amigo", "confidence": 0.93}]},
            "is_final": true,
            "start": 0.0,
            "duration": 0.9
        }"#;
        let end_raw = r#"{"type": "UtteranceEnd", "last_word_end": 0.9}"#;

        let mut segment_id = 0;
        let finals = parse_message(final_raw, &mut segment_id);
        assert!(matches!(
            finals[0],
            TranscriptEvent::Final { segment_id: 0, .. }
        ));
        assert_eq!(segment_id, 0);

        let ends = parse_message(end_raw, &mut segment_id);
        assert_eq!(ends[0], TranscriptEvent::UtteranceEnd { segment_id: 0 });
        assert_eq!(segment_id, 1);
    }

    #[test]
    fn empty_transcript_and_metadata_produce_nothing() {
        let empty = r#"{
            "type": "Results",
            "channel": {"alternatives": [{"transcript": "  ", "confidence": 0.0}]},
            "is_final": false
        }"#;
        let metadata = r#"{"type": "Metadata", "request_id": "abc"}"#;
        let mut segment_id = 0;
        assert!(parse_message(empty, &mut segment_id).is_empty());
        assert!(parse_message(metadata, &mut segment_id).is_empty());
        assert!(parse_message("not json", &mut segment_id).is_empty());
    }
}

use crate::pipeline_metrics::PipelineMetrics;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;

/// Point-in-time view of one pipeline's counters, serialized for the
/// room-stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineStatsSnapshot {
    pub listener: String,
    pub speaker: String,
    pub source_language: String,
    pub target_language: String,
    pub state: String,
    pub segments_completed: u64,
    pub segments_failed: u64,
    pub segments_dropped: u64,
    pub missed_segments: u64,
    pub segments_pending: usize,
    pub interim_translations_issued: u64,
    pub interim_translations_cancelled: u64,
    pub avg_speak_latency_ms: Option<u64>,
    pub p95_speak_latency_ms: Option<u64>,
}

impl PipelineStatsSnapshot {
    pub fn capture(
        listener: &str,
        speaker: &str,
        source_language: &str,
        target_language: &str,
        state: &str,
        metrics: &PipelineMetrics,
    ) -> Self {
        Self {
            listener: listener.to_string(),
            speaker: speaker.to_string(),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            state: state.to_string(),
            segments_completed: metrics.segments_completed.load(Ordering::Relaxed),
            segments_failed: metrics.segments_failed.load(Ordering::Relaxed),
            segments_dropped: metrics.segments_dropped.load(Ordering::Relaxed),
            missed_segments: metrics.missed_segments.load(Ordering::Relaxed),
            segments_pending: metrics.segments_pending.load(Ordering::Relaxed),
            interim_translations_issued: metrics
                .interim_translations_issued
                .load(Ordering::Relaxed),
            interim_translations_cancelled: metrics
                .interim_translations_cancelled
                .load(Ordering::Relaxed),
            avg_speak_latency_ms: metrics.speak_latency.average_ms(),
            p95_speak_latency_ms: metrics.speak_latency.p95_ms(),
        }
    }
}

/// Room-level aggregate served behind `GET /rooms/{id}/translation-stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomStatsSnapshot {
    pub room_id: String,
    pub room_type: String,
    pub participant_count: usize,
    pub uptime_secs: u64,
    pub pipelines: Vec<PipelineStatsSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_reflects_counters() {
        let metrics = PipelineMetrics::new();
        metrics.record_completed(200);
        metrics.record_missed();
        metrics.set_pending(3);

        let snap = PipelineStatsSnapshot::capture("maria", "john", "en", "es", "running", &metrics);
        assert_eq!(snap.segments_completed, 1);
        assert_eq!(snap.missed_segments, 1);
        assert_eq!(snap.segments_pending, 3);
        assert_eq!(snap.avg_speak_latency_ms, Some(200));
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let snap = RoomStatsSnapshot {
            room_id: "room-1".into(),
            room_type: "translation".into(),
            participant_count: 2,
            uptime_secs: 42,
            pipelines: vec![],
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"room_id\":\"room-1\""));
    }
}

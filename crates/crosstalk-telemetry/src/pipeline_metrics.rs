use crate::latency::LatencyTracker;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared metrics for one translation pipeline, updated from its three tasks
/// and read by the coordinator's stats snapshots.
#[derive(Clone, Default)]
pub struct PipelineMetrics {
    // Segment accounting
    pub segments_completed: Arc<AtomicU64>,
    pub segments_failed: Arc<AtomicU64>,
    pub segments_dropped: Arc<AtomicU64>,
    /// Segments whose translation finished after the deadline.
    pub missed_segments: Arc<AtomicU64>,
    pub segments_pending: Arc<AtomicUsize>,

    // Interim handling
    pub interim_translations_issued: Arc<AtomicU64>,
    pub interim_translations_cancelled: Arc<AtomicU64>,

    // Stream accounting
    pub stt_frames_in: Arc<AtomicU64>,
    pub stt_events_in: Arc<AtomicU64>,
    pub tts_frames_out: Arc<AtomicU64>,
    pub tts_syntheses_cancelled: Arc<AtomicU64>,

    // Provider retries exhausted into drops
    pub transient_retries: Arc<AtomicU64>,

    /// First-seen to TTS-first-audio latency.
    pub speak_latency: LatencyTracker,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_completed(&self, latency_ms: u64) {
        self.segments_completed.fetch_add(1, Ordering::Relaxed);
        self.speak_latency.record(latency_ms);
    }

    pub fn record_dropped(&self) {
        self.segments_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missed(&self) {
        self.missed_segments.fetch_add(1, Ordering::Relaxed);
        self.segments_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.segments_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_pending(&self, pending: usize) {
        self.segments_pending.store(pending, Ordering::Relaxed);
    }
}

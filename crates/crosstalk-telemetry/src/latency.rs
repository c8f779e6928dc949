use parking_lot::Mutex;
use std::sync::Arc;

const RESERVOIR_CAPACITY: usize = 512;

/// Bounded reservoir of latency samples with average and p95 readouts.
///
/// Overwrites the oldest sample once full; room sessions are long-lived and
/// recent latency is what operators care about.
#[derive(Clone, Default)]
pub struct LatencyTracker {
    inner: Arc<Mutex<Reservoir>>,
}

#[derive(Default)]
struct Reservoir {
    samples: Vec<u64>,
    next: usize,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, latency_ms: u64) {
        let mut inner = self.inner.lock();
        if inner.samples.len() < RESERVOIR_CAPACITY {
            inner.samples.push(latency_ms);
        } else {
            let next = inner.next;
            inner.samples[next] = latency_ms;
        }
        inner.next = (inner.next + 1) % RESERVOIR_CAPACITY;
    }

    pub fn average_ms(&self) -> Option<u64> {
        let inner = self.inner.lock();
        if inner.samples.is_empty() {
            return None;
        }
        let sum: u64 = inner.samples.iter().sum();
        Some(sum / inner.samples.len() as u64)
    }

    pub fn p95_ms(&self) -> Option<u64> {
        let inner = self.inner.lock();
        if inner.samples.is_empty() {
            return None;
        }
        let mut sorted = inner.samples.clone();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64) * 0.95).ceil() as usize - 1;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    pub fn sample_count(&self) -> usize {
        self.inner.lock().samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tracker_has_no_readings() {
        let tracker = LatencyTracker::new();
        assert_eq!(tracker.average_ms(), None);
        assert_eq!(tracker.p95_ms(), None);
    }

    #[test]
    fn average_and_p95() {
        let tracker = LatencyTracker::new();
        for ms in 1..=100 {
            tracker.record(ms);
        }
        assert_eq!(tracker.average_ms(), Some(50));
        assert_eq!(tracker.p95_ms(), Some(95));
    }

    #[test]
    fn reservoir_wraps_at_capacity() {
        let tracker = LatencyTracker::new();
        for _ in 0..RESERVOIR_CAPACITY {
            tracker.record(1000);
        }
        for _ in 0..RESERVOIR_CAPACITY {
            tracker.record(10);
        }
        assert_eq!(tracker.sample_count(), RESERVOIR_CAPACITY);
        assert_eq!(tracker.average_ms(), Some(10));
    }
}

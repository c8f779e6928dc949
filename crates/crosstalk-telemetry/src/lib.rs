pub mod latency;
pub mod pipeline_metrics;
pub mod snapshot;

pub use latency::LatencyTracker;
pub use pipeline_metrics::PipelineMetrics;
pub use snapshot::{PipelineStatsSnapshot, RoomStatsSnapshot};

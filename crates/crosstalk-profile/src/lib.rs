//! User profiles: snapshot model, TTL cache and backing stores.
//!
//! Snapshots are captured by value into pipelines at construction time, so
//! the cache is process-local with no coherence requirement beyond its TTL.

pub mod cache;
pub mod snapshot;
pub mod store;

pub use cache::{CacheStats, ProfileCache};
pub use snapshot::ProfileSnapshot;
pub use store::{HttpProfileStore, ProfileStore, StaticProfileStore};

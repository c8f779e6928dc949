//! Seam to the real-time media transport.
//!
//! The worker is a headless room participant: it taps other participants'
//! raw audio, publishes listener-private translated tracks, and rewrites
//! per-listener subscription sets. Everything the room logic needs from the
//! transport fits in the [`RoomTransport`] trait; production backs it with
//! the vendor SDK, tests with [`MemoryTransport`].

pub mod memory;
pub mod metadata;
pub mod room;
pub mod types;

pub use memory::MemoryTransport;
pub use metadata::ParticipantMetadata;
pub use room::RoomTransport;
pub use types::{ControlMessage, RoomEvent, RoomType, TrackId, TrackInfo, TrackKind};

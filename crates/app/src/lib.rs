//! Room-level simultaneous interpretation.
//!
//! The crate wires the capability crates into running rooms: a pipeline per
//! (listener, speaker) language pair, an audio router enforcing who hears
//! what, a per-room coordinator owning the registry, and a worker host that
//! runs many rooms in one process.

pub mod config;
pub mod coordinator;
pub mod pipeline;
pub mod router;
pub mod worker;

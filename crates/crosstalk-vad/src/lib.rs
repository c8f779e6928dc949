pub mod config;
pub mod energy;
pub mod engine;
pub mod state;
pub mod types;

pub use config::VadConfig;
pub use energy::EnergyVad;
pub use engine::VadEngine;
pub use state::VadStateMachine;
pub use types::{VadEvent, VadState};

/// Frame size the in-tree engine operates on: 512 samples at 16 kHz (32 ms).
pub const FRAME_SIZE_SAMPLES: usize = 512;
pub const SAMPLE_RATE_HZ: u32 = 16_000;

pub mod mock;
pub mod noop;

pub use mock::{MockSttPlugin, ScriptedEvent};
pub use noop::NoOpSttPlugin;

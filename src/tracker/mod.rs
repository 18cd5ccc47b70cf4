mod engine;
mod events;
mod gate;
mod runtime;

pub use engine::{Resolution, TaskTracker, TrackedTask, TrackerError};
pub use events::TrackerEvent;
#[allow(unused_imports)]
pub use gate::{CompletionGate, GatePass};
pub use runtime::{Schedule, TrackerRuntime};

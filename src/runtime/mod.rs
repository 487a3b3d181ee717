//! Single-writer async runtime and event stream APIs.

/// Event stream types emitted by the runtime.
pub mod events;
/// Handle and command loop implementation.
pub mod handle;

pub use events::TrackerEvent;
pub use handle::{RuntimeConfig, RuntimeError, TrackerHandle, TrackerStatus, open_tracker, spawn_tracker};

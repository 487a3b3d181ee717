//! In-memory authoritative meal store and goal manager.

/// Daily protein goal and its manager.
pub mod goal;
/// Authoritative meal store and undo/redo engine.
pub mod store;

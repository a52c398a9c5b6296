//! Platform abstraction for the engine's scheduling needs.
//!
//! The engine never runs a flush on its own; it asks the host to schedule one
//! and the host drives [`crate::Root::tick`] (or `run_until_idle`) from its
//! event loop.

/// Schedules work for the engine.
///
/// Implementations must be safe to share across threads so that a waker can
/// live on another thread than the one driving the root.
pub trait RuntimeScheduler: Send + Sync {
    /// Request that the host run a flush once the current synchronous turn ends.
    ///
    /// Called at most once per turn, when the first instance becomes dirty.
    fn schedule_flush(&self);
}

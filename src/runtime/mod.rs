//! Single-writer async runtime, executor seam and lifecycle events.

/// Lifecycle events and the sink trait.
pub mod events;
/// Executor trait and adapters.
pub mod executor;
/// Handle and command loop implementation.
pub mod handle;

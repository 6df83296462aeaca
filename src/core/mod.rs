//! In-memory request ledger, cache gate and entity collection.

/// Synchronous orchestration of ledger, gate and view.
pub mod cache;
/// Ordered key → entity map.
pub mod collection;
/// Admission decisions.
pub mod gate;
/// Bounded request history.
pub mod ledger;

//! Materialization of the entity view from the request ledger.

/// Deep merge used by update folds.
pub mod merge;
/// Memoized view builder.
pub mod view;

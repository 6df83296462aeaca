//! Request-deduplicating entity cache with optimistic updates.
//!
//! Each entity collection keeps a bounded ledger of the fetch and mutate
//! requests issued against it. The ledger decides whether a new request must
//! run or can reuse an active or recently successful one, and the visible
//! collection is materialized from it: confirmed results in finish order,
//! then pending optimistic edits on top.
//!
//! # Examples
//!
//! Synchronous usage with [`core::cache::DataCache`]:
//! ```
//! use entity_cache::{
//!     config::EntityConfig,
//!     core::cache::DataCache,
//!     op::{OperationInput, Outcome},
//!     runtime::executor::NoopExecutor,
//!     types::OperationKind,
//! };
//! use serde_json::json;
//!
//! let config = EntityConfig::builder("users")
//!     .executor(NoopExecutor)
//!     .build()
//!     .expect("config");
//! let mut cache = DataCache::new(&config);
//!
//! let read = cache.begin(OperationKind::ReadMany, OperationInput::new());
//! let again = cache.begin(OperationKind::ReadMany, OperationInput::new());
//! assert_eq!(again.request_id(), read.request_id());
//! cache.finish(read.request_id(), Outcome::Success(json!([{"id": 1, "name": "x"}])));
//! assert_eq!(cache.collection().get("1"), Some(&json!({"id": 1, "name": "x"})));
//! ```
//!
//! Runtime usage with an async executor:
//! ```no_run
//! use entity_cache::{
//!     config::EntityConfig,
//!     op::OperationInput,
//!     runtime::{
//!         executor::from_fn,
//!         handle::{spawn_entity, RuntimeConfig},
//!     },
//!     types::OperationKind,
//! };
//! use futures::FutureExt;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = EntityConfig::builder("users")
//!     .executor(from_fn(|_kind, _config| {
//!         Some(async { Ok(json!([{"id": 1, "name": "x"}])) }.boxed())
//!     }))
//!     .build()
//!     .expect("config");
//! let handle = spawn_entity(config, None, RuntimeConfig::default());
//! let (_performed, _outcome) = handle
//!     .perform_settled(OperationKind::ReadMany, OperationInput::new())
//!     .await
//!     .expect("perform");
//! let users = handle.collection().await.expect("collection");
//! assert_eq!(users.len(), 1);
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Millisecond clocks.
pub mod clock;
/// Collection configuration and validation.
pub mod config;
/// Ledger, gate, collection and their synchronous orchestration.
pub mod core;
/// View materialization.
pub mod engine;
/// Entity key extraction and generation.
pub mod key;
/// Operation config and outcome model.
pub mod op;
/// Combining many collections.
pub mod registry;
/// Single-writer runtime handle and events.
pub mod runtime;
/// String action tags.
pub mod tag;
/// Shared primitive types and enums.
pub mod types;

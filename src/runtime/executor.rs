//! The external operation executor a collection delegates real work to.

use futures::future::BoxFuture;
use serde_json::Value;

use crate::{op::OperationConfig, types::OperationKind};

/// Resolution (`Ok`) or rejection (`Err`) of an executed operation.
pub type ExecResult = Result<Value, Value>;
/// Pending execution.
pub type ExecFuture = BoxFuture<'static, ExecResult>;

/// Performs the actual fetch or mutation for a collection.
///
/// Returning `None` means there was nothing to do; the request is then
/// settled immediately as a success with a `null` payload.
pub trait Executor: Send + Sync {
    /// Starts `kind` with `config`, or returns `None` when there is nothing to do.
    fn process(&self, kind: OperationKind, config: &OperationConfig) -> Option<ExecFuture>;
}

/// Executor backed by a closure.
pub struct FnExecutor<F>(F);

/// Wraps a closure as an [`Executor`].
pub fn from_fn<F>(f: F) -> FnExecutor<F>
where
    F: Fn(OperationKind, &OperationConfig) -> Option<ExecFuture> + Send + Sync,
{
    FnExecutor(f)
}

impl<F> Executor for FnExecutor<F>
where
    F: Fn(OperationKind, &OperationConfig) -> Option<ExecFuture> + Send + Sync,
{
    fn process(&self, kind: OperationKind, config: &OperationConfig) -> Option<ExecFuture> {
        (self.0)(kind, config)
    }
}

/// Executor that never has anything to do.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl Executor for NoopExecutor {
    fn process(&self, _kind: OperationKind, _config: &OperationConfig) -> Option<ExecFuture> {
        None
    }
}

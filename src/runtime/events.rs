//! Lifecycle events emitted by the entity runtime.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    op::OperationConfig,
    tag::format_tag,
    types::{OperationKind, Phase, RequestId},
};

/// One step in a request's lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    /// Collection that owns the request.
    pub collection: Arc<str>,
    /// Operation kind of the request.
    pub kind: OperationKind,
    /// Lifecycle step reached.
    pub phase: Phase,
    /// Request the event belongs to.
    pub request_id: RequestId,
    /// Merged config the request runs with.
    pub config: Arc<OperationConfig>,
    /// Result on success, error on failure, nothing on start.
    pub payload: Option<Value>,
}

impl LifecycleEvent {
    /// Routing tag, e.g. `RDE/users/READ_MANY_SUCCESS`.
    pub fn tag(&self) -> String {
        format_tag(&self.collection, self.kind, self.phase)
    }
}

/// Receives every lifecycle event, in emission order, on the runtime task.
pub trait EventSink: Send {
    /// Called once per event.
    fn emit(&mut self, event: &LifecycleEvent);
}

impl<F> EventSink for F
where
    F: FnMut(&LifecycleEvent) + Send,
{
    fn emit(&mut self, event: &LifecycleEvent) {
        self(event)
    }
}

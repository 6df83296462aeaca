use std::sync::Arc;

use hashbrown::HashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use crate::{
    config::EntityConfig,
    core::{
        cache::{DataCache, Performed},
        collection::EntityCollection,
        ledger::Request,
    },
    op::{OperationConfig, OperationInput, Outcome},
    types::{OperationKind, Phase, RequestId, UnknownKind},
};

use super::{
    events::{EventSink, LifecycleEvent},
    executor::Executor,
};

/// Called once with the outcome of a launched request.
pub type OnComplete = Box<dyn FnOnce(&Outcome) + Send>;

/// Failure talking to an entity runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime task has stopped.
    #[error("entity runtime is no longer running")]
    ChannelClosed,
    /// A kind name did not parse.
    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),
}

/// Queue and buffer sizes of one entity runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Commands that may queue before callers wait.
    pub command_queue_bound: usize,
    /// Lifecycle events kept for lagging subscribers.
    pub event_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 256,
            event_buffer: 1024,
        }
    }
}

/// Cloneable handle to a running entity collection.
#[derive(Clone)]
pub struct EntityHandle {
    name: Arc<str>,
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<LifecycleEvent>,
}

enum Command {
    Perform {
        kind: OperationKind,
        input: OperationInput,
        on_complete: Option<OnComplete>,
        resp: oneshot::Sender<Performed>,
    },
    IsPerforming {
        kind: OperationKind,
        input: Option<OperationInput>,
        resp: oneshot::Sender<bool>,
    },
    LastError {
        kind: OperationKind,
        input: Option<OperationInput>,
        resp: oneshot::Sender<Option<Value>>,
    },
    IsOptimistic {
        key: String,
        resp: oneshot::Sender<bool>,
    },
    Collection {
        resp: oneshot::Sender<Arc<EntityCollection>>,
    },
    Request {
        id: RequestId,
        resp: oneshot::Sender<Option<Request>>,
    },
    Clear {
        resp: oneshot::Sender<()>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

struct Settlement {
    id: RequestId,
    kind: OperationKind,
    config: Arc<OperationConfig>,
    outcome: Outcome,
}

/// Starts the single-writer task for one collection and returns its handle.
///
/// Must be called from within a tokio runtime.
pub fn spawn_entity(
    config: EntityConfig,
    sink: Option<Box<dyn EventSink>>,
    runtime: RuntimeConfig,
) -> EntityHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(runtime.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<LifecycleEvent>(runtime.event_buffer.max(1));
    let (settle_tx, mut settle_rx) = mpsc::unbounded_channel::<Settlement>();

    let name = config.shared_name();
    let mut driver = Driver {
        name: Arc::clone(&name),
        cache: DataCache::new(&config),
        executor: Arc::clone(config.executor()),
        events_tx: events_tx.clone(),
        sink,
        settle_tx,
        pending: HashMap::new(),
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break; };
                    if driver.handle_command(cmd) {
                        break;
                    }
                }
                Some(settled) = settle_rx.recv() => {
                    driver.settle(settled);
                }
            }
        }
        debug!(collection = %driver.name, "entity runtime stopped");
    });

    EntityHandle {
        name,
        cmd_tx,
        events_tx,
    }
}

impl EntityHandle {
    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receives every lifecycle event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events_tx.subscribe()
    }

    /// Runs `kind` unless an equal request is active or cached; in that case
    /// the existing request's id is reported and `on_complete` is dropped
    /// uncalled.
    pub async fn perform(
        &self,
        kind: OperationKind,
        input: OperationInput,
        on_complete: Option<OnComplete>,
    ) -> Result<Performed, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Perform {
                kind,
                input,
                on_complete,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// [`perform`](Self::perform) with the kind given by its wire name.
    pub async fn perform_named(
        &self,
        kind: &str,
        input: OperationInput,
        on_complete: Option<OnComplete>,
    ) -> Result<Performed, RuntimeError> {
        let kind = kind.parse::<OperationKind>()?;
        self.perform(kind, input, on_complete).await
    }

    /// Performs and, if a request was launched, waits for its outcome.
    ///
    /// The outcome is `None` when nothing was launched, or when the request
    /// was evicted from the ledger (or cleared) before it settled.
    pub async fn perform_settled(
        &self,
        kind: OperationKind,
        input: OperationInput,
    ) -> Result<(Performed, Option<Outcome>), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        let on_complete: OnComplete = Box::new(move |outcome: &Outcome| {
            let _ = tx.send(outcome.clone());
        });
        let performed = self.perform(kind, input, Some(on_complete)).await?;
        if !performed.launched() {
            return Ok((performed, None));
        }
        Ok((performed, rx.await.ok()))
    }

    /// See [`DataCache::is_performing`].
    pub async fn is_performing(
        &self,
        kind: OperationKind,
        input: Option<OperationInput>,
    ) -> Result<bool, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::IsPerforming {
                kind,
                input,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// See [`DataCache::last_error`].
    pub async fn last_error(
        &self,
        kind: OperationKind,
        input: Option<OperationInput>,
    ) -> Result<Option<Value>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::LastError {
                kind,
                input,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// See [`DataCache::is_optimistic`].
    pub async fn is_optimistic(&self, key: impl Into<String>) -> Result<bool, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::IsOptimistic {
                key: key.into(),
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Current materialized collection.
    pub async fn collection(&self) -> Result<Arc<EntityCollection>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Collection { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Request `id`, while the ledger retains it.
    pub async fn request(&self, id: RequestId) -> Result<Option<Request>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Request { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Forgets every request and pending callback.
    pub async fn clear(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Clear { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Stops the runtime task; later calls fail with `ChannelClosed`.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

struct Driver {
    name: Arc<str>,
    cache: DataCache,
    executor: Arc<dyn Executor>,
    events_tx: broadcast::Sender<LifecycleEvent>,
    sink: Option<Box<dyn EventSink>>,
    settle_tx: mpsc::UnboundedSender<Settlement>,
    pending: HashMap<RequestId, OnComplete>,
}

impl Driver {
    /// Returns true when the loop should stop.
    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Perform {
                kind,
                input,
                on_complete,
                resp,
            } => {
                let performed = self.cache.begin(kind, input);
                if let Performed::Launched(id) = performed {
                    self.forget_evicted();
                    self.launch(kind, id, on_complete);
                }
                let _ = resp.send(performed);
            }
            Command::IsPerforming { kind, input, resp } => {
                let _ = resp.send(self.cache.is_performing(kind, input));
            }
            Command::LastError { kind, input, resp } => {
                let _ = resp.send(self.cache.last_error(kind, input));
            }
            Command::IsOptimistic { key, resp } => {
                let _ = resp.send(self.cache.is_optimistic(&key));
            }
            Command::Collection { resp } => {
                let _ = resp.send(self.cache.collection());
            }
            Command::Request { id, resp } => {
                let _ = resp.send(self.cache.request(id).cloned());
            }
            Command::Clear { resp } => {
                self.cache.clear();
                self.pending.clear();
                let _ = resp.send(());
            }
            Command::Shutdown { resp } => {
                let _ = resp.send(());
                return true;
            }
        }

        false
    }

    fn launch(&mut self, kind: OperationKind, id: RequestId, on_complete: Option<OnComplete>) {
        let Some(config) = self.cache.request(id).map(|r| Arc::clone(&r.config)) else {
            return;
        };
        self.emit(LifecycleEvent {
            collection: Arc::clone(&self.name),
            kind,
            phase: Phase::Start,
            request_id: id,
            config: Arc::clone(&config),
            payload: None,
        });
        if let Some(on_complete) = on_complete {
            self.pending.insert(id, on_complete);
        }

        match self.executor.process(kind, &config) {
            None => self.settle(Settlement {
                id,
                kind,
                config,
                outcome: Outcome::Success(Value::Null),
            }),
            Some(fut) => {
                let settle_tx = self.settle_tx.clone();
                tokio::spawn(async move {
                    let outcome = Outcome::from(fut.await);
                    let _ = settle_tx.send(Settlement {
                        id,
                        kind,
                        config,
                        outcome,
                    });
                });
            }
        }
    }

    fn settle(&mut self, settled: Settlement) {
        let Settlement {
            id,
            kind,
            config,
            outcome,
        } = settled;
        self.cache.finish(id, outcome.clone());

        let (phase, payload) = match &outcome {
            Outcome::Success(result) => (Phase::Success, result.clone()),
            Outcome::Failure(error) => (Phase::Fail, error.clone()),
        };
        self.emit(LifecycleEvent {
            collection: Arc::clone(&self.name),
            kind,
            phase,
            request_id: id,
            config,
            payload: Some(payload),
        });

        if let Some(on_complete) = self.pending.remove(&id) {
            on_complete(&outcome);
        }
    }

    /// Drops callbacks of requests the ledger no longer retains. Their
    /// settlements are ignored anyway, and an executor that never settles
    /// must not pin them.
    fn forget_evicted(&mut self) {
        let cache = &self.cache;
        let before = self.pending.len();
        self.pending.retain(|id, _| cache.request(*id).is_some());
        let dropped = before - self.pending.len();
        if dropped > 0 {
            debug!(collection = %self.name, dropped, "dropped callbacks of evicted requests");
        }
    }

    fn emit(&mut self, event: LifecycleEvent) {
        if let Some(sink) = self.sink.as_mut() {
            sink.emit(&event);
        }
        let _ = self.events_tx.send(event);
    }
}

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::{
    clock::Clock,
    config::EntityConfig,
    engine::view::ViewBuilder,
    key::KeyStrategy,
    op::{OperationConfig, OperationInput, Outcome},
    types::{OperationKind, RequestId},
};

use super::{
    collection::EntityCollection,
    gate::{Admission, CacheGate},
    ledger::{Request, RequestLedger},
};

/// What `perform` did with a requested operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Performed {
    /// A new request was admitted.
    Launched(RequestId),
    /// An equal request was already active.
    Joined(RequestId),
    /// An equal request succeeded within the validity window.
    Cached(RequestId),
}

impl Performed {
    /// Id of the launched, joined or cached request.
    pub fn request_id(self) -> RequestId {
        match self {
            Self::Launched(id) | Self::Joined(id) | Self::Cached(id) => id,
        }
    }

    /// True for [`Performed::Launched`].
    pub fn launched(self) -> bool {
        matches!(self, Self::Launched(_))
    }
}

/// Synchronous state of one entity collection: ledger, gate and view.
///
/// All mutation goes through `&mut self`; the async runtime owns one
/// instance per collection and is its only writer.
pub struct DataCache {
    name: Arc<str>,
    keys: KeyStrategy,
    defaults: OperationConfig,
    seed: EntityCollection,
    gate: CacheGate,
    ledger: RequestLedger,
    view: ViewBuilder,
    clock: Arc<dyn Clock>,
}

impl DataCache {
    /// Empty ledger over the config's seed entities.
    pub fn new(config: &EntityConfig) -> Self {
        let keys = config.keys().clone();
        let seed = config
            .reducer_default()
            .iter()
            .map(|item| (keys.key_for(item), item.clone()))
            .collect();

        Self {
            name: config.shared_name(),
            keys,
            defaults: config.action_defaults().clone(),
            seed,
            gate: CacheGate::new(config.cache_validity().clone()),
            ledger: RequestLedger::new(config.cache_requests_count()),
            view: ViewBuilder::new(),
            clock: Arc::clone(config.clock()),
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying request ledger.
    pub fn ledger(&self) -> &RequestLedger {
        &self.ledger
    }

    /// Merges `input` over the action defaults.
    pub fn resolve_config(&self, input: OperationInput) -> OperationConfig {
        self.defaults.merged(input)
    }

    /// Gates `kind` + `input` and admits a new request when nothing equal is
    /// active or cached.
    pub fn begin(&mut self, kind: OperationKind, input: OperationInput) -> Performed {
        let config = self.resolve_config(input);
        let now = self.clock.now_ms();
        match self.gate.check(&self.ledger, kind, &config, now) {
            Admission::Join(id) => {
                debug!(collection = %self.name, %kind, request_id = id, "joining active request");
                Performed::Joined(id)
            }
            Admission::Cached(id) => {
                debug!(collection = %self.name, %kind, request_id = id, "reusing cached request");
                Performed::Cached(id)
            }
            Admission::Admit => {
                let id = self.ledger.admit(kind, Arc::new(config), now).id;
                debug!(collection = %self.name, %kind, request_id = id, "admitted request");
                Performed::Launched(id)
            }
        }
    }

    /// Records how request `id` ended. Returns `false` when the request is no
    /// longer retained or already finished.
    pub fn finish(&mut self, id: RequestId, outcome: Outcome) -> bool {
        let now = self.clock.now_ms();
        let failed = outcome.is_failure();
        match self.ledger.resolve(id, outcome, now) {
            Some(request) => {
                debug!(
                    collection = %self.name,
                    kind = %request.kind,
                    request_id = id,
                    failed,
                    "request finished"
                );
                true
            }
            None => {
                debug!(collection = %self.name, request_id = id, "ignoring settlement of evicted request");
                false
            }
        }
    }

    /// Request `id`, while the ledger retains it.
    pub fn request(&self, id: RequestId) -> Option<&Request> {
        self.ledger.get(id)
    }

    /// Current materialized collection; rebuilt only when the ledger changed.
    pub fn collection(&mut self) -> Arc<EntityCollection> {
        self.view.build(&self.ledger, &self.seed, &self.keys)
    }

    /// True if a request of `kind` is active, optionally restricted to one
    /// whose merged config equals `input`'s.
    pub fn is_performing(&self, kind: OperationKind, input: Option<OperationInput>) -> bool {
        let config = input.map(|input| self.resolve_config(input));
        self.ledger
            .find(kind, |r| {
                r.is_active() && config.as_ref().is_none_or(|cfg| *r.config == *cfg)
            })
            .is_some()
    }

    /// Error of the latest finished request of `kind` (with an equal config,
    /// if `input` is given), or `None` when that request succeeded.
    pub fn last_error(&self, kind: OperationKind, input: Option<OperationInput>) -> Option<Value> {
        let config = input.map(|input| self.resolve_config(input));
        self.ledger
            .requests(kind)
            .filter(|r| config.as_ref().is_none_or(|cfg| *r.config == *cfg))
            .filter(|r| r.finished_at().is_some())
            .max_by_key(|r| r.finish_order())
            .and_then(|r| r.error().cloned())
    }

    /// True if `key` is currently shown only because of a pending optimistic
    /// create.
    pub fn is_optimistic(&mut self, key: &str) -> bool {
        self.collection();
        self.view.is_optimistic(key)
    }

    /// Forgets every request; the seed entities stay.
    pub fn clear(&mut self) {
        debug!(collection = %self.name, "clearing request ledger");
        self.ledger.clear();
        self.view.invalidate();
    }
}

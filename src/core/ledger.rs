use std::{
    collections::VecDeque,
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use hashbrown::HashMap;
use serde_json::Value;

use crate::{
    op::{OperationConfig, Outcome},
    types::{OperationKind, RequestId, TimestampMs},
};

static NEXT_LEDGER_UID: AtomicU64 = AtomicU64::new(1);

/// Status of a request without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    /// Not settled yet.
    Active,
    /// Settled with a result.
    Succeeded,
    /// Settled with an error.
    Failed,
}

/// Lifecycle position of a request. Finished variants carry their finish
/// time and exactly one of result or error.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestStatus {
    /// Not settled yet.
    Active,
    /// Settled with a result.
    Succeeded {
        /// Settlement time.
        finished_at: TimestampMs,
        /// Executor payload.
        result: Value,
    },
    /// Settled with an error.
    Failed {
        /// Settlement time.
        finished_at: TimestampMs,
        /// Executor error.
        error: Value,
    },
}

/// One fetch or mutation issued against a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Ledger-assigned id, increasing in admission order.
    pub id: RequestId,
    /// Operation kind.
    pub kind: OperationKind,
    /// Merged config the request was admitted with.
    pub config: Arc<OperationConfig>,
    /// Admission time.
    pub started_at: TimestampMs,
    /// Lifecycle position.
    pub status: RequestStatus,
}

impl Request {
    /// Status without payload.
    pub fn state(&self) -> RequestState {
        match self.status {
            RequestStatus::Active => RequestState::Active,
            RequestStatus::Succeeded { .. } => RequestState::Succeeded,
            RequestStatus::Failed { .. } => RequestState::Failed,
        }
    }

    /// True until the request settles.
    pub fn is_active(&self) -> bool {
        matches!(self.status, RequestStatus::Active)
    }

    /// Settlement time of a finished request.
    pub fn finished_at(&self) -> Option<TimestampMs> {
        match self.status {
            RequestStatus::Active => None,
            RequestStatus::Succeeded { finished_at, .. }
            | RequestStatus::Failed { finished_at, .. } => Some(finished_at),
        }
    }

    /// Payload of a successful request.
    pub fn result(&self) -> Option<&Value> {
        match &self.status {
            RequestStatus::Succeeded { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Error of a failed request.
    pub fn error(&self) -> Option<&Value> {
        match &self.status {
            RequestStatus::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Chronological sort key for finished requests; ids break finish-time ties.
    pub fn finish_order(&self) -> Option<(TimestampMs, RequestId)> {
        self.finished_at().map(|t| (t, self.id))
    }
}

/// Bounded per-kind history of requests for one entity collection.
///
/// Each kind keeps at most `capacity` requests in start order; the oldest are
/// dropped first. `uid` and `revision` together identify the ledger's content
/// for memoized consumers.
#[derive(Debug)]
pub struct RequestLedger {
    uid: u64,
    revision: u64,
    capacity: NonZeroUsize,
    next_id: RequestId,
    requests: HashMap<OperationKind, VecDeque<Request>>,
    index: HashMap<RequestId, OperationKind>,
}

impl RequestLedger {
    /// Empty ledger keeping `capacity` requests per kind.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            uid: NEXT_LEDGER_UID.fetch_add(1, Ordering::Relaxed),
            revision: 0,
            capacity,
            next_id: 1,
            requests: HashMap::new(),
            index: HashMap::new(),
        }
    }

    /// Process-unique identity of this ledger.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Bumped on every admit, resolve and clear.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Requests kept per kind.
    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Records a new active request and trims its kind's history.
    pub fn admit(
        &mut self,
        kind: OperationKind,
        config: Arc<OperationConfig>,
        now: TimestampMs,
    ) -> &Request {
        let id = self.take_next_id();
        self.requests.entry(kind).or_default().push_back(Request {
            id,
            kind,
            config,
            started_at: now,
            status: RequestStatus::Active,
        });
        self.index.insert(id, kind);
        self.trim(kind);
        self.revision += 1;

        // capacity >= 1, so the request just pushed survives trimming
        let queue = &self.requests[&kind];
        &queue[queue.len() - 1]
    }

    /// Finishes request `id`. Requests that were already evicted or already
    /// finished are left alone and `None` is returned.
    pub fn resolve(&mut self, id: RequestId, outcome: Outcome, now: TimestampMs) -> Option<&Request> {
        let kind = *self.index.get(&id)?;
        let queue = self.requests.get_mut(&kind)?;
        let idx = queue.iter().position(|r| r.id == id)?;
        if !queue[idx].is_active() {
            return None;
        }

        queue[idx].status = match outcome {
            Outcome::Success(result) => RequestStatus::Succeeded {
                finished_at: now,
                result,
            },
            Outcome::Failure(error) => RequestStatus::Failed {
                finished_at: now,
                error,
            },
        };
        self.revision += 1;
        self.get(id)
    }

    /// Most recently started request of `kind` matching `pred`.
    pub fn find<P>(&self, kind: OperationKind, mut pred: P) -> Option<&Request>
    where
        P: FnMut(&Request) -> bool,
    {
        self.requests
            .get(&kind)?
            .iter()
            .rev()
            .find(|r| pred(*r))
    }

    /// Retained request `id`.
    pub fn get(&self, id: RequestId) -> Option<&Request> {
        let kind = self.index.get(&id)?;
        self.requests.get(kind)?.iter().find(|r| r.id == id)
    }

    /// Requests of `kind` in start order.
    pub fn requests(&self, kind: OperationKind) -> impl DoubleEndedIterator<Item = &Request> {
        self.requests.get(&kind).into_iter().flatten()
    }

    /// All requests, grouped by kind in [`OperationKind::ALL`] order, each
    /// group in start order.
    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        OperationKind::ALL
            .into_iter()
            .flat_map(move |kind| self.requests(kind))
    }

    /// Number of retained requests across all kinds.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if no request is retained.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Drops every stored request. Ids keep increasing.
    pub fn clear(&mut self) {
        self.requests.clear();
        self.index.clear();
        self.revision += 1;
    }

    fn trim(&mut self, kind: OperationKind) {
        let Some(queue) = self.requests.get_mut(&kind) else {
            return;
        };
        while queue.len() > self.capacity.get() {
            if let Some(evicted) = queue.pop_front() {
                self.index.remove(&evicted.id);
            }
        }
    }

    fn take_next_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

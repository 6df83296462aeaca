use crate::{
    config::CacheValidity,
    op::OperationConfig,
    types::{OperationKind, RequestId, TimestampMs},
};

use super::ledger::{RequestLedger, RequestStatus};

/// Outcome of asking whether a requested operation should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Launch a new request.
    Admit,
    /// An equal request is still active; observe that one instead.
    Join(RequestId),
    /// An equal request succeeded recently enough to be reused.
    Cached(RequestId),
}

/// Request coalescing plus time-based caching, backed by the ledger itself.
#[derive(Debug, Clone, Default)]
pub struct CacheGate {
    validity: CacheValidity,
}

impl CacheGate {
    /// Gate with the given validity windows.
    pub fn new(validity: CacheValidity) -> Self {
        Self { validity }
    }

    /// Validity windows in use.
    pub fn validity(&self) -> &CacheValidity {
        &self.validity
    }

    /// Decides how `kind` with `config` should be served at `now`.
    pub fn check(
        &self,
        ledger: &RequestLedger,
        kind: OperationKind,
        config: &OperationConfig,
        now: TimestampMs,
    ) -> Admission {
        if config.force {
            return Admission::Admit;
        }

        if let Some(active) = ledger.find(kind, |r| r.is_active() && *r.config == *config) {
            return Admission::Join(active.id);
        }

        let fresh = ledger.find(kind, |r| match r.status {
            RequestStatus::Succeeded { finished_at, .. } => {
                *r.config == *config && self.validity.is_fresh(kind, finished_at, now)
            }
            _ => false,
        });
        match fresh {
            Some(cached) => Admission::Cached(cached.id),
            None => Admission::Admit,
        }
    }

    /// True when [`check`](Self::check) admits.
    pub fn should_admit(
        &self,
        ledger: &RequestLedger,
        kind: OperationKind,
        config: &OperationConfig,
        now: TimestampMs,
    ) -> bool {
        self.check(ledger, kind, config, now) == Admission::Admit
    }
}

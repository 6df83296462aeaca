use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use serde_json::Value;
use tracing::{trace, warn};

use crate::{
    core::{
        collection::EntityCollection,
        ledger::{Request, RequestLedger, RequestStatus},
    },
    key::KeyStrategy,
    op::{OperationConfig, normalize},
    types::{EntityKey, RequestId, Verb},
};

use super::merge::merge_deep;

#[derive(Debug)]
struct Memo {
    ledger_uid: u64,
    revision: u64,
    view: Arc<EntityCollection>,
}

/// Materializes the entity collection from a ledger: confirmed history first,
/// in finish order, then the overlay of active optimistic requests.
///
/// The last result is memoized against the ledger's uid and revision, so
/// asking again without an intervening ledger change returns the same `Arc`.
#[derive(Debug, Default)]
pub struct ViewBuilder {
    memo: Option<Memo>,
    generated: HashMap<(RequestId, usize), EntityKey>,
    optimistic_keys: HashSet<EntityKey>,
}

impl ViewBuilder {
    /// Builder with nothing memoized.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current view of `ledger` over `seed`.
    pub fn build(
        &mut self,
        ledger: &RequestLedger,
        seed: &EntityCollection,
        keys: &KeyStrategy,
    ) -> Arc<EntityCollection> {
        if let Some(memo) = &self.memo {
            if memo.ledger_uid == ledger.uid() && memo.revision == ledger.revision() {
                return Arc::clone(&memo.view);
            }
        }
        trace!(
            ledger_uid = ledger.uid(),
            revision = ledger.revision(),
            requests = ledger.len(),
            "rebuilding entity view"
        );

        let mut view = seed.clone();

        let mut confirmed: Vec<&Request> = ledger
            .iter()
            .filter(|r| matches!(r.status, RequestStatus::Succeeded { .. }))
            .collect();
        confirmed.sort_by_key(|r| r.finish_order());
        for request in confirmed {
            fold_confirmed(&mut view, request, keys);
        }

        self.generated
            .retain(|(id, _), _| ledger.get(*id).is_some_and(Request::is_active));
        self.optimistic_keys.clear();
        for request in ledger.iter().filter(|r| r.is_active() && r.config.optimistic) {
            self.overlay(&mut view, request, keys);
        }

        let view = Arc::new(view);
        self.memo = Some(Memo {
            ledger_uid: ledger.uid(),
            revision: ledger.revision(),
            view: Arc::clone(&view),
        });
        view
    }

    /// True if `key` was placed in the last built view by a pending
    /// optimistic create.
    pub fn is_optimistic(&self, key: &str) -> bool {
        self.optimistic_keys.contains(key)
    }

    /// Forgets the memoized view and generated keys.
    pub fn invalidate(&mut self) {
        self.memo = None;
        self.generated.clear();
        self.optimistic_keys.clear();
    }

    fn overlay(&mut self, view: &mut EntityCollection, request: &Request, keys: &KeyStrategy) {
        let config = &request.config;
        let items = normalize(&config.data, request.kind.is_single());
        match request.kind.verb() {
            Verb::Create => {
                for (idx, item) in items.iter().enumerate() {
                    let key = match keys.extract(item) {
                        Some(key) => key,
                        None => self
                            .generated
                            .entry((request.id, idx))
                            .or_insert_with(|| keys.generate(item))
                            .clone(),
                    };
                    self.optimistic_keys.insert(key.clone());
                    view.upsert(key, item.clone());
                }
            }
            Verb::Update => {
                for (idx, item) in items.iter().enumerate() {
                    let Some(key) = target_key(config, idx, item, keys) else {
                        continue;
                    };
                    if let Some(existing) = view.get_mut(&key) {
                        merge_deep(existing, item);
                    }
                }
            }
            Verb::Delete => remove_keys(view, config),
            Verb::Read => {}
        }
    }
}

fn fold_confirmed(view: &mut EntityCollection, request: &Request, keys: &KeyStrategy) {
    let Some(result) = request.result() else {
        return;
    };
    let items = normalize(result, request.kind.is_single());
    match request.kind.verb() {
        Verb::Create | Verb::Read => {
            for item in items {
                match keys.extract(item) {
                    Some(key) => view.upsert(key, item.clone()),
                    None => warn!(
                        request_id = request.id,
                        kind = %request.kind,
                        "skipping confirmed entity without a key"
                    ),
                }
            }
        }
        Verb::Update => {
            for (idx, item) in items.iter().enumerate() {
                let Some(key) = target_key(&request.config, idx, item, keys) else {
                    warn!(
                        request_id = request.id,
                        kind = %request.kind,
                        "skipping confirmed update without a target key"
                    );
                    continue;
                };
                match view.get_mut(&key) {
                    Some(existing) => merge_deep(existing, item),
                    None => view.upsert(key, item.clone()),
                }
            }
        }
        Verb::Delete => remove_keys(view, &request.config),
    }
}

fn target_key(
    config: &OperationConfig,
    idx: usize,
    item: &Value,
    keys: &KeyStrategy,
) -> Option<EntityKey> {
    config.keys.get(idx).cloned().or_else(|| keys.extract(item))
}

fn remove_keys(view: &mut EntityCollection, config: &OperationConfig) {
    for key in &config.keys {
        view.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use serde_json::json;

    use super::*;
    use crate::{
        op::{OperationInput, Outcome},
        types::OperationKind,
    };

    fn ledger() -> RequestLedger {
        RequestLedger::new(NonZeroUsize::new(3).unwrap())
    }

    fn admit(l: &mut RequestLedger, kind: OperationKind, input: OperationInput, now: u64) -> RequestId {
        l.admit(kind, Arc::new(OperationConfig::default().merged(input)), now).id
    }

    #[test]
    fn read_then_update_merges_by_config_key() {
        let mut l = ledger();
        let a = admit(&mut l, OperationKind::ReadMany, OperationInput::new(), 0);
        let b = admit(&mut l, OperationKind::UpdateOne, OperationInput::new().keys(["1"]), 0);
        l.resolve(a, Outcome::Success(json!([{"id": 1, "name": "x"}])), 10);
        l.resolve(b, Outcome::Success(json!({"name": "y"})), 20);

        let view = ViewBuilder::new().build(&l, &EntityCollection::new(), &KeyStrategy::default());
        assert_eq!(serde_json::to_value(&*view).unwrap(), json!({"1": {"id": 1, "name": "y"}}));
    }

    #[test]
    fn fold_follows_finish_time_not_start_order() {
        let mut l = ledger();
        let first = admit(&mut l, OperationKind::ReadOne, OperationInput::new(), 0);
        let second = admit(&mut l, OperationKind::ReadMany, OperationInput::new(), 1);
        l.resolve(second, Outcome::Success(json!([{"id": "a", "v": 2}])), 5);
        l.resolve(first, Outcome::Success(json!({"id": "a", "v": 1})), 9);

        let view = ViewBuilder::new().build(&l, &EntityCollection::new(), &KeyStrategy::default());
        assert_eq!(view.get("a"), Some(&json!({"id": "a", "v": 1})));
    }

    #[test]
    fn equal_finish_times_fall_back_to_id_order() {
        let mut l = ledger();
        let first = admit(&mut l, OperationKind::ReadOne, OperationInput::new(), 0);
        let second = admit(&mut l, OperationKind::ReadOne, OperationInput::new().params(json!(2)), 0);
        l.resolve(second, Outcome::Success(json!({"id": "a", "v": 2})), 7);
        l.resolve(first, Outcome::Success(json!({"id": "a", "v": 1})), 7);

        let view = ViewBuilder::new().build(&l, &EntityCollection::new(), &KeyStrategy::default());
        assert_eq!(view.get("a"), Some(&json!({"id": "a", "v": 2})));
    }

    #[test]
    fn failed_delete_removes_nothing_and_missing_keys_are_ignored() {
        let mut l = ledger();
        let read = admit(&mut l, OperationKind::ReadMany, OperationInput::new(), 0);
        let failed = admit(&mut l, OperationKind::DeleteOne, OperationInput::new().keys(["1"]), 0);
        let missing = admit(&mut l, OperationKind::DeleteMany, OperationInput::new().keys(["9"]), 0);
        l.resolve(read, Outcome::Success(json!([{"id": 1}, {"id": 2}])), 1);
        l.resolve(failed, Outcome::Failure(json!("denied")), 2);
        l.resolve(missing, Outcome::Success(Value::Null), 3);

        let view = ViewBuilder::new().build(&l, &EntityCollection::new(), &KeyStrategy::default());
        assert_eq!(view.keys().collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[test]
    fn optimistic_overlay_applies_while_active_only() {
        let keys = KeyStrategy::default().with_generator(|_| "tmp-1".to_string());
        let mut l = ledger();
        let mut builder = ViewBuilder::new();
        let read = admit(&mut l, OperationKind::ReadMany, OperationInput::new(), 0);
        l.resolve(read, Outcome::Success(json!([{"id": 1, "name": "a", "meta": {"x": 1}}, {"id": 2}])), 1);

        let create = admit(
            &mut l,
            OperationKind::CreateOne,
            OperationInput::new().optimistic(true).data(json!({"name": "new"})),
            2,
        );
        admit(
            &mut l,
            OperationKind::UpdateMany,
            OperationInput::new()
                .optimistic(true)
                .keys(["1", "404"])
                .data(json!([{"meta": {"y": 2}}, {"name": "ghost"}])),
            2,
        );
        admit(&mut l, OperationKind::DeleteOne, OperationInput::new().optimistic(true).keys(["2"]), 2);
        admit(&mut l, OperationKind::CreateOne, OperationInput::new().data(json!({"id": 5})), 2);

        let view = builder.build(&l, &EntityCollection::new(), &keys);
        assert_eq!(view.keys().collect::<Vec<_>>(), vec!["1", "tmp-1"]);
        assert_eq!(view.get("1"), Some(&json!({"id": 1, "name": "a", "meta": {"x": 1, "y": 2}})));
        assert!(builder.is_optimistic("tmp-1"));
        assert!(!builder.is_optimistic("1"));

        l.resolve(create, Outcome::Failure(json!("rejected")), 3);
        let view = builder.build(&l, &EntityCollection::new(), &keys);
        assert!(!view.contains_key("tmp-1"));
        assert!(!builder.is_optimistic("tmp-1"));
    }

    #[test]
    fn failed_optimistic_edits_fall_back_to_confirmed_state() {
        let mut l = ledger();
        let mut builder = ViewBuilder::new();
        let read = admit(&mut l, OperationKind::ReadMany, OperationInput::new(), 0);
        l.resolve(read, Outcome::Success(json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])), 1);

        let delete = admit(&mut l, OperationKind::DeleteOne, OperationInput::new().optimistic(true).keys(["1"]), 2);
        let update = admit(
            &mut l,
            OperationKind::UpdateOne,
            OperationInput::new().optimistic(true).keys(["2"]).data(json!({"name": "edited"})),
            2,
        );

        let pending = builder.build(&l, &EntityCollection::new(), &KeyStrategy::default());
        assert!(!pending.contains_key("1"));
        assert_eq!(pending.get("2"), Some(&json!({"id": 2, "name": "edited"})));

        l.resolve(delete, Outcome::Failure(json!("locked")), 3);
        let view = builder.build(&l, &EntityCollection::new(), &KeyStrategy::default());
        assert_eq!(view.get("1"), Some(&json!({"id": 1, "name": "a"})));
        assert_eq!(view.get("2"), Some(&json!({"id": 2, "name": "edited"})));

        l.resolve(update, Outcome::Failure(json!("conflict")), 4);
        let view = builder.build(&l, &EntityCollection::new(), &KeyStrategy::default());
        assert_eq!(view.keys().collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(view.get("2"), Some(&json!({"id": 2, "name": "b"})));
    }

    #[test]
    fn generated_keys_are_stable_across_rebuilds() {
        let mut l = ledger();
        let mut builder = ViewBuilder::new();
        admit(
            &mut l,
            OperationKind::CreateMany,
            OperationInput::new().optimistic(true).data(json!([{"n": 1}, {"n": 2}])),
            0,
        );
        let before: Vec<String> = builder
            .build(&l, &EntityCollection::new(), &KeyStrategy::default())
            .keys()
            .map(str::to_string)
            .collect();
        admit(&mut l, OperationKind::ReadOne, OperationInput::new(), 1);
        let after: Vec<String> = builder
            .build(&l, &EntityCollection::new(), &KeyStrategy::default())
            .keys()
            .map(str::to_string)
            .collect();
        assert_eq!(before.len(), 2);
        assert_eq!(before, after);
    }

    #[test]
    fn memoizes_until_ledger_changes() {
        let mut l = ledger();
        let mut builder = ViewBuilder::new();
        let seed: EntityCollection = [("s".to_string(), json!({"id": "s"}))].into_iter().collect();
        let first = builder.build(&l, &seed, &KeyStrategy::default());
        let again = builder.build(&l, &seed, &KeyStrategy::default());
        assert!(Arc::ptr_eq(&first, &again));

        admit(&mut l, OperationKind::ReadOne, OperationInput::new(), 0);
        let changed = builder.build(&l, &seed, &KeyStrategy::default());
        assert!(!Arc::ptr_eq(&first, &changed));
        assert_eq!(*first, *changed);

        let other = ledger();
        let fresh = builder.build(&other, &seed, &KeyStrategy::default());
        assert!(!Arc::ptr_eq(&changed, &fresh));
    }
}

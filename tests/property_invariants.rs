use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::{Value, json};

use entity_cache::{
    clock::ManualClock,
    config::{CacheValidity, EntityConfig},
    core::{
        cache::{DataCache, Performed},
        collection::EntityCollection,
    },
    engine::{merge::merge_deep, view::ViewBuilder},
    key::KeyStrategy,
    op::{OperationInput, Outcome},
    runtime::executor::NoopExecutor,
    types::{OperationKind, RequestId},
};

const CAPACITY: usize = 2;

#[derive(Debug, Clone)]
enum Action {
    Begin {
        kind_idx: u8,
        key: u8,
        optimistic: bool,
        force: bool,
    },
    Finish {
        target: u8,
        ok: bool,
        key: u8,
        value: u8,
    },
    Tick {
        ms: u16,
    },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0u8..8, 0u8..6, any::<bool>(), any::<bool>()).prop_map(
            |(kind_idx, key, optimistic, force)| Action::Begin {
                kind_idx,
                key,
                optimistic,
                force,
            }
        ),
        (any::<u8>(), any::<bool>(), 0u8..6, any::<u8>()).prop_map(|(target, ok, key, value)| {
            Action::Finish {
                target,
                ok,
                key,
                value,
            }
        }),
        (0u16..200).prop_map(|ms| Action::Tick { ms }),
    ]
}

fn seed_items() -> Vec<Value> {
    vec![json!({"id": 0, "v": 0})]
}

fn new_cache(clock: &ManualClock) -> DataCache {
    let config = EntityConfig::builder("items")
        .executor(NoopExecutor)
        .clock(clock.clone())
        .cache_requests_count(CAPACITY)
        .cache_validity(CacheValidity::Uniform(50))
        .reducer_default(seed_items())
        .build()
        .expect("config");
    DataCache::new(&config)
}

fn input_for(kind: OperationKind, key: u8, optimistic: bool, force: bool) -> OperationInput {
    let item = json!({"id": key, "v": key});
    let data = if kind.is_single() { item } else { json!([item]) };
    OperationInput::new()
        .optimistic(optimistic)
        .force(force)
        .keys([key.to_string()])
        .data(data)
}

fn payload_for(kind: OperationKind, key: u8, value: u8) -> Value {
    let item = json!({"id": key, "v": value});
    if kind.is_single() { item } else { json!([item]) }
}

fn check_invariants(cache: &mut DataCache, known: &BTreeSet<String>) -> Result<(), TestCaseError> {
    for kind in OperationKind::ALL {
        let ids: Vec<RequestId> = cache.ledger().requests(kind).map(|r| r.id).collect();
        prop_assert!(ids.len() <= CAPACITY);
        prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for request in cache.ledger().requests(kind) {
            if let Some(finished_at) = request.finished_at() {
                prop_assert!(finished_at >= request.started_at);
            }
            prop_assert!(!(request.result().is_some() && request.error().is_some()));
        }
    }

    let view = cache.collection();
    let seed: EntityCollection = seed_items()
        .into_iter()
        .map(|item| ("0".to_string(), item))
        .collect();
    let fresh = ViewBuilder::new().build(cache.ledger(), &seed, &KeyStrategy::default());
    prop_assert_eq!(&*view, &*fresh);

    for key in view.keys() {
        prop_assert!(known.contains(key), "unexpected key {key}");
    }
    Ok(())
}

proptest! {
    #[test]
    fn random_request_sequences_keep_ledger_bounded_and_view_consistent(
        actions in prop::collection::vec(action_strategy(), 1..120)
    ) {
        let clock = ManualClock::new(1_000);
        let mut cache = new_cache(&clock);
        let mut launched = Vec::<(RequestId, OperationKind)>::new();
        let mut known = BTreeSet::from(["0".to_string()]);

        for action in actions {
            match action {
                Action::Begin { kind_idx, key, optimistic, force } => {
                    let kind = OperationKind::ALL[usize::from(kind_idx)];
                    let performed = cache.begin(kind, input_for(kind, key, optimistic, force));
                    if let Performed::Launched(id) = performed {
                        launched.push((id, kind));
                    }
                    known.insert(key.to_string());
                }
                Action::Finish { target, ok, key, value } => {
                    if launched.is_empty() {
                        continue;
                    }
                    let (id, kind) = launched[usize::from(target) % launched.len()];
                    let outcome = if ok {
                        Outcome::Success(payload_for(kind, key, value))
                    } else {
                        Outcome::Failure(json!({"status": 500}))
                    };
                    let was_active = cache.request(id).is_some_and(|r| r.is_active());
                    prop_assert_eq!(cache.finish(id, outcome), was_active);
                    known.insert(key.to_string());
                }
                Action::Tick { ms } => clock.advance(u64::from(ms)),
            }
            check_invariants(&mut cache, &known)?;
        }
    }

    #[test]
    fn failed_requests_never_change_the_view(
        keys in prop::collection::vec(0u8..6, 1..20)
    ) {
        let clock = ManualClock::new(0);
        let mut cache = new_cache(&clock);
        let before = cache.collection();

        for key in keys {
            for kind in OperationKind::ALL {
                let performed = cache.begin(kind, input_for(kind, key, false, true));
                clock.advance(1);
                cache.finish(performed.request_id(), Outcome::Failure(json!("nope")));
            }
        }

        prop_assert_eq!(&*cache.collection(), &*before);
    }

    #[test]
    fn object_patches_are_idempotent(
        base in prop::collection::btree_map("[a-d]", 0i32..4, 0..4),
        nested in prop::collection::btree_map("[a-d]", 0i32..4, 0..4),
        top in prop::collection::btree_map("[a-d]", 0i32..4, 0..4),
    ) {
        let mut target = json!({"inner": base.clone(), "flat": base});
        let patch = json!({"inner": nested, "extra": top});

        merge_deep(&mut target, &patch);
        let once = target.clone();
        merge_deep(&mut target, &patch);
        prop_assert_eq!(target, once);
    }
}

//! Integration tests for the worker registry.

use std::collections::HashMap;
use std::sync::Arc;

use brigade::channel::MemoryChannel;
use brigade::registry::{Worker, WorkerRegistry};

fn worker(identity: &str, capabilities: &[&str]) -> Worker {
    Worker::new(
        identity,
        capabilities.iter().map(|c| c.to_string()).collect(),
        Arc::new(MemoryChannel::closed()),
    )
}

fn caps(capabilities: &[&str]) -> Vec<String> {
    capabilities.iter().map(|c| c.to_string()).collect()
}

fn identities(workers: &[Worker]) -> Vec<String> {
    let mut ids: Vec<_> = workers.iter().map(|w| w.identity().to_string()).collect();
    ids.sort();
    ids
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

#[test]
fn worker_is_found_by_each_of_its_capabilities() {
    let registry = WorkerRegistry::new();
    registry.register(worker("w1", &["pizza", "pasta", "salad"]));

    for capability in ["pizza", "pasta", "salad"] {
        let found = registry.find_candidates(&caps(&[capability]));
        assert_eq!(identities(&found), vec!["w1"], "capability {capability}");
    }
}

#[test]
fn lookup_matches_any_requested_capability() {
    let registry = WorkerRegistry::new();
    registry.register(worker("pizzaiolo", &["pizza"]));
    registry.register(worker("sushi-chef", &["sushi"]));
    registry.register(worker("baker", &["bread"]));

    let found = registry.find_candidates(&caps(&["sushi", "pizza"]));
    assert_eq!(identities(&found), vec!["pizzaiolo", "sushi-chef"]);
}

#[test]
fn multi_capability_order_matches_worker_holding_all_of_them() {
    let registry = WorkerRegistry::new();
    registry.register(worker("w1", &["pizza", "pasta"]));

    let found = registry.find_candidates(&caps(&["pizza", "pasta"]));
    assert_eq!(identities(&found), vec!["w1"]);
}

#[test]
fn no_match_is_an_empty_result() {
    let registry = WorkerRegistry::new();
    registry.register(worker("w1", &["pizza"]));

    assert!(registry.find_candidates(&caps(&["sushi"])).is_empty());
    assert!(registry.find_candidates(&[]).is_empty());
    assert!(registry.pick(&caps(&["sushi"])).is_none());
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[test]
fn deregistered_worker_is_never_a_candidate() {
    let registry = WorkerRegistry::new();
    registry.register(worker("w1", &["pizza", "pasta"]));
    registry.register(worker("w2", &["pasta"]));

    assert!(registry.deregister("w1"));

    for capability in ["pizza", "pasta"] {
        let found = registry.find_candidates(&caps(&[capability]));
        assert!(found.iter().all(|w| w.identity() != "w1"));
    }
    assert!(!registry.contains("w1"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn deregistering_unknown_identity_is_a_no_op() {
    let registry = WorkerRegistry::new();
    registry.register(worker("w1", &["pizza"]));

    assert!(!registry.deregister("ghost"));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.identities(), vec!["w1"]);

    // Twice in a row is equally harmless.
    assert!(registry.deregister("w1"));
    assert!(!registry.deregister("w1"));
    assert!(registry.is_empty());
}

#[test]
fn registering_existing_identity_overwrites() {
    let registry = WorkerRegistry::new();
    assert!(!registry.register(worker("w1", &["pizza"])));
    assert!(registry.register(worker("w1", &["sushi"])));

    assert_eq!(registry.len(), 1);
    assert!(registry.find_candidates(&caps(&["pizza"])).is_empty());
    assert_eq!(
        identities(&registry.find_candidates(&caps(&["sushi"]))),
        vec!["w1"]
    );
}

#[test]
fn handle_outlives_deregistration() {
    let registry = WorkerRegistry::new();
    registry.register(worker("w1", &["pizza"]));

    let held = registry.pick(&caps(&["pizza"])).expect("w1 should match");
    registry.deregister("w1");

    assert_eq!(held.identity(), "w1");
    assert_eq!(held.capabilities(), caps(&["pizza"]).as_slice());
}

#[test]
fn worker_cycles_on_and_off_duty() {
    let registry = WorkerRegistry::new();
    for _ in 0..3 {
        registry.register(worker("w1", &["pizza"]));
        assert!(registry.contains("w1"));
        registry.deregister("w1");
        assert!(!registry.contains("w1"));
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[test]
fn pick_is_roughly_uniform_across_matching_workers() {
    let registry = WorkerRegistry::new();
    registry.register(worker("a", &["pizza"]));
    registry.register(worker("b", &["pizza", "pasta"]));
    registry.register(worker("c", &["pizza"]));
    registry.register(worker("d", &["sushi"]));

    let trials = 3000;
    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..trials {
        let w = registry.pick(&caps(&["pizza"])).expect("should pick");
        *counts.entry(w.identity().to_string()).or_default() += 1;
    }

    assert!(!counts.contains_key("d"));
    for id in ["a", "b", "c"] {
        let n = counts.get(id).copied().unwrap_or(0);
        // Expected 1000 each; the bounds are ~7 standard deviations wide.
        assert!((800..=1200).contains(&n), "{id} picked {n} times");
    }
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn lookups_see_consistent_snapshots_under_concurrent_churn() {
    let registry = Arc::new(WorkerRegistry::new());
    registry.register(worker("anchor", &["pizza"]));

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for i in 0..500 {
                    let id = format!("w{t}-{}", i % 10);
                    registry.register(worker(&id, &["pizza", "pasta"]));
                    registry.deregister(&id);
                }
            })
        })
        .collect();

    for _ in 0..2000 {
        let found = registry.find_candidates(&caps(&["pizza"]));
        assert!(found.iter().any(|w| w.identity() == "anchor"));
        assert!(found.iter().all(|w| w.serves_any(&caps(&["pizza"]))));
    }

    for handle in writers {
        handle.join().expect("writer thread panicked");
    }
    assert_eq!(registry.identities(), vec!["anchor"]);
}

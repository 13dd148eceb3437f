//! Per-key state machine checked against a model
//!
//! Inactive -inject-> Active -cleanup-> Inactive; inject while Active and
//! cleanup while Inactive are no-ops. After every step the tracker and the
//! simulated cluster must agree with the model.

use infraguard_chaos::{
    names, CleanupResult, FaultController, InMemoryCluster, IncidentKey, InjectionResult,
    LabelSelector,
};
use infraguard_test_utils::{
    baseline_snapshot, memory_limit, quantity, replicas, setup, NAMESPACE, OTHER_NAMESPACE,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
enum Op {
    Inject(&'static str, &'static str),
    Cleanup(&'static str, &'static str),
    CleanupAll(&'static str),
}

fn scenario() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just(names::MEMORY_LEAK),
        Just(names::CPU_SPIKE),
        Just(names::CRASH_LOOP),
        Just(names::SCALE_DOWN),
        Just(names::RESOURCE_LIMIT),
    ]
}

fn namespace() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just(NAMESPACE), Just(OTHER_NAMESPACE)]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (scenario(), namespace()).prop_map(|(s, n)| Op::Inject(s, n)),
        3 => (scenario(), namespace()).prop_map(|(s, n)| Op::Cleanup(s, n)),
        1 => namespace().prop_map(Op::CleanupAll),
    ]
}

fn check_cluster(cluster: &InMemoryCluster, model: &BTreeSet<IncidentKey>) {
    for ns in [NAMESPACE, OTHER_NAMESPACE] {
        let active = |s: &str| model.contains(&IncidentKey::new(s, ns));

        for s in [names::MEMORY_LEAK, names::CPU_SPIKE, names::CRASH_LOOP] {
            let selector = LabelSelector::for_scenario(s).unwrap();
            assert_eq!(cluster.count_matching(ns, &selector), usize::from(active(s)), "{s} in {ns}");
        }

        let expected_replicas = if active(names::SCALE_DOWN) { 0 } else { 2 };
        assert_eq!(replicas(cluster, ns), Some(expected_replicas));

        let expected_limit = if active(names::RESOURCE_LIMIT) { "16Mi" } else { "64Mi" };
        assert_eq!(memory_limit(cluster, ns), Some(quantity(expected_limit)));
    }
}

async fn apply(controller: &FaultController, model: &mut BTreeSet<IncidentKey>, op: &Op) {
    match *op {
        Op::Inject(s, n) => {
            let was_active = model.contains(&IncidentKey::new(s, n));
            let result = controller.inject(s, n).await.unwrap();
            assert_eq!(result.is_already_active(), was_active);
            if let InjectionResult::AlreadyActive { adopted, .. } = result {
                assert!(!adopted);
            }
            model.insert(IncidentKey::new(s, n));
        }
        Op::Cleanup(s, n) => {
            let was_active = model.remove(&IncidentKey::new(s, n));
            let result = controller.cleanup_one(s, n).await.unwrap();
            assert_eq!(result != CleanupResult::NotActive, was_active);
        }
        Op::CleanupAll(n) => {
            let report = controller.cleanup_all(n).await.unwrap();
            let before = model.len();
            model.retain(|k| k.namespace != n);
            assert_eq!(report.records_cleared.len(), before - model.len());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_tracker_and_cluster_follow_model(ops in prop::collection::vec(op(), 1..24)) {
        tokio_test::block_on(async {
            let (cluster, controller) = setup();
            let mut model = BTreeSet::new();

            for op in &ops {
                apply(&controller, &mut model, op).await;

                let tracked: BTreeSet<_> = controller
                    .tracker()
                    .all()
                    .iter()
                    .map(|r| r.key())
                    .collect();
                assert_eq!(tracked, model);
                check_cluster(&cluster, &model);
            }

            controller.cleanup_all(NAMESPACE).await.unwrap();
            controller.cleanup_all(OTHER_NAMESPACE).await.unwrap();
            assert!(controller.tracker().is_empty());
            assert_eq!(cluster.snapshot(), baseline_snapshot(&[NAMESPACE, OTHER_NAMESPACE]));
        });
    }
}

#[tokio::test]
async fn cleanup_of_inactive_key_is_a_no_op() {
    let (cluster, controller) = setup();
    let before = cluster.snapshot();

    let result = controller.cleanup_one(names::SCALE_DOWN, NAMESPACE).await.unwrap();

    assert_eq!(result, CleanupResult::NotActive);
    assert_eq!(cluster.snapshot(), before);
}

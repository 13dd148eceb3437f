//! Testing utilities for the InfraGuard workspace
//!
//! Shared fixtures: a simulated cluster seeded at baseline and controllers
//! wired to it.

#![allow(missing_docs)]

use infraguard_chaos::catalog::{BASELINE_MEMORY_LIMIT, BASELINE_REPLICAS};
use infraguard_chaos::{
    ClusterSnapshot, ControllerContext, DeploymentState, FaultController, InMemoryCluster,
    Quantity, ResourceName, ScenarioCatalog,
};
use std::sync::Arc;
use std::time::Duration;

pub const NAMESPACE: &str = "demo-apps";
pub const OTHER_NAMESPACE: &str = "staging";
pub const DEPLOYMENT: &str = "sample-app";

/// Request below every limit the built-in scenarios set
pub const BASELINE_MEMORY_REQUEST: &str = "8Mi";

pub fn quantity(raw: &str) -> Quantity {
    raw.parse().unwrap()
}

pub fn baseline_deployment() -> DeploymentState {
    DeploymentState::new(BASELINE_REPLICAS)
        .with_limit(ResourceName::Memory, quantity(BASELINE_MEMORY_LIMIT))
        .with_request(ResourceName::Memory, quantity(BASELINE_MEMORY_REQUEST))
}

/// Cluster with `sample-app` at baseline in each namespace
pub fn seeded_cluster(namespaces: &[&str]) -> InMemoryCluster {
    let cluster = InMemoryCluster::new();
    for ns in namespaces {
        cluster.add_deployment(ns, DEPLOYMENT, baseline_deployment());
    }
    cluster
}

pub fn builtin_catalog() -> ScenarioCatalog {
    ScenarioCatalog::builtin(DEPLOYMENT).unwrap()
}

/// Controller over `cluster` with the built-in catalog
pub fn controller_with(cluster: Arc<InMemoryCluster>, lock_timeout: Duration) -> FaultController {
    FaultController::from_context(ControllerContext::new(builtin_catalog(), cluster), lock_timeout)
}

/// Seeded cluster plus a controller over it
pub fn setup() -> (Arc<InMemoryCluster>, FaultController) {
    let cluster = Arc::new(seeded_cluster(&[NAMESPACE, OTHER_NAMESPACE]));
    let controller = controller_with(Arc::clone(&cluster), Duration::from_secs(2));
    (cluster, controller)
}

/// Seeded cluster whose every call takes `latency`
pub fn setup_with_latency(latency: Duration, lock_timeout: Duration) -> (Arc<InMemoryCluster>, FaultController) {
    let cluster = seeded_cluster(&[NAMESPACE]).with_latency(latency);
    let cluster = Arc::new(cluster);
    let controller = controller_with(Arc::clone(&cluster), lock_timeout);
    (cluster, controller)
}

/// Snapshot of a freshly seeded cluster, for comparing against after cleanup
pub fn baseline_snapshot(namespaces: &[&str]) -> ClusterSnapshot {
    seeded_cluster(namespaces).snapshot()
}

pub fn memory_limit(cluster: &InMemoryCluster, namespace: &str) -> Option<Quantity> {
    cluster
        .deployment(namespace, DEPLOYMENT)
        .and_then(|d| d.limits.get(&ResourceName::Memory).cloned())
}

pub fn replicas(cluster: &InMemoryCluster, namespace: &str) -> Option<u32> {
    cluster.deployment(namespace, DEPLOYMENT).map(|d| d.replicas)
}

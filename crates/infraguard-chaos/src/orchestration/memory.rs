//! Simulated control plane
//!
//! Keeps workloads and deployments in memory and answers the client
//! contract the way a real API server would: identity collisions, missing
//! targets, and limits below requests are rejected. Counts every call so
//! tests can assert that a path issued none.

use super::{OrchestrationClient, WorkloadHandle};
use crate::catalog::EphemeralWorkloadSpec;
use crate::error::OrchestrationError;
use crate::types::{Labels, LabelSelector, Quantity, ResourceName};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A standalone workload as stored by the simulated API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadState {
    /// Spec it was created from
    pub spec: EphemeralWorkloadSpec,
    /// Labels stamped at creation
    pub labels: Labels,
}

/// Mutable fields of a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentState {
    /// Replica count
    pub replicas: u32,
    /// Container resource limits
    pub limits: BTreeMap<ResourceName, Quantity>,
    /// Container resource requests
    pub requests: BTreeMap<ResourceName, Quantity>,
}

impl DeploymentState {
    /// Deployment with `replicas` and no resources set
    #[must_use]
    pub fn new(replicas: u32) -> Self {
        Self {
            replicas,
            limits: BTreeMap::new(),
            requests: BTreeMap::new(),
        }
    }

    /// With a limit
    #[must_use]
    pub fn with_limit(mut self, resource: ResourceName, value: Quantity) -> Self {
        self.limits.insert(resource, value);
        self
    }

    /// With a request
    #[must_use]
    pub fn with_request(mut self, resource: ResourceName, value: Quantity) -> Self {
        self.requests.insert(resource, value);
        self
    }
}

/// Full copy of the simulated state, for comparing before/after
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSnapshot {
    /// Workloads keyed by `(namespace, name)`
    pub workloads: BTreeMap<(String, String), WorkloadState>,
    /// Deployments keyed by `(namespace, name)`
    pub deployments: BTreeMap<(String, String), DeploymentState>,
}

/// In-memory implementation of [`OrchestrationClient`]
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: Mutex<ClusterSnapshot>,
    calls: AtomicUsize,
    latency: Option<Duration>,
    queued_failures: Mutex<VecDeque<OrchestrationError>>,
}

impl InMemoryCluster {
    /// Empty cluster
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it takes effect
    #[inline]
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add or replace a deployment
    pub fn add_deployment(&self, namespace: &str, name: &str, deployment: DeploymentState) {
        self.state
            .lock()
            .deployments
            .insert((namespace.to_string(), name.to_string()), deployment);
    }

    /// Remove a deployment
    pub fn remove_deployment(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .deployments
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Current state of a deployment
    #[must_use]
    pub fn deployment(&self, namespace: &str, name: &str) -> Option<DeploymentState> {
        self.state
            .lock()
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Names of the workloads in `namespace`
    #[must_use]
    pub fn workload_names(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .workloads
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Number of workloads in `namespace` matching `selector`
    #[must_use]
    pub fn count_matching(&self, namespace: &str, selector: &LabelSelector) -> usize {
        self.state
            .lock()
            .workloads
            .iter()
            .filter(|((ns, _), w)| ns == namespace && selector.matches(&w.labels))
            .count()
    }

    /// Copy of the whole state
    #[must_use]
    pub fn snapshot(&self) -> ClusterSnapshot {
        self.state.lock().clone()
    }

    /// Total client calls received, including failed ones
    #[inline]
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail the next call with `error` instead of applying it
    pub fn fail_next_call(&self, error: OrchestrationError) {
        self.queued_failures.lock().push_back(error);
    }

    async fn begin_call(&self) -> Result<(), OrchestrationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.queued_failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn not_found(namespace: &str, deployment: &str) -> OrchestrationError {
    OrchestrationError::TargetNotFound {
        kind: "deployment".to_string(),
        namespace: namespace.to_string(),
        name: deployment.to_string(),
    }
}

#[async_trait]
impl OrchestrationClient for InMemoryCluster {
    async fn create_ephemeral_workload(
        &self,
        namespace: &str,
        spec: &EphemeralWorkloadSpec,
        labels: &Labels,
    ) -> Result<WorkloadHandle, OrchestrationError> {
        self.begin_call().await?;

        let key = (namespace.to_string(), spec.name.clone());
        let mut state = self.state.lock();
        if state.workloads.contains_key(&key) {
            return Err(OrchestrationError::AlreadyExists {
                kind: "pod".to_string(),
                namespace: namespace.to_string(),
                name: spec.name.clone(),
            });
        }
        state.workloads.insert(
            key,
            WorkloadState {
                spec: spec.clone(),
                labels: labels.clone(),
            },
        );

        Ok(WorkloadHandle::pod(namespace, &spec.name))
    }

    async fn delete_workloads_by_selector(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<usize, OrchestrationError> {
        self.begin_call().await?;

        let mut state = self.state.lock();
        let before = state.workloads.len();
        state
            .workloads
            .retain(|(ns, _), w| !(ns == namespace && selector.matches(&w.labels)));
        Ok(before - state.workloads.len())
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        deployment: &str,
        replicas: u32,
    ) -> Result<(), OrchestrationError> {
        self.begin_call().await?;

        let mut state = self.state.lock();
        let target = state
            .deployments
            .get_mut(&(namespace.to_string(), deployment.to_string()))
            .ok_or_else(|| not_found(namespace, deployment))?;
        target.replicas = replicas;
        Ok(())
    }

    async fn patch_deployment_resource_limit(
        &self,
        namespace: &str,
        deployment: &str,
        resource: ResourceName,
        value: &Quantity,
    ) -> Result<(), OrchestrationError> {
        self.begin_call().await?;

        let mut state = self.state.lock();
        let target = state
            .deployments
            .get_mut(&(namespace.to_string(), deployment.to_string()))
            .ok_or_else(|| not_found(namespace, deployment))?;

        if let Some(request) = target.requests.get(&resource) {
            if value.value() < request.value() {
                return Err(OrchestrationError::InvalidValue(format!(
                    "limits.{resource}={value} must be greater than or equal to requests.{resource}={request}"
                )));
            }
        }
        target.limits.insert(resource, value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(raw: &str) -> Quantity {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn create_rejects_duplicate_identity() {
        let cluster = InMemoryCluster::new();
        let spec = EphemeralWorkloadSpec::new("hog", "busybox");
        let labels = LabelSelector::for_scenario("memory-leak").unwrap().as_labels();

        let handle = cluster
            .create_ephemeral_workload("demo-apps", &spec, &labels)
            .await
            .unwrap();
        assert_eq!(handle, WorkloadHandle::pod("demo-apps", "hog"));

        let err = cluster
            .create_ephemeral_workload("demo-apps", &spec, &labels)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::AlreadyExists { name, .. } if name == "hog"));

        // Same name in another namespace is a different identity
        assert!(cluster
            .create_ephemeral_workload("other", &spec, &labels)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn delete_by_selector_is_scoped_and_idempotent() {
        let cluster = InMemoryCluster::new();
        let selector = LabelSelector::for_scenario("crash-loop").unwrap();
        let other = LabelSelector::for_scenario("cpu-spike").unwrap();

        for (ns, name, sel) in [
            ("demo-apps", "a", &selector),
            ("demo-apps", "b", &other),
            ("other", "c", &selector),
        ] {
            cluster
                .create_ephemeral_workload(ns, &EphemeralWorkloadSpec::new(name, "busybox"), &sel.as_labels())
                .await
                .unwrap();
        }

        assert_eq!(cluster.delete_workloads_by_selector("demo-apps", &selector).await, Ok(1));
        assert_eq!(cluster.delete_workloads_by_selector("demo-apps", &selector).await, Ok(0));
        assert_eq!(cluster.workload_names("demo-apps"), vec!["b".to_string()]);
        assert_eq!(cluster.workload_names("other"), vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn scale_missing_deployment() {
        let cluster = InMemoryCluster::new();
        let err = cluster.scale_deployment("demo-apps", "ghost", 0).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::TargetNotFound { .. }));
    }

    #[tokio::test]
    async fn patch_rejects_limit_below_request() {
        let cluster = InMemoryCluster::new();
        cluster.add_deployment(
            "demo-apps",
            "sample-app",
            DeploymentState::new(2)
                .with_limit(ResourceName::Memory, q("64Mi"))
                .with_request(ResourceName::Memory, q("32Mi")),
        );

        let err = cluster
            .patch_deployment_resource_limit("demo-apps", "sample-app", ResourceName::Memory, &q("16Mi"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidValue(_)));

        cluster
            .patch_deployment_resource_limit("demo-apps", "sample-app", ResourceName::Memory, &q("128Mi"))
            .await
            .unwrap();
        let dep = cluster.deployment("demo-apps", "sample-app").unwrap();
        assert_eq!(dep.limits.get(&ResourceName::Memory), Some(&q("128Mi")));
    }

    #[tokio::test]
    async fn queued_failure_applies_once_and_counts() {
        let cluster = InMemoryCluster::new();
        cluster.add_deployment("demo-apps", "sample-app", DeploymentState::new(2));
        cluster.fail_next_call(OrchestrationError::Transient("connection reset".into()));

        assert!(cluster.scale_deployment("demo-apps", "sample-app", 0).await.is_err());
        assert_eq!(cluster.deployment("demo-apps", "sample-app").unwrap().replicas, 2);

        cluster.scale_deployment("demo-apps", "sample-app", 0).await.unwrap();
        assert_eq!(cluster.deployment("demo-apps", "sample-app").unwrap().replicas, 0);
        assert_eq!(cluster.call_count(), 2);
    }
}

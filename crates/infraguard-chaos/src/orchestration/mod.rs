//! Orchestration client boundary
//!
//! The controller only ever talks to the control plane through
//! [`OrchestrationClient`]. Implementations:
//! - [`KubectlClient`]: drives a real cluster through `kubectl`
//! - [`InMemoryCluster`]: deterministic simulated control plane
//!
//! Implementations hold no incident state. Every call either succeeds or
//! fails with one of the [`OrchestrationError`] kinds; anything that is not
//! a definitive answer from the API (timeouts, spawn failures, connection
//! errors) is `OrchestrationError::Transient`.

mod kubectl;
mod memory;

pub use kubectl::{classify_stderr, pod_manifest, resource_limit_patch, KubectlClient};
pub use memory::{ClusterSnapshot, DeploymentState, InMemoryCluster, WorkloadState};

use crate::catalog::EphemeralWorkloadSpec;
use crate::error::OrchestrationError;
use crate::types::{Labels, LabelSelector, Quantity, ResourceName};
use async_trait::async_trait;
use std::fmt;

/// Reference to an object created by the client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadHandle {
    /// Object kind
    pub kind: String,
    /// Namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl WorkloadHandle {
    /// Handle for a pod
    #[inline]
    #[must_use]
    pub fn pod(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: "pod".to_string(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} -n {}", self.kind, self.name, self.namespace)
    }
}

/// Capability interface over the container orchestration control plane
///
/// Safe for concurrent use across distinct target objects.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrchestrationClient: Send + Sync {
    /// Create a standalone workload stamped with `labels`
    ///
    /// # Errors
    /// `AlreadyExists` if an object with the same identity exists.
    async fn create_ephemeral_workload(
        &self,
        namespace: &str,
        spec: &EphemeralWorkloadSpec,
        labels: &Labels,
    ) -> Result<WorkloadHandle, OrchestrationError>;

    /// Delete every workload matching `selector`, returning how many went
    ///
    /// Deleting nothing is success.
    async fn delete_workloads_by_selector(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<usize, OrchestrationError>;

    /// Set a deployment's replica count
    ///
    /// # Errors
    /// `TargetNotFound` if the deployment does not exist.
    async fn scale_deployment(
        &self,
        namespace: &str,
        deployment: &str,
        replicas: u32,
    ) -> Result<(), OrchestrationError>;

    /// Set a deployment container's resource limit
    ///
    /// # Errors
    /// `TargetNotFound` if the deployment does not exist, `InvalidValue` if
    /// the API rejects the value.
    async fn patch_deployment_resource_limit(
        &self,
        namespace: &str,
        deployment: &str,
        resource: ResourceName,
        value: &Quantity,
    ) -> Result<(), OrchestrationError>;
}

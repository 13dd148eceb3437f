//! Scenario definitions
//!
//! A scenario either creates an ephemeral standalone workload (the artifact)
//! or mutates an existing deployment. Mutation scenarios carry their
//! baseline value in the definition so cleanup never depends on what the
//! tracker remembers.

use crate::error::ConfigError;
use crate::types::{Labels, LabelSelector, Quantity, ResourceName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a scenario creates an artifact or mutates a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Creates a standalone workload tagged with the artifact selector
    EphemeralWorkload,
    /// Changes a deployment's replica count
    ScaleDeployment,
    /// Changes a deployment container's resource limit
    PatchResourceLimit,
}

impl TargetKind {
    /// Whether cleanup must restore a baseline value
    #[inline]
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self, TargetKind::EphemeralWorkload)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::EphemeralWorkload => "ephemeral-workload",
            TargetKind::ScaleDeployment => "scale-deployment",
            TargetKind::PatchResourceLimit => "patch-resource-limit",
        })
    }
}

/// Restart behaviour of an ephemeral workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RestartPolicy {
    /// Run once
    #[default]
    Never,
    /// Restart on exit, which is what produces a crash loop
    Always,
    /// Restart on non-zero exit
    OnFailure,
}

impl RestartPolicy {
    /// API spelling
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::Never => "Never",
            RestartPolicy::Always => "Always",
            RestartPolicy::OnFailure => "OnFailure",
        }
    }
}

/// Container resource quantities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// Memory quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Quantity>,
    /// CPU quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Quantity>,
}

impl ResourceRequirements {
    /// Set memory
    #[inline]
    #[must_use]
    pub fn with_memory(mut self, q: Quantity) -> Self {
        self.memory = Some(q);
        self
    }

    /// Set cpu
    #[inline]
    #[must_use]
    pub fn with_cpu(mut self, q: Quantity) -> Self {
        self.cpu = Some(q);
        self
    }

    /// Whether no quantity is set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory.is_none() && self.cpu.is_none()
    }
}

/// Payload for an ephemeral workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralWorkloadSpec {
    /// Object name; its identity within the namespace
    pub name: String,
    /// Container image
    pub image: String,
    /// Container command
    #[serde(default)]
    pub command: Vec<String>,
    /// Resource requests
    #[serde(default, skip_serializing_if = "ResourceRequirements::is_empty")]
    pub requests: ResourceRequirements,
    /// Resource limits
    #[serde(default, skip_serializing_if = "ResourceRequirements::is_empty")]
    pub limits: ResourceRequirements,
    /// Restart policy
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    /// Upper bound on the workload's lifetime, enforced by the orchestrator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    /// Extra labels besides the artifact selector
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

impl EphemeralWorkloadSpec {
    /// Create new spec with defaults for everything but name and image
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: Vec::new(),
            requests: ResourceRequirements::default(),
            limits: ResourceRequirements::default(),
            restart_policy: RestartPolicy::Never,
            duration_secs: None,
            labels: Labels::new(),
        }
    }

    /// With command
    #[must_use]
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// With resource limits
    #[inline]
    #[must_use]
    pub fn with_limits(mut self, limits: ResourceRequirements) -> Self {
        self.limits = limits;
        self
    }

    /// With resource requests
    #[inline]
    #[must_use]
    pub fn with_requests(mut self, requests: ResourceRequirements) -> Self {
        self.requests = requests;
        self
    }

    /// With restart policy
    #[inline]
    #[must_use]
    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// With lifetime bound
    #[inline]
    #[must_use]
    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// With extra label
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// What a scenario does, with everything needed to undo it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ScenarioAction {
    /// Create a standalone workload
    Ephemeral(EphemeralWorkloadSpec),
    /// Scale a deployment, restoring `baseline_replicas` on cleanup
    Scale {
        /// Deployment name
        deployment: String,
        /// Replica count while the incident is active
        replicas: u32,
        /// Replica count restored on cleanup
        baseline_replicas: u32,
    },
    /// Patch a resource limit, restoring `baseline` on cleanup
    PatchLimit {
        /// Deployment name
        deployment: String,
        /// Resource whose limit is patched
        resource: ResourceName,
        /// Limit while the incident is active
        value: Quantity,
        /// Limit restored on cleanup
        baseline: Quantity,
    },
}

/// Value a mutation scenario restores on cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaselineValue {
    /// Deployment replica count
    Replicas {
        /// Deployment name
        deployment: String,
        /// Replica count
        replicas: u32,
    },
    /// Container resource limit
    Limit {
        /// Deployment name
        deployment: String,
        /// Resource
        resource: ResourceName,
        /// Limit value
        value: Quantity,
    },
}

impl fmt::Display for BaselineValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaselineValue::Replicas { deployment, replicas } => {
                write!(f, "deployment/{deployment} replicas={replicas}")
            }
            BaselineValue::Limit {
                deployment,
                resource,
                value,
            } => write!(f, "deployment/{deployment} limits.{resource}={value}"),
        }
    }
}

/// Immutable scenario definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    /// Unique scenario name
    pub name: String,
    /// Operator-facing description
    #[serde(default)]
    pub description: String,
    /// Injection action and its undo data
    pub action: ScenarioAction,
    /// Selector stamped on every artifact this scenario creates
    pub artifact_selector: LabelSelector,
}

impl ScenarioDefinition {
    /// Create a definition whose artifact selector is derived from its name
    ///
    /// # Errors
    /// Returns `ConfigError` if the name cannot be used as a label value or the
    /// action is malformed.
    pub fn new(name: impl Into<String>, action: ScenarioAction) -> Result<Self, ConfigError> {
        let name = name.into();
        let artifact_selector = LabelSelector::for_scenario(&name).map_err(|_| {
            ConfigError::InvalidScenario {
                name: name.clone(),
                reason: "name is not a valid label value".to_string(),
            }
        })?;
        let def = Self {
            name,
            description: String::new(),
            action,
            artifact_selector,
        };
        def.validate()?;
        Ok(def)
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Target kind implied by the action
    #[must_use]
    pub fn target_kind(&self) -> TargetKind {
        match self.action {
            ScenarioAction::Ephemeral(_) => TargetKind::EphemeralWorkload,
            ScenarioAction::Scale { .. } => TargetKind::ScaleDeployment,
            ScenarioAction::PatchLimit { .. } => TargetKind::PatchResourceLimit,
        }
    }

    /// Baseline restored on cleanup, for mutation scenarios
    #[must_use]
    pub fn baseline(&self) -> Option<BaselineValue> {
        match &self.action {
            ScenarioAction::Ephemeral(_) => None,
            ScenarioAction::Scale {
                deployment,
                baseline_replicas,
                ..
            } => Some(BaselineValue::Replicas {
                deployment: deployment.clone(),
                replicas: *baseline_replicas,
            }),
            ScenarioAction::PatchLimit {
                deployment,
                resource,
                baseline,
                ..
            } => Some(BaselineValue::Limit {
                deployment: deployment.clone(),
                resource: *resource,
                value: baseline.clone(),
            }),
        }
    }

    /// Labels stamped on the artifact: extra labels plus the selector
    ///
    /// The selector wins on key collision so bulk deletion always finds
    /// the artifact.
    #[must_use]
    pub fn artifact_labels(&self) -> Labels {
        let mut labels = match &self.action {
            ScenarioAction::Ephemeral(spec) => spec.labels.clone(),
            _ => Labels::new(),
        };
        labels.extend(self.artifact_selector.as_labels());
        labels
    }

    /// Check the definition is usable
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidScenario` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidScenario {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }

        match &self.action {
            ScenarioAction::Ephemeral(spec) => {
                if spec.name.trim().is_empty() {
                    return Err(invalid("workload name is empty"));
                }
                if spec.image.trim().is_empty() {
                    return Err(invalid("workload image is empty"));
                }
                if spec.duration_secs == Some(0) {
                    return Err(invalid("duration_secs must be positive"));
                }
            }
            ScenarioAction::Scale {
                deployment,
                replicas,
                baseline_replicas,
            } => {
                if deployment.trim().is_empty() {
                    return Err(invalid("deployment is empty"));
                }
                if replicas == baseline_replicas {
                    return Err(invalid("replicas equal the baseline, nothing to inject"));
                }
            }
            ScenarioAction::PatchLimit {
                deployment,
                value,
                baseline,
                ..
            } => {
                if deployment.trim().is_empty() {
                    return Err(invalid("deployment is empty"));
                }
                if value == baseline {
                    return Err(invalid("limit equals the baseline, nothing to inject"));
                }
            }
        }

        Ok(())
    }
}

//! Scenario catalog
//!
//! Read-only registry of scenario definitions, built once at startup from
//! the built-in set or from configuration.

mod scenario;

pub use scenario::{
    BaselineValue, EphemeralWorkloadSpec, ResourceRequirements, RestartPolicy, ScenarioAction,
    ScenarioDefinition, TargetKind,
};

use crate::error::{ChaosError, ConfigError};
use crate::types::{LabelSelector, Quantity, ResourceName};
use std::collections::{BTreeMap, BTreeSet};

/// Names of the built-in scenarios
pub mod names {
    /// Memory pressure from a standalone workload
    pub const MEMORY_LEAK: &str = "memory-leak";
    /// CPU saturation, bounded by a duration
    pub const CPU_SPIKE: &str = "cpu-spike";
    /// Workload that exits immediately and is restarted forever
    pub const CRASH_LOOP: &str = "crash-loop";
    /// Total outage: target deployment scaled to zero
    pub const SCALE_DOWN: &str = "scale-down";
    /// Target deployment's memory limit squeezed below its working set
    pub const RESOURCE_LIMIT: &str = "resource-limit";

    /// All built-in names in catalog order
    pub const ALL: [&str; 5] = [MEMORY_LEAK, CPU_SPIKE, CRASH_LOOP, SCALE_DOWN, RESOURCE_LIMIT];
}

/// Baseline replica count of the target deployment
pub const BASELINE_REPLICAS: u32 = 2;

/// Baseline memory limit of the target deployment
pub const BASELINE_MEMORY_LIMIT: &str = "64Mi";

/// Default lifetime of the CPU spike workload
pub const CPU_SPIKE_DURATION_SECS: u64 = 300;

/// Immutable scenario registry
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    scenarios: BTreeMap<String, ScenarioDefinition>,
}

impl ScenarioCatalog {
    /// Build a catalog from definitions
    ///
    /// # Errors
    /// - `ConfigError::DuplicateScenario` if two definitions share a name
    /// - `ConfigError::InvalidScenario` if any definition fails validation
    pub fn new(definitions: impl IntoIterator<Item = ScenarioDefinition>) -> Result<Self, ConfigError> {
        let mut scenarios = BTreeMap::new();
        for def in definitions {
            def.validate()?;
            let name = def.name.clone();
            if scenarios.insert(name.clone(), def).is_some() {
                return Err(ConfigError::DuplicateScenario(name));
            }
        }
        Ok(Self { scenarios })
    }

    /// The built-in scenarios, all aimed at `deployment`
    ///
    /// # Errors
    /// Returns `ConfigError` only if `deployment` makes a definition invalid (e.g. empty).
    pub fn builtin(deployment: &str) -> Result<Self, ConfigError> {
        let q = |raw: &str| raw.parse::<Quantity>();

        let memory_leak = ScenarioDefinition::new(
            names::MEMORY_LEAK,
            ScenarioAction::Ephemeral(
                EphemeralWorkloadSpec::new("incident-memory-hog", "polinux/stress")
                    .with_command(["stress", "--vm", "1", "--vm-bytes", "180M", "--vm-hang", "1"])
                    .with_requests(ResourceRequirements::default().with_memory(q("50Mi")?))
                    .with_limits(ResourceRequirements::default().with_memory(q("200Mi")?))
                    .with_label("app", "memory-hog"),
            ),
        )?
        .with_description("Standalone workload holding memory close to its limit");

        let cpu_spike = ScenarioDefinition::new(
            names::CPU_SPIKE,
            ScenarioAction::Ephemeral(
                EphemeralWorkloadSpec::new("incident-cpu-hog", "polinux/stress")
                    .with_command([
                        "stress".to_string(),
                        "--cpu".to_string(),
                        "2".to_string(),
                        "--timeout".to_string(),
                        format!("{CPU_SPIKE_DURATION_SECS}s"),
                    ])
                    .with_limits(ResourceRequirements::default().with_cpu(q("1")?))
                    .with_duration_secs(CPU_SPIKE_DURATION_SECS)
                    .with_label("app", "cpu-hog"),
            ),
        )?
        .with_description("CPU saturation that terminates on its own after the duration bound");

        let crash_loop = ScenarioDefinition::new(
            names::CRASH_LOOP,
            ScenarioAction::Ephemeral(
                EphemeralWorkloadSpec::new("incident-crasher", "busybox")
                    .with_command(["sh", "-c", "echo simulated failure; sleep 5; exit 1"])
                    .with_restart_policy(RestartPolicy::Always)
                    .with_label("app", "crasher"),
            ),
        )?
        .with_description("Workload that exits non-zero and is restarted repeatedly");

        let scale_down = ScenarioDefinition::new(
            names::SCALE_DOWN,
            ScenarioAction::Scale {
                deployment: deployment.to_string(),
                replicas: 0,
                baseline_replicas: BASELINE_REPLICAS,
            },
        )?
        .with_description("Total outage: target deployment scaled to zero replicas");

        let resource_limit = ScenarioDefinition::new(
            names::RESOURCE_LIMIT,
            ScenarioAction::PatchLimit {
                deployment: deployment.to_string(),
                resource: ResourceName::Memory,
                value: q("16Mi")?,
                baseline: q(BASELINE_MEMORY_LIMIT)?,
            },
        )?
        .with_description("Target deployment's memory limit squeezed until it is OOM-killed");

        Self::new([memory_leak, cpu_spike, crash_loop, scale_down, resource_limit])
    }

    /// Resolve a scenario by name
    ///
    /// # Errors
    /// Returns `ChaosError::ScenarioNotFound` if the name is unknown.
    pub fn resolve(&self, name: &str) -> Result<&ScenarioDefinition, ChaosError> {
        self.scenarios
            .get(name)
            .ok_or_else(|| ChaosError::ScenarioNotFound(name.to_string()))
    }

    /// Whether a scenario exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.scenarios.contains_key(name)
    }

    /// All definitions in name order
    pub fn iter(&self) -> impl Iterator<Item = &ScenarioDefinition> {
        self.scenarios.values()
    }

    /// All scenario names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.keys().map(String::as_str)
    }

    /// Union of every artifact selector, deduplicated
    #[must_use]
    pub fn artifact_selectors(&self) -> BTreeSet<LabelSelector> {
        self.scenarios
            .values()
            .map(|s| s.artifact_selector.clone())
            .collect()
    }

    /// Definitions whose cleanup restores a baseline
    pub fn mutation_scenarios(&self) -> impl Iterator<Item = &ScenarioDefinition> {
        self.scenarios
            .values()
            .filter(|s| s.target_kind().is_mutation())
    }

    /// Whether `name` is the artifact identity of the given scenario
    #[must_use]
    pub fn is_artifact_of(&self, scenario: &str, workload_name: &str) -> bool {
        self.scenarios.get(scenario).is_some_and(|s| {
            matches!(&s.action, ScenarioAction::Ephemeral(spec) if spec.name == workload_name)
        })
    }

    /// Number of scenarios
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Whether the catalog is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

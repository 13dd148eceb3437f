//! Controller configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no
//! file at all) yields the demo setup: built-in scenarios aimed at
//! `sample-app` in `demo-apps`.

use crate::catalog::{BaselineValue, ScenarioAction, ScenarioCatalog, ScenarioDefinition};
use crate::error::ConfigError;
use crate::types::LabelSelector;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChaosConfig {
    /// Namespace operated on when none is given
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Deployment the built-in mutation scenarios target
    #[serde(default = "default_deployment")]
    pub target_deployment: String,

    /// Index of the container whose limits are patched
    #[serde(default)]
    pub target_container: usize,

    /// Bounded wait for namespace-wide cleanup, in milliseconds
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Per-call orchestration timeout, in seconds
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,

    /// `kubectl` binary
    #[serde(default = "default_kubectl")]
    pub kubectl: String,

    /// kubeconfig context; the current context when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,

    /// Tracker snapshot file; no persistence when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// Incident detection endpoint
    #[serde(default = "default_detection_url")]
    pub detection_url: String,

    /// Detection request timeout, in seconds
    #[serde(default = "default_detection_timeout_secs")]
    pub detection_timeout_secs: u64,

    /// `status --watch` polling interval, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Scenario list replacing the built-in catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<Vec<ScenarioConfig>>,
}

fn default_namespace() -> String {
    "demo-apps".to_string()
}
fn default_deployment() -> String {
    "sample-app".to_string()
}
fn default_lock_timeout_ms() -> u64 {
    5_000
}
fn default_api_timeout_secs() -> u64 {
    30
}
fn default_kubectl() -> String {
    "kubectl".to_string()
}
fn default_detection_url() -> String {
    "http://localhost:5000/api/incidents/detect".to_string()
}
fn default_detection_timeout_secs() -> u64 {
    10
}
fn default_poll_interval_secs() -> u64 {
    10
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            target_deployment: default_deployment(),
            target_container: 0,
            lock_timeout_ms: default_lock_timeout_ms(),
            api_timeout_secs: default_api_timeout_secs(),
            kubectl: default_kubectl(),
            kube_context: None,
            state_file: None,
            detection_url: default_detection_url(),
            detection_timeout_secs: default_detection_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            scenarios: None,
        }
    }
}

/// Scenario as written in the config file
///
/// `artifact_selector` defaults to the scenario's own incident label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Unique scenario name
    pub name: String,
    /// Operator-facing description
    #[serde(default)]
    pub description: String,
    /// Injection action and its undo data
    pub action: ScenarioAction,
    /// Selector override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_selector: Option<LabelSelector>,
}

impl ScenarioConfig {
    fn into_definition(self) -> Result<ScenarioDefinition, ConfigError> {
        match self.artifact_selector {
            Some(artifact_selector) => {
                let def = ScenarioDefinition {
                    name: self.name,
                    description: self.description,
                    action: self.action,
                    artifact_selector,
                };
                def.validate()?;
                Ok(def)
            }
            None => Ok(ScenarioDefinition::new(self.name, self.action)?
                .with_description(self.description)),
        }
    }
}

impl ChaosConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and validate a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` if it is not valid for the schema
    /// - any validation error from [`ChaosConfig::validate`]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// See [`ChaosConfig::load`].
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// With namespace
    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// With target deployment
    #[inline]
    #[must_use]
    pub fn with_target_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.target_deployment = deployment.into();
        self
    }

    /// With lock timeout
    #[inline]
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With tracker snapshot file
    #[inline]
    #[must_use]
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// With detection endpoint
    #[inline]
    #[must_use]
    pub fn with_detection_url(mut self, url: impl Into<String>) -> Self {
        self.detection_url = url.into();
        self
    }

    /// With a custom scenario list
    #[inline]
    #[must_use]
    pub fn with_scenarios(mut self, scenarios: Vec<ScenarioConfig>) -> Self {
        self.scenarios = Some(scenarios);
        self
    }

    /// Bounded wait for `cleanup_all`
    #[inline]
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Per-call orchestration timeout
    #[inline]
    #[must_use]
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Detection request timeout
    #[inline]
    #[must_use]
    pub fn detection_timeout(&self) -> Duration {
        Duration::from_secs(self.detection_timeout_secs)
    }

    /// `status --watch` interval
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Check settings and build the catalog once to surface scenario errors
    ///
    /// # Errors
    /// Returns the first problem found as a `ConfigError`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::InvalidSetting {
            field,
            reason: reason.to_string(),
        };

        if self.namespace.trim().is_empty() {
            return Err(invalid("namespace", "must not be empty"));
        }
        if self.target_deployment.trim().is_empty() {
            return Err(invalid("target_deployment", "must not be empty"));
        }
        if self.kubectl.trim().is_empty() {
            return Err(invalid("kubectl", "must not be empty"));
        }
        if self.lock_timeout_ms == 0 {
            return Err(invalid("lock_timeout_ms", "must be positive"));
        }
        if self.api_timeout_secs == 0 {
            return Err(invalid("api_timeout_secs", "must be positive"));
        }
        if self.poll_interval_secs == 0 {
            return Err(invalid("poll_interval_secs", "must be positive"));
        }
        if let Err(e) = reqwest::Url::parse(&self.detection_url) {
            return Err(invalid("detection_url", &e.to_string()));
        }
        if self.scenarios.as_ref().is_some_and(Vec::is_empty) {
            return Err(invalid("scenarios", "list is empty; omit it to use the built-ins"));
        }

        self.catalog().map(|_| ())
    }

    /// Scenario catalog: the configured list, or the built-ins
    ///
    /// # Errors
    /// - `ConfigError::DuplicateScenario` for repeated names
    /// - `ConfigError::InvalidScenario` for unusable definitions, for a
    ///   selector that matches another scenario's artifact, and for two
    ///   scenarios restoring different baselines to one deployment field
    pub fn catalog(&self) -> Result<ScenarioCatalog, ConfigError> {
        let Some(scenarios) = &self.scenarios else {
            return ScenarioCatalog::builtin(&self.target_deployment);
        };

        let definitions = scenarios
            .iter()
            .cloned()
            .map(ScenarioConfig::into_definition)
            .collect::<Result<Vec<_>, _>>()?;
        let catalog = ScenarioCatalog::new(definitions)?;

        let definitions: Vec<_> = catalog.iter().collect();
        for (i, def) in definitions.iter().enumerate() {
            for earlier in &definitions[..i] {
                // One scenario's cleanup must never delete another's artifact
                let overlaps = def.artifact_selector.matches(&earlier.artifact_labels())
                    || earlier.artifact_selector.matches(&def.artifact_labels());
                if overlaps {
                    return Err(ConfigError::InvalidScenario {
                        name: def.name.clone(),
                        reason: format!(
                            "artifact selector {} overlaps with scenario {} ({})",
                            def.artifact_selector, earlier.name, earlier.artifact_selector
                        ),
                    });
                }
            }
        }

        let mut baselines: BTreeMap<(String, String), (&str, BaselineValue)> = BTreeMap::new();
        for def in catalog.mutation_scenarios() {
            let Some(baseline) = def.baseline() else {
                continue;
            };
            match baselines.entry(baseline_field(&baseline)) {
                Entry::Vacant(slot) => {
                    slot.insert((def.name.as_str(), baseline));
                }
                Entry::Occupied(slot) if slot.get().1 != baseline => {
                    let (other, existing) = slot.get();
                    return Err(ConfigError::InvalidScenario {
                        name: def.name.clone(),
                        reason: format!("baseline {baseline} conflicts with {existing} from scenario {other}"),
                    });
                }
                Entry::Occupied(_) => {}
            }
        }

        Ok(catalog)
    }
}

/// Deployment field a baseline writes
fn baseline_field(baseline: &BaselineValue) -> (String, String) {
    match baseline {
        BaselineValue::Replicas { deployment, .. } => (deployment.clone(), "replicas".to_string()),
        BaselineValue::Limit {
            deployment, resource, ..
        } => (deployment.clone(), format!("limits.{resource}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{names, EphemeralWorkloadSpec};
    use crate::types::{Quantity, ResourceName};
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_is_default() {
        let config = ChaosConfig::from_toml("").unwrap();
        assert_eq!(config, ChaosConfig::default());
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.catalog().unwrap().len(), names::ALL.len());
    }

    #[test]
    fn overrides_and_custom_scenarios() {
        let raw = r#"
namespace = "staging"
target_deployment = "checkout"
lock_timeout_ms = 250
state_file = "/tmp/infraguard/state.json"

[[scenarios]]
name = "half-capacity"
description = "Run on one replica"
[scenarios.action]
kind = "scale"
deployment = "checkout"
replicas = 1
baseline_replicas = 2

[[scenarios]]
name = "cpu-squeeze"
[scenarios.action]
kind = "patch-limit"
deployment = "checkout"
resource = "cpu"
value = "100m"
baseline = "500m"
"#;
        let config = ChaosConfig::from_toml(raw).unwrap();
        assert_eq!(config.namespace, "staging");
        assert_eq!(config.lock_timeout(), Duration::from_millis(250));

        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["cpu-squeeze", "half-capacity"]);

        match &catalog.resolve("cpu-squeeze").unwrap().action {
            ScenarioAction::PatchLimit { resource, value, .. } => {
                assert_eq!(*resource, ResourceName::Cpu);
                assert_eq!(value, &"100m".parse::<Quantity>().unwrap());
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(matches!(
            ChaosConfig::from_toml("namespace = \"\""),
            Err(ConfigError::InvalidSetting { field: "namespace", .. })
        ));
        assert!(matches!(
            ChaosConfig::from_toml("lock_timeout_ms = 0"),
            Err(ConfigError::InvalidSetting { field: "lock_timeout_ms", .. })
        ));
        assert!(matches!(
            ChaosConfig::from_toml("detection_url = \"not a url\""),
            Err(ConfigError::InvalidSetting { field: "detection_url", .. })
        ));
        assert!(matches!(
            ChaosConfig::from_toml("unknown_key = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_bad_quantity() {
        let raw = r#"
[[scenarios]]
name = "squeeze"
[scenarios.action]
kind = "patch-limit"
deployment = "sample-app"
resource = "memory"
value = "lots"
baseline = "64Mi"
"#;
        assert!(matches!(ChaosConfig::from_toml(raw), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_shared_selector() {
        let scale = |name: &str, replicas| ScenarioConfig {
            name: name.to_string(),
            description: String::new(),
            action: ScenarioAction::Scale {
                deployment: "sample-app".to_string(),
                replicas,
                baseline_replicas: 3,
            },
            artifact_selector: Some("team=chaos".parse().unwrap()),
        };
        let config = ChaosConfig::new().with_scenarios(vec![scale("a", 0), scale("b", 1)]);

        assert!(matches!(
            config.catalog(),
            Err(ConfigError::InvalidScenario { name, .. }) if name == "b"
        ));
    }

    #[test]
    fn rejects_selector_contained_in_another() {
        let raw = r#"
[[scenarios]]
name = "hog-a"
artifact_selector = "team=chaos"
[scenarios.action]
kind = "ephemeral"
name = "hog-a"
image = "busybox"

[[scenarios]]
name = "hog-b"
artifact_selector = "team=chaos,variant=b"
[scenarios.action]
kind = "ephemeral"
name = "hog-b"
image = "busybox"
"#;
        assert!(matches!(
            ChaosConfig::from_toml(raw),
            Err(ConfigError::InvalidScenario { name, reason })
                if name == "hog-b" && reason.contains("hog-a")
        ));
    }

    #[test]
    fn rejects_selector_matching_extra_labels() {
        let spec = EphemeralWorkloadSpec::new("hog-b", "busybox").with_label("team", "chaos");
        let config = ChaosConfig::new().with_scenarios(vec![
            ScenarioConfig {
                name: "hog-a".to_string(),
                description: String::new(),
                action: ScenarioAction::Ephemeral(EphemeralWorkloadSpec::new("hog-a", "busybox")),
                artifact_selector: Some("team=chaos".parse().unwrap()),
            },
            ScenarioConfig {
                name: "hog-b".to_string(),
                description: String::new(),
                action: ScenarioAction::Ephemeral(spec),
                artifact_selector: None,
            },
        ]);

        assert!(matches!(config.catalog(), Err(ConfigError::InvalidScenario { .. })));
    }

    #[test]
    fn rejects_conflicting_baselines() {
        let raw = r#"
[[scenarios]]
name = "half-capacity"
[scenarios.action]
kind = "scale"
deployment = "sample-app"
replicas = 1
baseline_replicas = 2

[[scenarios]]
name = "outage"
[scenarios.action]
kind = "scale"
deployment = "sample-app"
replicas = 0
baseline_replicas = 3
"#;
        assert!(matches!(
            ChaosConfig::from_toml(raw),
            Err(ConfigError::InvalidScenario { name, .. }) if name == "outage"
        ));

        // Same field on another deployment is independent
        let ok = raw.replacen("deployment = \"sample-app\"\nreplicas = 0", "deployment = \"checkout\"\nreplicas = 0", 1);
        assert!(ChaosConfig::from_toml(&ok).is_ok());
    }

    #[test]
    fn rejects_duplicate_names() {
        let raw = r#"
[[scenarios]]
name = "outage"
[scenarios.action]
kind = "scale"
deployment = "sample-app"
replicas = 0
baseline_replicas = 2

[[scenarios]]
name = "outage"
[scenarios.action]
kind = "scale"
deployment = "sample-app"
replicas = 1
baseline_replicas = 2
"#;
        assert!(matches!(
            ChaosConfig::from_toml(raw),
            Err(ConfigError::DuplicateScenario(name)) if name == "outage"
        ));
    }
}

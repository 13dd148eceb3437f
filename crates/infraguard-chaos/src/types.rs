//! Core value types shared across the controller
//!
//! - `IncidentKey`: the `(scenario, namespace)` pair that identifies one
//!   injectable incident and scopes its lock
//! - `LabelSelector`: equality-based selector used to tag and bulk-delete
//!   incident artifacts
//! - `Quantity`: a validated resource quantity such as `64Mi` or `500m`
//! - `ResourceName`: which container resource limit is patched

use crate::error::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Label set attached to a workload object
pub type Labels = BTreeMap<String, String>;

/// Label key stamped on every object created by a scenario
pub const INCIDENT_LABEL_KEY: &str = "infraguard.io/incident";

/// Identity of one incident: which scenario, in which namespace
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IncidentKey {
    /// Scenario name
    pub scenario: String,
    /// Target namespace
    pub namespace: String,
}

impl IncidentKey {
    /// Create new key
    #[inline]
    #[must_use]
    pub fn new(scenario: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for IncidentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.scenario)
    }
}

/// Equality-based label selector (`key=value[,key=value...]`)
///
/// An empty selector is rejected at parse time: bulk deletion with an
/// empty selector would match every object in the namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LabelSelector {
    requirements: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Selector matching a single `key=value` pair
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidSelector` if key or value is not a valid label token.
    pub fn single(key: &str, value: &str) -> Result<Self, ConfigError> {
        format!("{key}={value}").parse()
    }

    /// Selector for the artifacts of one scenario
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidSelector` if the scenario name is not a valid label value.
    pub fn for_scenario(scenario: &str) -> Result<Self, ConfigError> {
        Self::single(INCIDENT_LABEL_KEY, scenario)
    }

    /// Whether every requirement is satisfied by `labels`
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        self.requirements
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }

    /// Requirements as a label set, suitable for stamping on created objects
    #[must_use]
    pub fn as_labels(&self) -> Labels {
        self.requirements.clone()
    }
}

static LABEL_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9]([-a-z0-9.]*[a-z0-9])?/)?[A-Za-z0-9]([-A-Za-z0-9_.]{0,61}[A-Za-z0-9])?$")
        .expect("label key pattern is valid")
});

static LABEL_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]{0,61}[A-Za-z0-9])?$")
        .expect("label value pattern is valid")
});

impl FromStr for LabelSelector {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut requirements = BTreeMap::new();

        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidSelector(s.to_string()))?;
            let (key, value) = (key.trim(), value.trim());

            if !LABEL_KEY.is_match(key) || !LABEL_VALUE.is_match(value) {
                return Err(ConfigError::InvalidSelector(s.to_string()));
            }
            if requirements.insert(key.to_string(), value.to_string()).is_some() {
                return Err(ConfigError::InvalidSelector(s.to_string()));
            }
        }

        if requirements.is_empty() {
            return Err(ConfigError::InvalidSelector(s.to_string()));
        }

        Ok(Self { requirements })
    }
}

impl TryFrom<String> for LabelSelector {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LabelSelector> for String {
    fn from(value: LabelSelector) -> Self {
        value.to_string()
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.requirements {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

static QUANTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?(m|k|M|G|T|Ki|Mi|Gi|Ti)?$").expect("quantity pattern is valid")
});

/// Resource quantity in orchestration notation (`64Mi`, `500m`, `2`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity(String);

impl Quantity {
    /// Whether `raw` is a well-formed quantity
    #[must_use]
    pub fn is_valid(raw: &str) -> bool {
        QUANTITY.is_match(raw)
    }

    /// Quantity text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value in base units (bytes for memory, cores for cpu)
    #[must_use]
    pub fn value(&self) -> f64 {
        let split = self
            .0
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(self.0.len());
        let (number, suffix) = self.0.split_at(split);
        let multiplier = match suffix {
            "m" => 1e-3,
            "k" => 1e3,
            "M" => 1e6,
            "G" => 1e9,
            "T" => 1e12,
            "Ki" => 1024.0,
            "Mi" => 1024.0 * 1024.0,
            "Gi" => 1024.0 * 1024.0 * 1024.0,
            "Ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
            _ => 1.0,
        };
        number.parse::<f64>().unwrap_or(0.0) * multiplier
    }
}

impl FromStr for Quantity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Self::is_valid(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ConfigError::InvalidQuantity(s.to_string()))
        }
    }
}

impl TryFrom<String> for Quantity {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quantity> for String {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Container resource whose limit a scenario patches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceName {
    /// Memory limit
    Memory,
    /// CPU limit
    Cpu,
}

impl ResourceName {
    /// Field name used by the orchestration API
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceName::Memory => "memory",
            ResourceName::Cpu => "cpu",
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

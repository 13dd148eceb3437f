//! Active-incident tracker
//!
//! Owns the set of active incident records. At most one record exists per
//! `(scenario, namespace)` key. Records are written only by the executors,
//! and only after the orchestration call they describe has succeeded.
//!
//! The tracker lives for the process. It can snapshot to a JSON file so a
//! one-command-per-process operator CLI keeps its view between runs; losing
//! the snapshot only means cleanup falls back to unconditional convergence.

use crate::error::TrackerError;
use crate::types::IncidentKey;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One currently-applied scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveIncidentRecord {
    /// Scenario name
    pub scenario_name: String,
    /// When the injection succeeded
    pub applied_at: DateTime<Utc>,
    /// Namespace it was applied to
    pub target_namespace: String,
}

impl ActiveIncidentRecord {
    /// Record stamped with the current time
    #[must_use]
    pub fn now(key: &IncidentKey) -> Self {
        Self {
            scenario_name: key.scenario.clone(),
            applied_at: Utc::now(),
            target_namespace: key.namespace.clone(),
        }
    }

    /// Key this record occupies
    #[must_use]
    pub fn key(&self) -> IncidentKey {
        IncidentKey::new(&self.scenario_name, &self.target_namespace)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    records: Vec<ActiveIncidentRecord>,
}

/// Concurrent map of active incidents
#[derive(Debug, Default)]
pub struct IncidentTracker {
    records: DashMap<IncidentKey, ActiveIncidentRecord>,
}

impl IncidentTracker {
    /// Empty tracker
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is active
    #[inline]
    #[must_use]
    pub fn is_active(&self, key: &IncidentKey) -> bool {
        self.records.contains_key(key)
    }

    /// Record for `key`, if active
    #[must_use]
    pub fn get(&self, key: &IncidentKey) -> Option<ActiveIncidentRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    /// Insert a record unless its key is already active
    ///
    /// Returns `false` and leaves the existing record untouched if the key
    /// is taken.
    pub fn insert(&self, record: ActiveIncidentRecord) -> bool {
        match self.records.entry(record.key()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Remove and return the record for `key`
    pub fn remove(&self, key: &IncidentKey) -> Option<ActiveIncidentRecord> {
        self.records.remove(key).map(|(_, r)| r)
    }

    /// Records in `namespace`, ordered by scenario name
    #[must_use]
    pub fn records_in(&self, namespace: &str) -> Vec<ActiveIncidentRecord> {
        let mut out: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.key().namespace == namespace)
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| a.scenario_name.cmp(&b.scenario_name));
        out
    }

    /// Every record, ordered by key
    #[must_use]
    pub fn all(&self) -> Vec<ActiveIncidentRecord> {
        let mut out: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        out.sort_by_key(ActiveIncidentRecord::key);
        out
    }

    /// Drop every record in `namespace`, returning how many were dropped
    ///
    /// Other namespaces may gain records concurrently, so only removals
    /// are counted.
    pub fn clear_namespace(&self, namespace: &str) -> usize {
        let mut removed = 0;
        self.records.retain(|k, _| {
            let keep = k.namespace != namespace;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of active records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no incident is active
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Load a snapshot; a missing file yields an empty tracker
    ///
    /// # Errors
    /// - `TrackerError::Io` if the file exists but cannot be read
    /// - `TrackerError::Corrupt` if it does not decode
    /// - `TrackerError::DuplicateRecord` if it holds two records for one key
    pub fn load(path: &Path) -> Result<Self, TrackerError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(TrackerError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let snapshot: Snapshot =
            serde_json::from_str(&raw).map_err(|source| TrackerError::Corrupt {
                path: path.display().to_string(),
                source,
            })?;

        let tracker = Self::new();
        for record in snapshot.records {
            let key = record.key();
            if !tracker.insert(record) {
                return Err(TrackerError::DuplicateRecord(key.to_string()));
            }
        }
        Ok(tracker)
    }

    /// Write a snapshot, replacing the file atomically
    ///
    /// # Errors
    /// Returns `TrackerError::Io` if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), TrackerError> {
        let io_err = |source| TrackerError::Io {
            path: path.display().to_string(),
            source,
        };

        let snapshot = Snapshot { records: self.all() };
        let body = serde_json::to_string_pretty(&snapshot).map_err(|e| io_err(e.into()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, body).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(s: &str, ns: &str) -> IncidentKey {
        IncidentKey::new(s, ns)
    }

    #[test]
    fn insert_refuses_duplicate_key() {
        let tracker = IncidentTracker::new();
        let first = ActiveIncidentRecord::now(&key("cpu-spike", "demo-apps"));

        assert!(tracker.insert(first.clone()));
        assert!(!tracker.insert(ActiveIncidentRecord::now(&key("cpu-spike", "demo-apps"))));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.get(&key("cpu-spike", "demo-apps")), Some(first));
    }

    #[test]
    fn namespaces_are_independent() {
        let tracker = IncidentTracker::new();
        tracker.insert(ActiveIncidentRecord::now(&key("scale-down", "a")));
        tracker.insert(ActiveIncidentRecord::now(&key("crash-loop", "a")));
        tracker.insert(ActiveIncidentRecord::now(&key("scale-down", "b")));

        let names: Vec<_> = tracker
            .records_in("a")
            .into_iter()
            .map(|r| r.scenario_name)
            .collect();
        assert_eq!(names, vec!["crash-loop".to_string(), "scale-down".to_string()]);

        assert_eq!(tracker.clear_namespace("a"), 2);
        assert!(tracker.is_active(&key("scale-down", "b")));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn clear_namespace_tolerates_inserts_elsewhere() {
        let tracker = IncidentTracker::new();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..2_000 {
                    tracker.insert(ActiveIncidentRecord::now(&key(&format!("s-{i}"), "other")));
                }
            });
            scope.spawn(|| {
                for i in 0..2_000 {
                    tracker.insert(ActiveIncidentRecord::now(&key("scale-down", "demo-apps")));
                    assert!(tracker.clear_namespace("demo-apps") <= 1, "iteration {i}");
                }
            });
        });

        assert!(tracker.records_in("demo-apps").is_empty());
        assert_eq!(tracker.records_in("other").len(), 2_000);
    }

    #[test]
    fn remove_returns_record() {
        let tracker = IncidentTracker::new();
        tracker.insert(ActiveIncidentRecord::now(&key("memory-leak", "demo-apps")));

        assert!(tracker.remove(&key("memory-leak", "demo-apps")).is_some());
        assert!(tracker.remove(&key("memory-leak", "demo-apps")).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("incidents.json");

        let tracker = IncidentTracker::new();
        tracker.insert(ActiveIncidentRecord::now(&key("scale-down", "demo-apps")));
        tracker.insert(ActiveIncidentRecord::now(&key("cpu-spike", "demo-apps")));
        tracker.save(&path).unwrap();

        let loaded = IncidentTracker::load(&path).unwrap();
        assert_eq!(loaded.all(), tracker.all());
    }

    #[test]
    fn missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = IncidentTracker::load(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incidents.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            IncidentTracker::load(&path),
            Err(TrackerError::Corrupt { .. })
        ));
    }
}

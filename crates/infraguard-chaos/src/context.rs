//! Shared state handed to both executors

use crate::catalog::ScenarioCatalog;
use crate::events::EventLog;
use crate::locks::KeyedLocks;
use crate::orchestration::OrchestrationClient;
use crate::tracker::IncidentTracker;
use std::fmt;
use std::sync::Arc;

/// Everything an executor touches
///
/// Cloning shares the same tracker, lock table and event log.
#[derive(Clone)]
pub struct ControllerContext {
    /// Scenario definitions
    pub catalog: Arc<ScenarioCatalog>,
    /// Control-plane capability
    pub client: Arc<dyn OrchestrationClient>,
    /// Active incidents
    pub tracker: Arc<IncidentTracker>,
    /// Per-key exclusion
    pub locks: Arc<KeyedLocks>,
    /// Event history
    pub events: Arc<EventLog>,
}

impl ControllerContext {
    /// Fresh tracker, locks and event log around a catalog and client
    #[must_use]
    pub fn new(catalog: ScenarioCatalog, client: Arc<dyn OrchestrationClient>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            client,
            tracker: Arc::new(IncidentTracker::new()),
            locks: Arc::new(KeyedLocks::new()),
            events: Arc::new(EventLog::new()),
        }
    }

    /// Replace the tracker, e.g. with one loaded from a snapshot
    #[inline]
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<IncidentTracker>) -> Self {
        self.tracker = tracker;
        self
    }
}

impl fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerContext")
            .field("scenarios", &self.catalog.len())
            .field("active", &self.tracker.len())
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}

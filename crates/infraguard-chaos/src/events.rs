//! Structured incident events
//!
//! Every injection and cleanup emits one `IncidentEvent`
//! `{scenario, namespace, outcome}`. Events are logged through `tracing`
//! under the `infraguard::events` target, counted through `metrics`, and
//! retained in the process-local `EventLog`.

use crate::error::{ChaosError, ErrorKind};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;

/// Which controller operation produced the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventAction {
    /// `inject`
    Inject,
    /// `cleanup_one`
    Cleanup,
    /// `cleanup_all`
    CleanupAll,
}

impl EventAction {
    /// Stable name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Inject => "inject",
            EventAction::Cleanup => "cleanup",
            EventAction::CleanupAll => "cleanup-all",
        }
    }
}

/// Result of the operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum EventOutcome {
    /// Injection applied
    Applied,
    /// Injection skipped, scenario already active
    AlreadyActive,
    /// Cleanup reverted the scenario
    Recovered,
    /// Cleanup skipped, scenario was not active
    NotActive,
    /// Operation failed; nothing was recorded as changed
    Failed {
        /// Error kind
        kind: ErrorKind,
        /// Human-readable message
        message: String,
    },
}

impl EventOutcome {
    /// Failure outcome for an error
    #[must_use]
    pub fn failed(err: &ChaosError) -> Self {
        Self::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Stable label for metrics
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            EventOutcome::Applied => "applied",
            EventOutcome::AlreadyActive => "already-active",
            EventOutcome::Recovered => "recovered",
            EventOutcome::NotActive => "not-active",
            EventOutcome::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventOutcome::Failed { kind, message } => write!(f, "failed ({kind}): {message}"),
            other => f.write_str(other.label()),
        }
    }
}

/// One observable controller event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentEvent {
    /// When the operation finished
    pub at: DateTime<Utc>,
    /// Operation
    pub action: EventAction,
    /// Scenario, absent for namespace-wide cleanup
    pub scenario: Option<String>,
    /// Target namespace
    pub namespace: String,
    /// Result
    pub outcome: EventOutcome,
}

impl IncidentEvent {
    /// Event stamped now
    #[must_use]
    pub fn new(
        action: EventAction,
        scenario: Option<&str>,
        namespace: &str,
        outcome: EventOutcome,
    ) -> Self {
        Self {
            at: Utc::now(),
            action,
            scenario: scenario.map(str::to_string),
            namespace: namespace.to_string(),
            outcome,
        }
    }
}

/// Process-local event history
#[derive(Debug, Default)]
pub struct EventLog {
    inner: Mutex<Vec<IncidentEvent>>,
}

impl EventLog {
    /// Empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit and retain an event
    pub fn record(&self, event: IncidentEvent) {
        let scenario = event.scenario.as_deref().unwrap_or("*");
        match &event.outcome {
            EventOutcome::Failed { kind, message } => tracing::warn!(
                target: "infraguard::events",
                action = event.action.as_str(),
                scenario,
                namespace = %event.namespace,
                outcome = event.outcome.label(),
                kind = %kind,
                message = %message,
                "incident event"
            ),
            _ => tracing::info!(
                target: "infraguard::events",
                action = event.action.as_str(),
                scenario,
                namespace = %event.namespace,
                outcome = event.outcome.label(),
                "incident event"
            ),
        }

        let counter = match event.action {
            EventAction::Inject => "infraguard_injections_total",
            EventAction::Cleanup | EventAction::CleanupAll => "infraguard_cleanups_total",
        };
        metrics::counter!(
            counter,
            "action" => event.action.as_str(),
            "scenario" => scenario.to_string(),
            "outcome" => event.outcome.label()
        )
        .increment(1);

        self.inner.lock().push(event);
    }

    /// All events in emission order
    #[must_use]
    pub fn events(&self) -> Vec<IncidentEvent> {
        self.inner.lock().clone()
    }

    /// Events for one scenario in one namespace
    #[must_use]
    pub fn events_for(&self, scenario: &str, namespace: &str) -> Vec<IncidentEvent> {
        self.inner
            .lock()
            .iter()
            .filter(|e| e.scenario.as_deref() == Some(scenario) && e.namespace == namespace)
            .cloned()
            .collect()
    }

    /// Number of retained events
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing was recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

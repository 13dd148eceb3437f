//! Error types for the fault controller
//!
//! Two layers:
//! - `OrchestrationError`: failures reported by the orchestration client
//! - `ChaosError`: controller-level failures, which carry orchestration
//!   failures through unchanged so the caller sees the original kind
//!
//! `AlreadyActive` is not an error here. It is an injection outcome
//! (see `InjectionResult`), reported with `ErrorKind::AlreadyActive` only
//! when a caller needs a uniform kind for display.

use std::fmt;

/// Failures at the orchestration client boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestrationError {
    /// An object with the same identity already exists
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        /// Object kind (e.g. `pod`)
        kind: String,
        /// Namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// The target deployment does not exist
    #[error("{kind} {namespace}/{name} not found")]
    TargetNotFound {
        /// Object kind (e.g. `deployment`)
        kind: String,
        /// Namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// The API rejected a value
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Timeout, connection failure, or any other non-definitive failure
    #[error("transient API error: {0}")]
    Transient(String),
}

/// Main controller error type
#[derive(Debug, thiserror::Error)]
pub enum ChaosError {
    /// Scenario name is not in the catalog
    #[error("scenario not found: {0}")]
    ScenarioNotFound(String),

    /// Could not acquire all needed locks within the bounded wait
    #[error("busy: could not lock {pending} incident key(s) in namespace {namespace} within {waited_ms}ms")]
    Busy {
        /// Namespace being cleaned
        namespace: String,
        /// Keys still contended when the wait expired
        pending: usize,
        /// Bounded wait that expired
        waited_ms: u64,
    },

    /// Orchestration failure, kind preserved
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    /// Tracker snapshot could not be read or written
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

impl ChaosError {
    /// Classification for reporting and exit codes
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ScenarioNotFound(_) => ErrorKind::ScenarioNotFound,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::Orchestration(OrchestrationError::AlreadyExists { .. }) => ErrorKind::AlreadyExists,
            Self::Orchestration(OrchestrationError::TargetNotFound { .. }) => {
                ErrorKind::TargetNotFound
            }
            Self::Orchestration(OrchestrationError::InvalidValue(_)) => ErrorKind::InvalidValue,
            Self::Orchestration(OrchestrationError::Transient(_)) => ErrorKind::TransientApiError,
            Self::Tracker(_) => ErrorKind::Tracker,
        }
    }

    /// Check if a caller-driven retry is meaningful
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientApiError | ErrorKind::Busy)
    }
}

/// Error kinds surfaced to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    /// Unknown scenario name
    ScenarioNotFound,
    /// Scenario already applied (non-fatal)
    AlreadyActive,
    /// Object identity collision
    AlreadyExists,
    /// Target deployment missing
    TargetNotFound,
    /// Rejected value
    InvalidValue,
    /// Retryable API failure
    #[serde(rename = "TransientAPIError")]
    TransientApiError,
    /// Lock wait expired
    Busy,
    /// Tracker snapshot failure
    #[serde(rename = "TrackerError")]
    Tracker,
}

impl ErrorKind {
    /// Stable name for logs and CLI output
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ScenarioNotFound => "ScenarioNotFound",
            ErrorKind::AlreadyActive => "AlreadyActive",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::TargetNotFound => "TargetNotFound",
            ErrorKind::InvalidValue => "InvalidValue",
            ErrorKind::TransientApiError => "TransientAPIError",
            ErrorKind::Busy => "Busy",
            ErrorKind::Tracker => "TrackerError",
        }
    }

    /// Whether this kind is a successful no-op from the operator's view
    #[inline]
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, ErrorKind::AlreadyActive)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration and catalog loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Label selector could not be parsed
    #[error("invalid label selector: {0:?}")]
    InvalidSelector(String),

    /// Resource quantity is malformed
    #[error("invalid resource quantity: {0:?}")]
    InvalidQuantity(String),

    /// Two scenarios share a name
    #[error("duplicate scenario name: {0}")]
    DuplicateScenario(String),

    /// Scenario definition is unusable
    #[error("invalid scenario {name}: {reason}")]
    InvalidScenario {
        /// Scenario name
        name: String,
        /// What is wrong
        reason: String,
    },

    /// A top-level setting is out of range
    #[error("invalid setting {field}: {reason}")]
    InvalidSetting {
        /// Setting name as written in the file
        field: &'static str,
        /// What is wrong
        reason: String,
    },

    /// Config file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tracker snapshot persistence errors
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Snapshot file could not be read or written
    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        /// Snapshot path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Snapshot file is corrupt
    #[error("snapshot {path} is corrupt: {source}")]
    Corrupt {
        /// Snapshot path
        path: String,
        /// Decode error
        #[source]
        source: serde_json::Error,
    },

    /// Snapshot holds two records for one key
    #[error("snapshot holds duplicate record for {0}")]
    DuplicateRecord(String),
}

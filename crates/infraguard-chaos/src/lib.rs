//! InfraGuard Chaos - fault injection and recovery controller
//!
//! Deliberately breaks a demo namespace in well-defined ways so incident
//! detection and remediation can be exercised, then puts it back:
//! - Resolves named scenarios from an immutable catalog
//! - Applies them through an orchestration client, at most once per
//!   `(scenario, namespace)` at a time
//! - Tracks what is active and reverts it, one scenario or the whole
//!   namespace
//! - Emits a structured event for every injection and cleanup
//!
//! # Example
//!
//! ```rust,ignore
//! use infraguard_chaos::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cluster = Arc::new(InMemoryCluster::new());
//! let controller = FaultController::new(ScenarioCatalog::builtin("sample-app")?, cluster);
//!
//! controller.inject("scale-down", "demo-apps").await?;
//! let report = controller.cleanup_all("demo-apps").await?;
//!
//! println!("restored {} baselines", report.baselines_restored.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod catalog;
pub mod config;
pub mod context;
pub mod controller;
pub mod detection;
pub mod error;
pub mod events;
pub mod injection;
pub mod locks;
pub mod logging;
pub mod orchestration;
pub mod recovery;
pub mod tracker;
pub mod types;

// Re-exports for convenience
pub use catalog::{
    names, BaselineValue, EphemeralWorkloadSpec, ScenarioAction, ScenarioCatalog,
    ScenarioDefinition, TargetKind,
};
pub use config::{ChaosConfig, ScenarioConfig};
pub use context::ControllerContext;
pub use controller::{FaultController, DEFAULT_LOCK_TIMEOUT};
pub use detection::{DetectedIncident, DetectionClient, DetectionReport};
pub use error::{ChaosError, ConfigError, ErrorKind, OrchestrationError, TrackerError};
pub use events::{EventAction, EventLog, EventOutcome, IncidentEvent};
pub use injection::{InjectionExecutor, InjectionResult};
pub use orchestration::{
    ClusterSnapshot, DeploymentState, InMemoryCluster, KubectlClient, OrchestrationClient,
    WorkloadHandle,
};
pub use recovery::{CleanupReport, CleanupResult, RecoveryExecutor};
pub use tracker::{ActiveIncidentRecord, IncidentTracker};
pub use types::{IncidentKey, LabelSelector, Labels, Quantity, ResourceName};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the controller
    pub use crate::{
        ChaosConfig, ChaosError, CleanupReport, CleanupResult, ErrorKind, FaultController,
        InMemoryCluster, IncidentKey, InjectionResult, KubectlClient, OrchestrationClient,
        ScenarioCatalog,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

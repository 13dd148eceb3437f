//! Injection executor
//!
//! Applies one scenario to one namespace:
//! 1. Resolve the scenario (unknown names fail before any client call)
//! 2. Take the key lock and check the tracker; an active key is a no-op
//! 3. Dispatch on the scenario's target kind
//! 4. Record the incident only after the client reported success
//! 5. Emit an event with the outcome
//!
//! An `AlreadyExists` answer for this scenario's own artifact means the
//! incident is live in the cluster but unknown to the tracker (e.g. the
//! process restarted). It is adopted into the tracker and reported as
//! `AlreadyActive`.

use crate::catalog::{ScenarioAction, ScenarioDefinition};
use crate::context::ControllerContext;
use crate::error::{ChaosError, OrchestrationError};
use crate::events::{EventAction, EventOutcome, IncidentEvent};
use crate::orchestration::WorkloadHandle;
use crate::tracker::ActiveIncidentRecord;
use crate::types::IncidentKey;
use tracing::{debug, info, instrument, warn};

/// Successful result of `inject`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionResult {
    /// The scenario was applied by this call
    Applied {
        /// New tracker record
        record: ActiveIncidentRecord,
        /// Artifact created, for ephemeral scenarios
        handle: Option<WorkloadHandle>,
    },
    /// The scenario was already active; nothing was changed
    AlreadyActive {
        /// Existing (or adopted) record
        record: ActiveIncidentRecord,
        /// Found in the cluster rather than in the tracker
        adopted: bool,
    },
}

impl InjectionResult {
    /// Tracker record for the incident
    #[inline]
    #[must_use]
    pub fn record(&self) -> &ActiveIncidentRecord {
        match self {
            Self::Applied { record, .. } | Self::AlreadyActive { record, .. } => record,
        }
    }

    /// Whether this call changed nothing
    #[inline]
    #[must_use]
    pub fn is_already_active(&self) -> bool {
        matches!(self, Self::AlreadyActive { .. })
    }
}

/// Applies scenarios
#[derive(Debug, Clone)]
pub struct InjectionExecutor {
    ctx: ControllerContext,
}

impl InjectionExecutor {
    /// Executor over shared controller state
    #[inline]
    #[must_use]
    pub fn new(ctx: ControllerContext) -> Self {
        Self { ctx }
    }

    /// Apply `scenario_name` to `namespace`
    ///
    /// # Errors
    /// - `ChaosError::ScenarioNotFound` for unknown names, with no client call
    /// - `ChaosError::Orchestration` with the client's kind; nothing is recorded
    #[instrument(skip(self), fields(scenario = %scenario_name, namespace = %namespace))]
    pub async fn inject(
        &self,
        scenario_name: &str,
        namespace: &str,
    ) -> Result<InjectionResult, ChaosError> {
        let result = self.try_inject(scenario_name, namespace).await;

        let outcome = match &result {
            Ok(InjectionResult::Applied { .. }) => EventOutcome::Applied,
            Ok(InjectionResult::AlreadyActive { .. }) => EventOutcome::AlreadyActive,
            Err(e) => EventOutcome::failed(e),
        };
        self.ctx.events.record(IncidentEvent::new(
            EventAction::Inject,
            Some(scenario_name),
            namespace,
            outcome,
        ));

        result
    }

    async fn try_inject(
        &self,
        scenario_name: &str,
        namespace: &str,
    ) -> Result<InjectionResult, ChaosError> {
        let scenario = self.ctx.catalog.resolve(scenario_name)?;
        let key = IncidentKey::new(scenario_name, namespace);

        let _guard = self.ctx.locks.lock(&key).await;

        if let Some(record) = self.ctx.tracker.get(&key) {
            debug!(applied_at = %record.applied_at, "scenario already active");
            return Ok(InjectionResult::AlreadyActive {
                record,
                adopted: false,
            });
        }

        let handle = match self.dispatch(scenario, namespace).await {
            Ok(handle) => handle,
            Err(OrchestrationError::AlreadyExists {
                namespace: ref existing_ns,
                ref name,
                ..
            }) if existing_ns == namespace && self.ctx.catalog.is_artifact_of(scenario_name, name) => {
                warn!(artifact = %name, "artifact already present in cluster, adopting");
                let record = ActiveIncidentRecord::now(&key);
                self.ctx.tracker.insert(record.clone());
                return Ok(InjectionResult::AlreadyActive {
                    record,
                    adopted: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let record = ActiveIncidentRecord::now(&key);
        self.ctx.tracker.insert(record.clone());
        info!(target_kind = %scenario.target_kind(), "scenario injected");

        Ok(InjectionResult::Applied { record, handle })
    }

    async fn dispatch(
        &self,
        scenario: &ScenarioDefinition,
        namespace: &str,
    ) -> Result<Option<WorkloadHandle>, OrchestrationError> {
        let client = &self.ctx.client;
        match &scenario.action {
            ScenarioAction::Ephemeral(spec) => client
                .create_ephemeral_workload(namespace, spec, &scenario.artifact_labels())
                .await
                .map(Some),
            ScenarioAction::Scale {
                deployment,
                replicas,
                ..
            } => client
                .scale_deployment(namespace, deployment, *replicas)
                .await
                .map(|()| None),
            ScenarioAction::PatchLimit {
                deployment,
                resource,
                value,
                ..
            } => client
                .patch_deployment_resource_limit(namespace, deployment, *resource, value)
                .await
                .map(|()| None),
        }
    }
}

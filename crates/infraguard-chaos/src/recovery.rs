//! Recovery executor
//!
//! `cleanup_one` reverts a single active scenario. `cleanup_all` is the
//! namespace-wide reset: it deletes every scenario artifact and restores
//! every baseline whether or not the tracker believes anything is active,
//! so it converges the cluster even after the tracker lost state.

use crate::catalog::{BaselineValue, ScenarioDefinition};
use crate::context::ControllerContext;
use crate::error::{ChaosError, OrchestrationError};
use crate::events::{EventAction, EventOutcome, IncidentEvent};
use crate::tracker::ActiveIncidentRecord;
use crate::types::IncidentKey;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Successful result of `cleanup_one`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupResult {
    /// The scenario was reverted and its record removed
    Recovered {
        /// Record that was removed
        record: ActiveIncidentRecord,
        /// Artifacts the client reported deleted
        artifacts_deleted: usize,
        /// Baseline restored, for mutation scenarios
        baseline: Option<BaselineValue>,
    },
    /// Nothing was active; no orchestration call was made
    NotActive,
}

/// Summary of a namespace-wide cleanup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Namespace that was reset
    pub namespace: String,
    /// Artifacts the client reported deleted
    pub artifacts_deleted: usize,
    /// Baselines written back
    pub baselines_restored: Vec<BaselineValue>,
    /// Records that were active before the reset
    pub records_cleared: Vec<ActiveIncidentRecord>,
}

impl CleanupReport {
    /// Whether the reset found nothing to undo in the tracker
    #[inline]
    #[must_use]
    pub fn was_clean(&self) -> bool {
        self.records_cleared.is_empty()
    }
}

/// Reverts scenarios
#[derive(Debug, Clone)]
pub struct RecoveryExecutor {
    ctx: ControllerContext,
    lock_timeout: Duration,
}

impl RecoveryExecutor {
    /// Executor over shared controller state
    ///
    /// `lock_timeout` bounds how long `cleanup_all` waits for in-flight
    /// operations in the namespace.
    #[inline]
    #[must_use]
    pub fn new(ctx: ControllerContext, lock_timeout: Duration) -> Self {
        Self { ctx, lock_timeout }
    }

    /// Revert one scenario in one namespace
    ///
    /// The record is removed only after every revert step succeeded; on
    /// failure it stays so the cleanup can be retried.
    ///
    /// # Errors
    /// - `ChaosError::ScenarioNotFound` for unknown names
    /// - `ChaosError::Orchestration` if a revert step failed
    #[instrument(skip(self), fields(scenario = %scenario_name, namespace = %namespace))]
    pub async fn cleanup_one(
        &self,
        scenario_name: &str,
        namespace: &str,
    ) -> Result<CleanupResult, ChaosError> {
        let result = self.try_cleanup_one(scenario_name, namespace).await;

        let outcome = match &result {
            Ok(CleanupResult::Recovered { .. }) => EventOutcome::Recovered,
            Ok(CleanupResult::NotActive) => EventOutcome::NotActive,
            Err(e) => EventOutcome::failed(e),
        };
        self.ctx.events.record(IncidentEvent::new(
            EventAction::Cleanup,
            Some(scenario_name),
            namespace,
            outcome,
        ));

        result
    }

    async fn try_cleanup_one(
        &self,
        scenario_name: &str,
        namespace: &str,
    ) -> Result<CleanupResult, ChaosError> {
        let scenario = self.ctx.catalog.resolve(scenario_name)?;
        let key = IncidentKey::new(scenario_name, namespace);

        let _guard = self.ctx.locks.lock(&key).await;

        let Some(record) = self.ctx.tracker.get(&key) else {
            debug!("scenario not active, nothing to clean up");
            return Ok(CleanupResult::NotActive);
        };

        let (artifacts_deleted, baseline) = self.revert(scenario, namespace).await?;

        self.ctx.tracker.remove(&key);
        info!(artifacts_deleted, "scenario recovered");

        Ok(CleanupResult::Recovered {
            record,
            artifacts_deleted,
            baseline,
        })
    }

    async fn revert(
        &self,
        scenario: &ScenarioDefinition,
        namespace: &str,
    ) -> Result<(usize, Option<BaselineValue>), OrchestrationError> {
        let deleted = self
            .ctx
            .client
            .delete_workloads_by_selector(namespace, &scenario.artifact_selector)
            .await?;

        let baseline = scenario.baseline();
        if let Some(baseline) = &baseline {
            self.restore_baseline(namespace, baseline).await?;
        }

        Ok((deleted, baseline))
    }

    /// Reset a namespace to its baseline
    ///
    /// Waits at most `lock_timeout` for in-flight operations on any
    /// catalog key in the namespace. Running it twice in a row leaves the
    /// cluster unchanged the second time.
    ///
    /// # Errors
    /// - `ChaosError::Busy` if the keys could not be locked in time
    /// - `ChaosError::Orchestration` if a delete or restore failed; records
    ///   are kept in that case
    #[instrument(skip(self), fields(namespace = %namespace))]
    pub async fn cleanup_all(&self, namespace: &str) -> Result<CleanupReport, ChaosError> {
        let result = self.try_cleanup_all(namespace).await;

        let outcome = match &result {
            Ok(report) if report.was_clean() => EventOutcome::NotActive,
            Ok(_) => EventOutcome::Recovered,
            Err(e) => EventOutcome::failed(e),
        };
        self.ctx.events.record(IncidentEvent::new(
            EventAction::CleanupAll,
            None,
            namespace,
            outcome,
        ));

        result
    }

    async fn try_cleanup_all(&self, namespace: &str) -> Result<CleanupReport, ChaosError> {
        // Records left by scenarios no longer in the catalog are cleared too
        let keys: BTreeSet<IncidentKey> = self
            .ctx
            .catalog
            .names()
            .map(|name| IncidentKey::new(name, namespace))
            .chain(self.ctx.tracker.records_in(namespace).iter().map(ActiveIncidentRecord::key))
            .collect();

        let _guards = self
            .ctx
            .locks
            .lock_all(keys, self.lock_timeout)
            .await
            .map_err(|pending| ChaosError::Busy {
                namespace: namespace.to_string(),
                pending,
                waited_ms: u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX),
            })?;

        let active = self.ctx.tracker.records_in(namespace);
        for record in &active {
            debug!(scenario = %record.scenario_name, applied_at = %record.applied_at, "active before reset");
        }

        let mut artifacts_deleted = 0;
        for selector in self.ctx.catalog.artifact_selectors() {
            artifacts_deleted += self
                .ctx
                .client
                .delete_workloads_by_selector(namespace, &selector)
                .await?;
        }

        let mut baselines_restored: Vec<BaselineValue> = Vec::new();
        for baseline in self.ctx.catalog.mutation_scenarios().filter_map(ScenarioDefinition::baseline) {
            if baselines_restored.contains(&baseline) {
                continue;
            }
            self.restore_baseline(namespace, &baseline).await?;
            baselines_restored.push(baseline);
        }

        let cleared = self.ctx.tracker.clear_namespace(namespace);
        info!(
            artifacts_deleted,
            baselines = baselines_restored.len(),
            cleared,
            "namespace reset"
        );

        Ok(CleanupReport {
            namespace: namespace.to_string(),
            artifacts_deleted,
            baselines_restored,
            records_cleared: active,
        })
    }

    /// Write one baseline value back to its deployment
    ///
    /// # Errors
    /// Propagates the client's error unchanged.
    pub async fn restore_baseline(
        &self,
        namespace: &str,
        baseline: &BaselineValue,
    ) -> Result<(), OrchestrationError> {
        debug!(%baseline, "restoring baseline");
        match baseline {
            BaselineValue::Replicas {
                deployment,
                replicas,
            } => {
                self.ctx
                    .client
                    .scale_deployment(namespace, deployment, *replicas)
                    .await
            }
            BaselineValue::Limit {
                deployment,
                resource,
                value,
            } => {
                self.ctx
                    .client
                    .patch_deployment_resource_limit(namespace, deployment, *resource, value)
                    .await
            }
        }
    }
}

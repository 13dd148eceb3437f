//! Fault controller facade
//!
//! Single entry point for callers: wires the catalog, orchestration
//! client, tracker, lock table and event log together and exposes the
//! injection and recovery operations over them.

use crate::catalog::ScenarioCatalog;
use crate::config::ChaosConfig;
use crate::context::ControllerContext;
use crate::error::ChaosError;
use crate::events::EventLog;
use crate::injection::{InjectionExecutor, InjectionResult};
use crate::orchestration::OrchestrationClient;
use crate::recovery::{CleanupReport, CleanupResult, RecoveryExecutor};
use crate::tracker::{ActiveIncidentRecord, IncidentTracker};
use std::sync::Arc;
use std::time::Duration;

/// Default bounded wait for `cleanup_all`
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Fault injection and recovery controller
#[derive(Debug, Clone)]
pub struct FaultController {
    ctx: ControllerContext,
    injector: InjectionExecutor,
    recovery: RecoveryExecutor,
}

impl FaultController {
    /// Controller with a fresh tracker and the default lock timeout
    #[must_use]
    pub fn new(catalog: ScenarioCatalog, client: Arc<dyn OrchestrationClient>) -> Self {
        Self::from_context(ControllerContext::new(catalog, client), DEFAULT_LOCK_TIMEOUT)
    }

    /// Controller over existing shared state
    #[must_use]
    pub fn from_context(ctx: ControllerContext, lock_timeout: Duration) -> Self {
        Self {
            injector: InjectionExecutor::new(ctx.clone()),
            recovery: RecoveryExecutor::new(ctx.clone(), lock_timeout),
            ctx,
        }
    }

    /// Controller built from configuration
    ///
    /// # Errors
    /// Returns `ConfigError` if the configured catalog is invalid.
    pub fn from_config(
        config: &ChaosConfig,
        client: Arc<dyn OrchestrationClient>,
        tracker: Arc<IncidentTracker>,
    ) -> Result<Self, crate::error::ConfigError> {
        let ctx = ControllerContext::new(config.catalog()?, client).with_tracker(tracker);
        Ok(Self::from_context(ctx, config.lock_timeout()))
    }

    /// Apply a scenario to a namespace
    ///
    /// # Errors
    /// See [`InjectionExecutor::inject`].
    pub async fn inject(
        &self,
        scenario: &str,
        namespace: &str,
    ) -> Result<InjectionResult, ChaosError> {
        self.injector.inject(scenario, namespace).await
    }

    /// Revert one scenario in a namespace
    ///
    /// # Errors
    /// See [`RecoveryExecutor::cleanup_one`].
    pub async fn cleanup_one(
        &self,
        scenario: &str,
        namespace: &str,
    ) -> Result<CleanupResult, ChaosError> {
        self.recovery.cleanup_one(scenario, namespace).await
    }

    /// Reset a namespace to baseline
    ///
    /// # Errors
    /// See [`RecoveryExecutor::cleanup_all`].
    pub async fn cleanup_all(&self, namespace: &str) -> Result<CleanupReport, ChaosError> {
        self.recovery.cleanup_all(namespace).await
    }

    /// Active incidents in a namespace, ordered by scenario
    #[must_use]
    pub fn active_incidents(&self, namespace: &str) -> Vec<ActiveIncidentRecord> {
        self.ctx.tracker.records_in(namespace)
    }

    /// Scenario catalog
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.ctx.catalog
    }

    /// Tracker, shared with the executors
    #[inline]
    #[must_use]
    pub fn tracker(&self) -> &Arc<IncidentTracker> {
        &self.ctx.tracker
    }

    /// Event history
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.ctx.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::names;
    use crate::error::ErrorKind;
    use crate::orchestration::MockOrchestrationClient;

    fn controller_with(mock: MockOrchestrationClient) -> FaultController {
        FaultController::new(ScenarioCatalog::builtin("sample-app").unwrap(), Arc::new(mock))
    }

    #[tokio::test]
    async fn second_inject_is_already_active_without_calls() {
        let mut mock = MockOrchestrationClient::new();
        mock.expect_create_ephemeral_workload()
            .times(1)
            .returning(|ns, spec, _| Ok(crate::orchestration::WorkloadHandle::pod(ns, &spec.name)));

        let controller = controller_with(mock);
        let first = controller.inject(names::CRASH_LOOP, "demo-apps").await.unwrap();
        let second = controller.inject(names::CRASH_LOOP, "demo-apps").await.unwrap();

        assert!(!first.is_already_active());
        assert!(second.is_already_active());
        assert_eq!(first.record(), second.record());
        assert_eq!(controller.active_incidents("demo-apps").len(), 1);
    }

    #[tokio::test]
    async fn unknown_cleanup_never_reaches_client() {
        let mut mock = MockOrchestrationClient::new();
        mock.expect_delete_workloads_by_selector().never();

        let controller = controller_with(mock);
        let err = controller.cleanup_one("disk-fill", "demo-apps").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ScenarioNotFound);
        assert_eq!(controller.events().len(), 1);
    }

    #[tokio::test]
    async fn namespaces_are_independent() {
        let mut mock = MockOrchestrationClient::new();
        mock.expect_scale_deployment()
            .times(2)
            .returning(|_, _, _| Ok(()));

        let controller = controller_with(mock);
        controller.inject(names::SCALE_DOWN, "team-a").await.unwrap();
        controller.inject(names::SCALE_DOWN, "team-b").await.unwrap();

        assert_eq!(controller.active_incidents("team-a").len(), 1);
        assert_eq!(controller.active_incidents("team-b").len(), 1);
        assert!(controller.active_incidents("demo-apps").is_empty());
    }
}

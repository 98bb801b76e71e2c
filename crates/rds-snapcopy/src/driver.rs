//! Loop driver.
//!
//! Each iteration lists source instances, narrows them to the tagged and
//! available ones, copies their latest snapshots, then applies retention
//! in the target region. Between iterations the driver sleeps for the
//! configured interval.

use std::sync::Arc;

use crate::client::RdsApi;
use crate::config::CopierConfig;
use crate::dispatcher::{CopyDispatcher, CopyOptions, DispatchSummary};
use crate::error::Result;
use crate::instances::InstanceLister;
use crate::model::DbInstance;
use crate::retention::RetentionEnforcer;

/// Driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Performing an iteration.
    Running,
    /// Waiting for the next iteration.
    Sleeping,
}

/// What one iteration did.
#[derive(Debug, Clone, Default)]
pub struct IterationReport {
    /// Instances listed in the source region.
    pub instances_seen: usize,
    /// Instances that passed the tag and status filter.
    pub in_scope: usize,
    /// Copy jobs queued.
    pub queued: usize,
    /// Outcome of the copy pass.
    pub dispatch: DispatchSummary,
    /// Snapshots deleted (or, in dry run, that would be) by retention.
    pub deleted: usize,
    /// Instances whose retention pass failed.
    pub retention_failures: usize,
}

/// Ties listing, copying and retention together.
pub struct LoopDriver {
    config: CopierConfig,
    source: Arc<dyn RdsApi>,
    target: Arc<dyn RdsApi>,
    state: DriverState,
}

impl LoopDriver {
    /// Create a driver over the two regional handles.
    pub fn new(config: CopierConfig, source: Arc<dyn RdsApi>, target: Arc<dyn RdsApi>) -> Self {
        Self {
            config,
            source,
            target,
            state: DriverState::Running,
        }
    }

    /// Current state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Run one full iteration.
    ///
    /// Failing to list source instances is fatal and returned as an error;
    /// every per-instance or per-job failure is logged and contained.
    pub async fn run_once(&mut self) -> Result<IterationReport> {
        self.state = DriverState::Running;
        let pacing = self.config.pacing.clone();

        let lister = InstanceLister::new(Arc::clone(&self.source), pacing.clone());
        let all = lister.list().await?;
        let in_scope = lister.filter(all.clone(), &self.config.tag).await;

        let dispatcher = CopyDispatcher::new(
            Arc::clone(&self.source),
            Arc::clone(&self.target),
            CopyOptions::from_config(&self.config),
        );
        let jobs = dispatcher.build_queue(&in_scope).await;
        let queued = jobs.len();

        // Blocks until every job is completed or abandoned.
        let dispatch = dispatcher.dispatch(jobs).await;

        let (deleted, retention_failures) = self.apply_retention(&in_scope).await;

        let report = IterationReport {
            instances_seen: all.len(),
            in_scope: in_scope.len(),
            queued,
            dispatch,
            deleted,
            retention_failures,
        };

        tracing::info!(
            source_region = %self.config.source_region,
            target_region = %self.config.target_region,
            instances = report.instances_seen,
            in_scope = report.in_scope,
            queued = report.queued,
            completed = report.dispatch.completed(),
            failed = report.dispatch.failed(),
            timed_out = report.dispatch.timed_out(),
            deleted = report.deleted,
            "Iteration finished"
        );

        Ok(report)
    }

    async fn apply_retention(&self, in_scope: &[DbInstance]) -> (usize, usize) {
        if self.config.max_snapshots == 0 {
            return (0, 0);
        }

        let enforcer = RetentionEnforcer::new(
            Arc::clone(&self.target),
            self.config.source_region.clone(),
            self.config.max_snapshots,
            self.config.dry_run,
            self.config.pacing.clone(),
        );

        let mut deleted = 0;
        let mut failures = 0;
        for instance in in_scope {
            match enforcer.enforce_instance(&instance.identifier).await {
                Ok(n) => deleted += n,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        instance = %instance.identifier,
                        region = %self.config.target_region,
                        error = %e,
                        "Failed to enforce snapshot retention"
                    );
                }
            }
        }
        (deleted, failures)
    }

    /// Run iterations until `max_iterations` is reached, or forever if
    /// `None`. A zero interval runs iterations back to back.
    pub async fn run(&mut self, max_iterations: Option<usize>) -> Result<Vec<IterationReport>> {
        let mut reports = Vec::new();
        let interval = self.config.run_every();

        loop {
            let report = self.run_once().await?;
            reports.push(report);

            if max_iterations.is_some_and(|max| reports.len() >= max) {
                break;
            }

            self.state = DriverState::Sleeping;
            tracing::info!(minutes = self.config.run_every_mins, "Sleeping until next iteration");
            tokio::time::sleep(interval).await;
        }

        Ok(reports)
    }

    /// Run until the process is terminated or a fatal error occurs.
    pub async fn run_forever(&mut self) -> Result<()> {
        self.run(None).await.map(|_| ())
    }
}

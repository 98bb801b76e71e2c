//! Copy dispatcher: bounded-concurrency cross-region snapshot copies.
//!
//! One pass builds a queue holding the latest source snapshot of every
//! in-scope instance that has no copy in the target region yet, then
//! feeds it to a fixed pool of workers. Each worker issues one copy at a
//! time and polls the target region until that copy is available before
//! taking the next job. `dispatch` returns only after every worker has
//! drained the queue.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::catalog::{self, SnapshotCatalog};
use crate::client::{CopySnapshotRequest, RdsApi};
use crate::config::{CopierConfig, Pacing};
use crate::error::Result;
use crate::model::{DbInstance, DbSnapshot};

/// Settings for one dispatcher.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Region snapshots are copied from.
    pub source_region: String,
    /// Region snapshots are copied into.
    pub target_region: String,
    /// KMS key for the encrypted copy path.
    pub kms_key_id: Option<String>,
    /// Log jobs instead of issuing copies.
    pub dry_run: bool,
    /// Number of workers, i.e. copies in flight at most.
    pub max_copy_in_flight: usize,
    /// Give up waiting on a copy after this long; `None` waits forever.
    pub max_copy_wait: Option<Duration>,
    /// Provider call pacing.
    pub pacing: Pacing,
}

impl CopyOptions {
    /// Derive dispatcher settings from the process config.
    pub fn from_config(config: &CopierConfig) -> Self {
        Self {
            source_region: config.source_region.clone(),
            target_region: config.target_region.clone(),
            kms_key_id: config.target_kms_key.clone(),
            dry_run: config.dry_run,
            max_copy_in_flight: config.max_copy_in_flight,
            max_copy_wait: config.max_copy_wait(),
            pacing: config.pacing.clone(),
        }
    }
}

/// A queued copy of one source snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyJob {
    /// Snapshot to copy.
    pub snapshot: DbSnapshot,
    /// Identifier of the copy in the target region.
    pub target_identifier: String,
}

/// How a copy job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyOutcome {
    /// The copy reached `available` in the target region.
    Completed,
    /// The copy request was rejected; the job was abandoned.
    Failed(String),
    /// The copy did not become available within the configured wait.
    TimedOut,
    /// Dry run; no request was issued.
    DryRun,
}

/// Record of one finished job.
#[derive(Debug, Clone)]
pub struct CopyResult {
    /// Worker that ran the job (1-based).
    pub worker: usize,
    /// Instance owning the source snapshot.
    pub instance: String,
    /// Source snapshot identifier.
    pub source_snapshot: String,
    /// Target snapshot identifier.
    pub target_snapshot: String,
    /// When the worker picked up the job.
    pub started: DateTime<Utc>,
    /// When the job ended.
    pub finished: DateTime<Utc>,
    /// How the job ended.
    pub outcome: CopyOutcome,
}

/// Results of one dispatch pass.
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    /// Per-job results in completion order.
    pub results: Vec<CopyResult>,
}

impl DispatchSummary {
    /// Number of jobs that ran.
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Jobs whose copy completed.
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, CopyOutcome::Completed))
    }

    /// Jobs abandoned after a failed copy request.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, CopyOutcome::Failed(_)))
    }

    /// Jobs that exceeded the wait ceiling.
    pub fn timed_out(&self) -> usize {
        self.count(|o| matches!(o, CopyOutcome::TimedOut))
    }

    /// Jobs skipped by dry run.
    pub fn dry_run(&self) -> usize {
        self.count(|o| matches!(o, CopyOutcome::DryRun))
    }

    fn count(&self, pred: impl Fn(&CopyOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Copies the latest snapshot of each in-scope instance to the target region.
#[derive(Clone)]
pub struct CopyDispatcher {
    source: Arc<dyn RdsApi>,
    target: Arc<dyn RdsApi>,
    source_catalog: SnapshotCatalog,
    target_catalog: SnapshotCatalog,
    options: CopyOptions,
}

impl CopyDispatcher {
    /// Create a dispatcher over a source and a target region handle.
    pub fn new(source: Arc<dyn RdsApi>, target: Arc<dyn RdsApi>, options: CopyOptions) -> Self {
        Self {
            source_catalog: SnapshotCatalog::new(Arc::clone(&source), options.pacing.clone()),
            target_catalog: SnapshotCatalog::new(Arc::clone(&target), options.pacing.clone()),
            source,
            target,
            options,
        }
    }

    /// Dispatcher settings.
    pub fn options(&self) -> &CopyOptions {
        &self.options
    }

    /// Build the copy queue for this pass.
    ///
    /// Instances whose snapshots cannot be listed, that have no snapshots,
    /// or whose latest snapshot is already present at the target are
    /// skipped.
    pub async fn build_queue(&self, instances: &[DbInstance]) -> Vec<CopyJob> {
        let mut queue = Vec::new();

        for instance in instances {
            tracing::info!(instance = %instance.identifier, "Looking at instance");

            let mut snapshots = match self.source_catalog.list_snapshots(&instance.identifier).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(
                        instance = %instance.identifier,
                        region = %self.options.source_region,
                        error = %e,
                        "Failed to list snapshots"
                    );
                    continue;
                }
            };
            catalog::sort_chronologically(&mut snapshots);

            let Some(latest) = catalog::latest(&snapshots) else {
                tracing::info!(
                    instance = %instance.identifier,
                    region = %self.options.source_region,
                    "No source snapshots found"
                );
                continue;
            };

            let target_identifier =
                catalog::target_snapshot_name(&latest.identifier, &self.options.source_region);

            match self.target_catalog.describe(&target_identifier).await {
                Ok(Some(_)) => {
                    tracing::info!(
                        region = %self.options.target_region,
                        snapshot = %target_identifier,
                        "Snapshot already found in target region"
                    );
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        region = %self.options.target_region,
                        snapshot = %target_identifier,
                        error = %e,
                        "Failed to search for snapshot in target region"
                    );
                    continue;
                }
            }

            tracing::info!(
                instance = %instance.identifier,
                snapshot = %latest.identifier,
                target_snapshot = %target_identifier,
                "Enqueued snapshot for copy"
            );
            queue.push(CopyJob {
                snapshot: latest,
                target_identifier,
            });
        }

        queue
    }

    /// Run every job through the worker pool and wait for all of them.
    pub async fn dispatch(&self, jobs: Vec<CopyJob>) -> DispatchSummary {
        if jobs.is_empty() {
            return DispatchSummary::default();
        }

        let workers = self.options.max_copy_in_flight.max(1);
        let (tx, rx) = mpsc::channel::<CopyJob>(1);
        let rx = Arc::new(Mutex::new(rx));
        let results = Arc::new(Mutex::new(Vec::<CopyResult>::with_capacity(jobs.len())));

        let mut handles = Vec::with_capacity(workers);
        for worker in 1..=workers {
            let rx = Arc::clone(&rx);
            let results = Arc::clone(&results);
            let dispatcher = self.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else { break };

                    let started = Utc::now();
                    let outcome = dispatcher.run_job(worker, &job).await;
                    let result = CopyResult {
                        worker,
                        instance: job.snapshot.instance_identifier.clone(),
                        source_snapshot: job.snapshot.identifier.clone(),
                        target_snapshot: job.target_identifier.clone(),
                        started,
                        finished: Utc::now(),
                        outcome,
                    };
                    results.lock().await.push(result);
                }
            }));
        }

        for job in jobs {
            if tx.send(job).await.is_err() {
                tracing::warn!("All copy workers exited before the queue drained");
                break;
            }
        }
        drop(tx);

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Copy worker terminated abnormally");
            }
        }

        let results = std::mem::take(&mut *results.lock().await);
        DispatchSummary { results }
    }

    /// Build the queue for `instances` and dispatch it.
    pub async fn run(&self, instances: &[DbInstance]) -> DispatchSummary {
        let jobs = self.build_queue(instances).await;
        self.dispatch(jobs).await
    }

    async fn run_job(&self, worker: usize, job: &CopyJob) -> CopyOutcome {
        let snapshot = &job.snapshot;

        if self.options.dry_run {
            tracing::info!(
                worker,
                instance = %snapshot.instance_identifier,
                snapshot = %snapshot.identifier,
                target_snapshot = %job.target_identifier,
                encrypted = self.options.kms_key_id.is_some(),
                "Dry run: would copy snapshot"
            );
            return CopyOutcome::DryRun;
        }

        let copy = match self.start_copy(job).await {
            Ok(copy) => copy,
            Err(e) => {
                tracing::warn!(
                    worker,
                    source_region = %self.options.source_region,
                    target_region = %self.options.target_region,
                    instance = %snapshot.instance_identifier,
                    snapshot = %snapshot.identifier,
                    error = %e,
                    "Failed to start snapshot copy"
                );
                return CopyOutcome::Failed(e.to_string());
            }
        };

        tracing::info!(
            worker,
            source_region = %self.options.source_region,
            target_region = %self.options.target_region,
            instance = %snapshot.instance_identifier,
            source_snapshot = %snapshot.identifier,
            target_snapshot = %copy.identifier,
            status = %copy.status,
            "Snapshot copy started"
        );

        self.wait_until_available(worker, &copy.identifier).await
    }

    /// Issue the copy request, pre-signing in the source region when the
    /// copy is re-encrypted at the target.
    async fn start_copy(&self, job: &CopyJob) -> Result<DbSnapshot> {
        let mut request = CopySnapshotRequest {
            source_instance_identifier: job.snapshot.instance_identifier.clone(),
            source_snapshot_arn: job.snapshot.arn.clone(),
            target_identifier: job.target_identifier.clone(),
            source_region: self.options.source_region.clone(),
            destination_region: self.options.target_region.clone(),
            kms_key_id: self.options.kms_key_id.clone(),
            pre_signed_url: None,
        };

        if request.kms_key_id.is_some() {
            let url = self
                .source
                .presign_copy(&request, self.options.pacing.presign_expiry())
                .await?;
            request.pre_signed_url = Some(url);
        }

        self.target.copy_snapshot(&request).await
    }

    /// Poll the target region until `identifier` is available.
    ///
    /// Poll errors are logged and polling continues. Without a configured
    /// wait ceiling this never gives up.
    async fn wait_until_available(&self, worker: usize, identifier: &str) -> CopyOutcome {
        let started = Instant::now();

        loop {
            tokio::time::sleep(self.options.pacing.poll_interval()).await;

            match self.target_catalog.describe(identifier).await {
                Ok(Some(s)) if s.status.is_available() => {
                    tracing::info!(
                        worker,
                        target_snapshot = %identifier,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Snapshot copy completed"
                    );
                    return CopyOutcome::Completed;
                }
                Ok(Some(s)) => {
                    tracing::debug!(worker, target_snapshot = %identifier, status = %s.status, "Copy in progress");
                }
                Ok(None) => {
                    tracing::debug!(worker, target_snapshot = %identifier, "Copy not visible yet");
                }
                Err(e) => {
                    tracing::warn!(
                        worker,
                        region = %self.options.target_region,
                        target_snapshot = %identifier,
                        error = %e,
                        "Failed to get status of copied snapshot"
                    );
                }
            }

            if let Some(max_wait) = self.options.max_copy_wait {
                if started.elapsed() >= max_wait {
                    tracing::warn!(
                        worker,
                        target_snapshot = %identifier,
                        waited_secs = started.elapsed().as_secs(),
                        "Gave up waiting for snapshot copy"
                    );
                    return CopyOutcome::TimedOut;
                }
            }
        }
    }
}

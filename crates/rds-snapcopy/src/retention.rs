//! Retention enforcement for copies in the target region.

use std::sync::Arc;

use crate::catalog::{self, SnapshotCatalog};
use crate::client::RdsApi;
use crate::config::Pacing;
use crate::error::Result;
use crate::model::DbSnapshot;

/// Deletes copies beyond the retention count.
#[derive(Clone)]
pub struct RetentionEnforcer {
    target: Arc<dyn RdsApi>,
    catalog: SnapshotCatalog,
    source_region: String,
    max_snapshots: usize,
    dry_run: bool,
    pacing: Pacing,
}

impl RetentionEnforcer {
    /// Create an enforcer keeping `max_snapshots` copies per instance.
    pub fn new(
        target: Arc<dyn RdsApi>,
        source_region: impl Into<String>,
        max_snapshots: usize,
        dry_run: bool,
        pacing: Pacing,
    ) -> Self {
        Self {
            catalog: SnapshotCatalog::new(Arc::clone(&target), pacing.clone()),
            target,
            source_region: source_region.into(),
            max_snapshots,
            dry_run,
            pacing,
        }
    }

    /// Copies of `instance_identifier` made from the source region that
    /// exceed the retention count, oldest first.
    pub async fn expired_copies(&self, instance_identifier: &str) -> Result<Vec<DbSnapshot>> {
        let mut copies: Vec<DbSnapshot> = self
            .catalog
            .list_snapshots(instance_identifier)
            .await?
            .into_iter()
            .filter(|s| catalog::is_copy_from(&s.identifier, &self.source_region))
            .collect();
        catalog::sort_chronologically(&mut copies);
        Ok(catalog::expired(&copies, self.max_snapshots))
    }

    /// Delete the snapshots of `snapshots` beyond the retention count.
    ///
    /// `snapshots` must be in chronological order. Returns the number of
    /// deletions the provider confirmed. The pass is all-or-nothing: the
    /// first failed delete aborts it and no partial count is reported.
    pub async fn enforce(&self, snapshots: &[DbSnapshot]) -> Result<usize> {
        let expired = catalog::expired(snapshots, self.max_snapshots);
        self.delete(&expired).await
    }

    /// Apply retention to the copies of one instance.
    pub async fn enforce_instance(&self, instance_identifier: &str) -> Result<usize> {
        let expired = self.expired_copies(instance_identifier).await?;
        self.delete(&expired).await
    }

    async fn delete(&self, expired: &[DbSnapshot]) -> Result<usize> {
        if expired.is_empty() {
            return Ok(0);
        }

        if self.dry_run {
            for snapshot in expired {
                tracing::info!(
                    region = %self.target.region(),
                    snapshot = %snapshot.identifier,
                    "Dry run: would delete expired snapshot"
                );
            }
            return Ok(expired.len());
        }

        let mut deleted = 0;
        for snapshot in expired {
            let result = self.target.delete_snapshot(&snapshot.identifier).await?;
            if result.status.is_deleted() {
                deleted += 1;
                tracing::info!(
                    region = %self.target.region(),
                    snapshot = %snapshot.identifier,
                    "Deleted expired snapshot"
                );
            } else {
                tracing::debug!(
                    snapshot = %snapshot.identifier,
                    status = %result.status,
                    "Delete accepted but not yet terminal"
                );
            }
            tokio::time::sleep(self.pacing.anti_rate_limit()).await;
        }

        Ok(deleted)
    }
}

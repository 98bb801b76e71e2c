//! Regional client abstraction.
//!
//! `RdsApi` is the capability object the copier consumes for one region.
//! The AWS backend and the in-memory region both implement it, so every
//! pipeline stage can be exercised without a network.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::model::{DbInstance, DbSnapshot, Tag};

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Marker for the next page; `None` on the last page.
    pub marker: Option<String>,
}

impl<T> Page<T> {
    /// A final page holding `items`.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, marker: None }
    }
}

/// Parameters of a cross-region snapshot copy.
#[derive(Debug, Clone, PartialEq)]
pub struct CopySnapshotRequest {
    /// Instance that owns the source snapshot.
    pub source_instance_identifier: String,
    /// ARN of the snapshot in the source region.
    pub source_snapshot_arn: String,
    /// Identifier the copy will carry in the target region.
    pub target_identifier: String,
    /// Region the snapshot is copied from.
    pub source_region: String,
    /// Region the snapshot is copied into.
    pub destination_region: String,
    /// KMS key used to encrypt the copy at the target.
    pub kms_key_id: Option<String>,
    /// Pre-signed source-region request, required for encrypted copies.
    pub pre_signed_url: Option<String>,
}

/// Operations the copier needs from one region.
///
/// A not-found answer from `describe_snapshot` must be reported as
/// [`CopierError::SnapshotNotFound`](crate::error::CopierError::SnapshotNotFound)
/// so callers can treat it as an absent value.
#[async_trait]
pub trait RdsApi: Send + Sync {
    /// Region this handle is bound to.
    fn region(&self) -> &str;

    /// Fetch one page of database instances.
    async fn describe_instances(&self, marker: Option<String>, page_size: i32) -> Result<Page<DbInstance>>;

    /// List the tags attached to a resource.
    async fn list_tags(&self, arn: &str) -> Result<Vec<Tag>>;

    /// Fetch one page of the snapshots owned by an instance.
    async fn describe_snapshots(
        &self,
        instance_identifier: &str,
        marker: Option<String>,
        page_size: i32,
    ) -> Result<Page<DbSnapshot>>;

    /// Fetch a single snapshot by identifier.
    async fn describe_snapshot(&self, identifier: &str) -> Result<DbSnapshot>;

    /// Build a pre-signed copy request against this (source) region.
    async fn presign_copy(&self, request: &CopySnapshotRequest, expires_in: Duration) -> Result<String>;

    /// Start a snapshot copy into this region. Does not wait for completion.
    async fn copy_snapshot(&self, request: &CopySnapshotRequest) -> Result<DbSnapshot>;

    /// Delete a snapshot in this region.
    async fn delete_snapshot(&self, identifier: &str) -> Result<DbSnapshot>;
}

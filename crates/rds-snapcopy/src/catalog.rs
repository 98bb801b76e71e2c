//! Snapshot catalog: listing, lookup and chronological selection.
//!
//! The selection functions are total. Empty or short inputs produce empty
//! results, never errors.

use std::sync::Arc;

use crate::client::RdsApi;
use crate::config::Pacing;
use crate::error::Result;
use crate::model::DbSnapshot;

/// Provider prefix carried by automated snapshot identifiers.
pub const PROVIDER_PREFIX: &str = "rds:";

/// Suffix marker inserted in front of the source region in copy names.
pub const COPY_SUFFIX: &str = "-copyfrom-";

/// Snapshot listing and lookup against one region.
#[derive(Clone)]
pub struct SnapshotCatalog {
    client: Arc<dyn RdsApi>,
    pacing: Pacing,
}

impl SnapshotCatalog {
    /// Create a catalog over a regional client.
    pub fn new(client: Arc<dyn RdsApi>, pacing: Pacing) -> Self {
        Self { client, pacing }
    }

    /// Region the catalog reads from.
    pub fn region(&self) -> &str {
        self.client.region()
    }

    /// List every snapshot owned by `instance_identifier`, in provider order.
    ///
    /// Stops after `max_pages` pages even if the provider keeps returning
    /// markers, and pauses for the anti-rate-limit delay after each page.
    pub async fn list_snapshots(&self, instance_identifier: &str) -> Result<Vec<DbSnapshot>> {
        let mut snapshots = Vec::new();
        let mut marker = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .describe_snapshots(instance_identifier, marker, self.pacing.snapshot_page_size)
                .await?;
            pages += 1;
            snapshots.extend(page.items);
            tokio::time::sleep(self.pacing.anti_rate_limit()).await;

            match page.marker {
                Some(next) if pages < self.pacing.max_pages => marker = Some(next),
                Some(_) => {
                    tracing::warn!(
                        instance = %instance_identifier,
                        region = %self.region(),
                        pages,
                        "Snapshot listing hit the page ceiling"
                    );
                    break;
                }
                None => break,
            }
        }

        Ok(snapshots)
    }

    /// Look up one snapshot. A provider "not found" is `Ok(None)`.
    pub async fn describe(&self, identifier: &str) -> Result<Option<DbSnapshot>> {
        match self.client.describe_snapshot(identifier).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Order snapshots by creation time, oldest first.
///
/// The sort is stable; snapshots without a creation time (still being
/// created) sort after every timestamped one.
pub fn sort_chronologically(snapshots: &mut [DbSnapshot]) {
    snapshots.sort_by_key(|s| (s.created_at.is_none(), s.created_at));
}

/// Select a window of snapshots.
///
/// With `start >= 0` this is `all[start..start + count]`. A negative
/// `start` indexes from the end: the window ends at `len + start + 1`, so
/// `start == -1` yields the `count` most recent elements. Both bounds are
/// clamped to `0..=len`.
pub fn select_slice(all: &[DbSnapshot], start: i64, count: usize) -> Vec<DbSnapshot> {
    let len = all.len() as i64;
    if len == 0 || count == 0 {
        return Vec::new();
    }
    let count = count.min(all.len()) as i64;

    let (begin, end) = if start >= 0 {
        (start, start.saturating_add(count))
    } else {
        let end = len + start + 1;
        (end - count, end)
    };

    let begin = begin.clamp(0, len) as usize;
    let end = end.clamp(0, len) as usize;
    if begin >= end {
        return Vec::new();
    }
    all[begin..end].to_vec()
}

/// The most recent snapshot, if any.
pub fn latest(all: &[DbSnapshot]) -> Option<DbSnapshot> {
    select_slice(all, -1, 1).into_iter().next()
}

/// Snapshots beyond the `retain` most recent, oldest first.
pub fn expired(all: &[DbSnapshot], retain: usize) -> Vec<DbSnapshot> {
    if all.len() <= retain {
        return Vec::new();
    }
    select_slice(all, 0, all.len() - retain)
}

/// Deterministic target-region name for a copy of `source_identifier`.
///
/// Doubles as the idempotency key: if a snapshot with this name already
/// exists in the target region the copy is not repeated.
pub fn target_snapshot_name(source_identifier: &str, source_region: &str) -> String {
    format!("{}{}{}", source_identifier, COPY_SUFFIX, source_region).replace(PROVIDER_PREFIX, "")
}

/// Whether `identifier` names a copy made from `source_region`.
pub fn is_copy_from(identifier: &str, source_region: &str) -> bool {
    identifier.ends_with(&format!("{}{}", COPY_SUFFIX, source_region))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRds;
    use crate::model::SnapshotStatus;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn snap(id: &str) -> DbSnapshot {
        DbSnapshot::new("db-1", id, format!("arn:{}", id), None, SnapshotStatus::Available)
    }

    fn snap_at(id: &str, hour: u32) -> DbSnapshot {
        DbSnapshot::new(
            "db-1",
            id,
            format!("arn:{}", id),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()),
            SnapshotStatus::Available,
        )
    }

    fn ids(snaps: &[DbSnapshot]) -> Vec<&str> {
        snaps.iter().map(|s| s.identifier.as_str()).collect()
    }

    #[test]
    fn test_select_slice_forward() {
        let all = vec![snap("one"), snap("two"), snap("three")];
        assert_eq!(ids(&select_slice(&all, 0, 1)), vec!["one"]);
        assert_eq!(ids(&select_slice(&all, 1, 1)), vec!["two"]);
        assert_eq!(ids(&select_slice(&all, 1, 5)), vec!["two", "three"]);
        assert!(select_slice(&all, 3, 1).is_empty());
        assert!(select_slice(&all, 10, 2).is_empty());
    }

    #[test]
    fn test_select_slice_from_end() {
        let all = vec![snap("one"), snap("two"), snap("three")];
        assert_eq!(ids(&select_slice(&all, -1, 1)), vec!["three"]);
        assert_eq!(ids(&select_slice(&all, -1, 2)), vec!["two", "three"]);
        assert_eq!(ids(&select_slice(&all, -1, 9)), vec!["one", "two", "three"]);
        assert_eq!(ids(&select_slice(&all, -2, 1)), vec!["two"]);
        assert!(select_slice(&all, -5, 1).is_empty());
    }

    #[test]
    fn test_select_slice_empty_input() {
        assert!(select_slice(&[], 0, 3).is_empty());
        assert!(select_slice(&[], -1, 1).is_empty());
        assert!(select_slice(&[snap("one")], 0, 0).is_empty());
    }

    #[test]
    fn test_latest() {
        assert!(latest(&[]).is_none());
        let all = vec![snap("s1"), snap("s2")];
        assert_eq!(latest(&all).unwrap().identifier, "s2");
    }

    #[test]
    fn test_expired() {
        let all = vec![snap("t1"), snap("t2"), snap("t3")];
        assert_eq!(ids(&expired(&all, 1)), vec!["t1", "t2"]);
        assert_eq!(ids(&expired(&all, 0)), vec!["t1", "t2", "t3"]);
        assert!(expired(&all, 3).is_empty());
        assert!(expired(&all, 4).is_empty());
        assert!(expired(&[], 0).is_empty());
    }

    #[test]
    fn test_sort_chronologically() {
        let mut all = vec![
            snap("pending"),
            snap_at("late", 20),
            snap_at("early", 1),
            snap_at("mid", 12),
        ];
        sort_chronologically(&mut all);
        assert_eq!(ids(&all), vec!["early", "mid", "late", "pending"]);
        assert_eq!(latest(&all[..3]).unwrap().identifier, "late");
    }

    #[test]
    fn test_target_snapshot_name() {
        assert_eq!(
            target_snapshot_name("rds:prod-db-2024-03-01-04-10", "eu-west-1"),
            "prod-db-2024-03-01-04-10-copyfrom-eu-west-1"
        );
        assert_eq!(
            target_snapshot_name("manual-snap", "us-east-1"),
            "manual-snap-copyfrom-us-east-1"
        );
        assert!(is_copy_from("manual-snap-copyfrom-us-east-1", "us-east-1"));
        assert!(!is_copy_from("manual-snap-copyfrom-us-east-1", "us-east-2"));
        assert!(!is_copy_from("manual-snap", "us-east-1"));
    }

    #[tokio::test]
    async fn test_list_snapshots_follows_pages() {
        let region = Arc::new(InMemoryRds::new("eu-west-1").with_page_limit(2));
        for i in 0..5 {
            region.insert_snapshot(snap(&format!("s{}", i)));
        }
        let catalog = SnapshotCatalog::new(region.clone(), Pacing::immediate());

        let listed = catalog.list_snapshots("db-1").await.unwrap();
        assert_eq!(ids(&listed), vec!["s0", "s1", "s2", "s3", "s4"]);
        assert_eq!(region.calls("describe_snapshots"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_snapshots_pauses_after_each_page() {
        let region = Arc::new(InMemoryRds::new("eu-west-1").with_page_limit(2));
        for i in 0..5 {
            region.insert_snapshot(snap(&format!("s{}", i)));
        }
        let pacing = Pacing {
            anti_rate_limit_ms: 10,
            ..Pacing::immediate()
        };
        let catalog = SnapshotCatalog::new(region.clone(), pacing);

        let start = tokio::time::Instant::now();
        catalog.list_snapshots("db-1").await.unwrap();
        assert_eq!(region.calls("describe_snapshots"), 3);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_list_snapshots_respects_page_ceiling() {
        let region = Arc::new(InMemoryRds::new("eu-west-1").with_page_limit(1));
        for i in 0..5 {
            region.insert_snapshot(snap(&format!("s{}", i)));
        }
        let pacing = Pacing {
            max_pages: 2,
            ..Pacing::immediate()
        };
        let catalog = SnapshotCatalog::new(region.clone(), pacing);

        let listed = catalog.list_snapshots("db-1").await.unwrap();
        assert_eq!(ids(&listed), vec!["s0", "s1"]);
        assert_eq!(region.calls("describe_snapshots"), 2);
    }

    #[tokio::test]
    async fn test_describe_maps_not_found_to_none() {
        let region = Arc::new(InMemoryRds::new("eu-west-1"));
        region.insert_snapshot(snap("present"));
        let catalog = SnapshotCatalog::new(region.clone(), Pacing::immediate());

        assert!(catalog.describe("present").await.unwrap().is_some());
        assert!(catalog.describe("missing").await.unwrap().is_none());

        region.fail_next("describe_snapshot");
        assert!(catalog.describe("present").await.is_err());
    }
}

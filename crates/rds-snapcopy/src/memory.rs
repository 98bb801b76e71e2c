//! In-process region.
//!
//! `InMemoryRds` implements [`RdsApi`] over plain collections so the copy
//! pipeline, retention and loop driver can run without a provider. Copies
//! start in `creating` and become `available` after a configurable number
//! of status polls, which is enough to observe worker concurrency.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::client::{CopySnapshotRequest, Page, RdsApi};
use crate::error::{CopierError, Result};
use crate::model::{DbInstance, DbSnapshot, SnapshotStatus, Tag};

#[derive(Default)]
struct RegionState {
    instances: Vec<DbInstance>,
    tags: HashMap<String, Vec<Tag>>,
    snapshots: Vec<DbSnapshot>,
    pending_polls: HashMap<String, usize>,
    copy_requests: Vec<CopySnapshotRequest>,
    calls: HashMap<&'static str, usize>,
    fail_next: HashSet<&'static str>,
    fail_on: HashSet<(&'static str, String)>,
    in_flight: usize,
    max_in_flight: usize,
}

/// A single region held in memory.
pub struct InMemoryRds {
    region: String,
    page_limit: usize,
    copy_polls: usize,
    delete_status: SnapshotStatus,
    state: Mutex<RegionState>,
}

impl InMemoryRds {
    /// Create an empty region.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            page_limit: 100,
            copy_polls: 1,
            delete_status: SnapshotStatus::Deleted,
            state: Mutex::new(RegionState::default()),
        }
    }

    /// Cap the number of items returned per page, regardless of the
    /// requested page size.
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// Number of status polls before a new copy turns `available`.
    /// `usize::MAX` leaves copies in `creating` forever.
    pub fn with_copy_polls(mut self, polls: usize) -> Self {
        self.copy_polls = polls;
        self
    }

    /// Status reported back by `delete_snapshot`.
    pub fn with_delete_status(mut self, status: SnapshotStatus) -> Self {
        self.delete_status = status;
        self
    }

    fn state(&self) -> MutexGuard<'_, RegionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an instance and its tags.
    pub fn insert_instance(&self, instance: DbInstance, tags: Vec<Tag>) {
        let mut state = self.state();
        state.tags.insert(instance.arn.clone(), tags);
        state.instances.push(instance);
    }

    /// Add a snapshot. Order of insertion is the provider listing order.
    pub fn insert_snapshot(&self, snapshot: DbSnapshot) {
        self.state().snapshots.push(snapshot);
    }

    /// Snapshots currently held, in listing order.
    pub fn snapshots(&self) -> Vec<DbSnapshot> {
        self.state().snapshots.clone()
    }

    /// Whether a snapshot with `identifier` exists.
    pub fn contains_snapshot(&self, identifier: &str) -> bool {
        self.state().snapshots.iter().any(|s| s.identifier == identifier)
    }

    /// Copy requests received so far.
    pub fn copy_requests(&self) -> Vec<CopySnapshotRequest> {
        self.state().copy_requests.clone()
    }

    /// Number of calls made to `operation`.
    pub fn calls(&self, operation: &str) -> usize {
        self.state().calls.get(operation).copied().unwrap_or(0)
    }

    /// Highest number of copies observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    /// Fail the next call to `operation` with a provider error.
    pub fn fail_next(&self, operation: &'static str) {
        self.state().fail_next.insert(operation);
    }

    /// Fail every call to `operation` whose key argument equals `key`.
    ///
    /// The key is the instance identifier, ARN or snapshot identifier,
    /// depending on the operation.
    pub fn fail_on(&self, operation: &'static str, key: impl Into<String>) {
        self.state().fail_on.insert((operation, key.into()));
    }

    fn enter(&self, operation: &'static str, key: &str) -> Result<MutexGuard<'_, RegionState>> {
        let mut state = self.state();
        *state.calls.entry(operation).or_insert(0) += 1;
        if state.fail_next.remove(operation) || state.fail_on.contains(&(operation, key.to_string())) {
            return Err(CopierError::provider(operation, format!("injected failure in {}", self.region)));
        }
        Ok(state)
    }

    fn page<T: Clone>(&self, items: &[T], marker: Option<String>, page_size: i32) -> Result<Page<T>> {
        let start = match marker {
            Some(m) => m
                .parse::<usize>()
                .map_err(|_| CopierError::provider("paginate", format!("bad marker {}", m)))?,
            None => 0,
        };
        let size = (page_size.max(1) as usize).min(self.page_limit);
        let end = (start + size).min(items.len());
        let items_page = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
        let marker = (end < items.len()).then(|| end.to_string());
        Ok(Page {
            items: items_page,
            marker,
        })
    }
}

#[async_trait]
impl RdsApi for InMemoryRds {
    fn region(&self) -> &str {
        &self.region
    }

    async fn describe_instances(&self, marker: Option<String>, page_size: i32) -> Result<Page<DbInstance>> {
        let state = self.enter("describe_instances", "")?;
        self.page(&state.instances, marker, page_size)
    }

    async fn list_tags(&self, arn: &str) -> Result<Vec<Tag>> {
        let state = self.enter("list_tags", arn)?;
        Ok(state.tags.get(arn).cloned().unwrap_or_default())
    }

    async fn describe_snapshots(
        &self,
        instance_identifier: &str,
        marker: Option<String>,
        page_size: i32,
    ) -> Result<Page<DbSnapshot>> {
        let state = self.enter("describe_snapshots", instance_identifier)?;
        let owned: Vec<DbSnapshot> = state
            .snapshots
            .iter()
            .filter(|s| s.instance_identifier == instance_identifier)
            .cloned()
            .collect();
        self.page(&owned, marker, page_size)
    }

    async fn describe_snapshot(&self, identifier: &str) -> Result<DbSnapshot> {
        let mut state = self.enter("describe_snapshot", identifier)?;
        let state = &mut *state;

        let finished = match state.pending_polls.get_mut(identifier) {
            Some(remaining) if *remaining != usize::MAX => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            _ => false,
        };
        if finished {
            state.pending_polls.remove(identifier);
            state.in_flight = state.in_flight.saturating_sub(1);
            if let Some(s) = state.snapshots.iter_mut().find(|s| s.identifier == identifier) {
                s.status = SnapshotStatus::Available;
            }
        }

        state
            .snapshots
            .iter()
            .find(|s| s.identifier == identifier)
            .cloned()
            .ok_or_else(|| CopierError::SnapshotNotFound {
                identifier: identifier.to_string(),
            })
    }

    async fn presign_copy(&self, request: &CopySnapshotRequest, expires_in: Duration) -> Result<String> {
        let _state = self.enter("presign_copy", &request.source_snapshot_arn)?;
        Ok(format!(
            "https://rds.{}.amazonaws.com/?Action=CopyDBSnapshot&SourceDBSnapshotIdentifier={}&TargetDBSnapshotIdentifier={}&X-Amz-Expires={}",
            self.region,
            request.source_snapshot_arn,
            request.target_identifier,
            expires_in.as_secs()
        ))
    }

    async fn copy_snapshot(&self, request: &CopySnapshotRequest) -> Result<DbSnapshot> {
        let mut state = self.enter("copy_snapshot", &request.target_identifier)?;
        if state.snapshots.iter().any(|s| s.identifier == request.target_identifier) {
            return Err(CopierError::provider(
                "copy_snapshot",
                format!("snapshot {} already exists", request.target_identifier),
            ));
        }

        let copy = DbSnapshot::new(
            request.source_instance_identifier.clone(),
            request.target_identifier.clone(),
            format!("arn:aws:rds:{}:000000000000:snapshot:{}", self.region, request.target_identifier),
            Some(Utc::now()),
            SnapshotStatus::Creating,
        );

        state.copy_requests.push(request.clone());
        state.snapshots.push(copy.clone());
        state.pending_polls.insert(request.target_identifier.clone(), self.copy_polls);
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        Ok(copy)
    }

    async fn delete_snapshot(&self, identifier: &str) -> Result<DbSnapshot> {
        let mut state = self.enter("delete_snapshot", identifier)?;
        let pos = state
            .snapshots
            .iter()
            .position(|s| s.identifier == identifier)
            .ok_or_else(|| CopierError::SnapshotNotFound {
                identifier: identifier.to_string(),
            })?;
        let mut removed = state.snapshots.remove(pos);
        removed.status = self.delete_status.clone();
        Ok(removed)
    }
}

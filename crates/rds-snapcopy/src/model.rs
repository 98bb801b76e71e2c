//! Read-only views of database instances, tags and snapshots.
//!
//! These are fetched from a region on every loop iteration and never
//! mutated by the copier; status transitions are owned by the provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a database instance as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    /// Instance is up and serving.
    Available,
    /// Any other provider status (`backing-up`, `modifying`, `stopped`, ...).
    Other(String),
}

impl InstanceStatus {
    /// Returns true if the instance is in the ready state.
    pub fn is_available(&self) -> bool {
        matches!(self, InstanceStatus::Available)
    }
}

impl From<&str> for InstanceStatus {
    fn from(s: &str) -> Self {
        match s {
            "available" => InstanceStatus::Available,
            other => InstanceStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Available => f.write_str("available"),
            InstanceStatus::Other(s) => f.write_str(s),
        }
    }
}

/// A managed database instance tracked for snapshot replication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbInstance {
    /// Instance identifier.
    pub identifier: String,
    /// Operational status.
    pub status: InstanceStatus,
    /// Unique resource name used for tag lookups.
    pub arn: String,
}

impl DbInstance {
    /// Create an instance view.
    pub fn new(identifier: impl Into<String>, status: InstanceStatus, arn: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            status,
            arn: arn.into(),
        }
    }
}

/// Key/value tag attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value, possibly empty.
    pub value: String,
}

impl Tag {
    /// Create a tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Lifecycle status of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotStatus {
    /// Snapshot (or copy) is still being written.
    Creating,
    /// Snapshot is complete and usable.
    Available,
    /// Snapshot has been deleted.
    Deleted,
    /// Any other provider status (`copying`, `failed`, ...).
    Other(String),
}

impl SnapshotStatus {
    /// Returns true once the snapshot reached the ready state.
    pub fn is_available(&self) -> bool {
        matches!(self, SnapshotStatus::Available)
    }

    /// Returns true if the provider reports the snapshot as deleted.
    pub fn is_deleted(&self) -> bool {
        matches!(self, SnapshotStatus::Deleted)
    }
}

impl From<&str> for SnapshotStatus {
    fn from(s: &str) -> Self {
        match s {
            "creating" => SnapshotStatus::Creating,
            "available" => SnapshotStatus::Available,
            "deleted" => SnapshotStatus::Deleted,
            other => SnapshotStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotStatus::Creating => f.write_str("creating"),
            SnapshotStatus::Available => f.write_str("available"),
            SnapshotStatus::Deleted => f.write_str("deleted"),
            SnapshotStatus::Other(s) => f.write_str(s),
        }
    }
}

/// A point-in-time backup belonging to one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbSnapshot {
    /// Identifier of the owning instance.
    pub instance_identifier: String,
    /// Snapshot identifier, unique within a region.
    pub identifier: String,
    /// Unique resource name, used as the copy source.
    pub arn: String,
    /// Creation time; absent while the provider is still creating it.
    pub created_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: SnapshotStatus,
}

impl DbSnapshot {
    /// Create a snapshot view.
    pub fn new(
        instance_identifier: impl Into<String>,
        identifier: impl Into<String>,
        arn: impl Into<String>,
        created_at: Option<DateTime<Utc>>,
        status: SnapshotStatus,
    ) -> Self {
        Self {
            instance_identifier: instance_identifier.into(),
            identifier: identifier.into(),
            arn: arn.into(),
            created_at,
            status,
        }
    }
}

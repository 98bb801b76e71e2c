#![warn(missing_docs)]

//! Cross-region RDS snapshot copier.
//!
//! Copies the latest snapshot of every tagged, available database instance
//! from a source region into a target region through a bounded pool of
//! copy workers, optionally re-encrypting with a target-region KMS key.
//! Copies in the target region can be capped per instance, oldest first.

pub mod aws;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod instances;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod model;
pub mod retention;

pub use client::{CopySnapshotRequest, Page, RdsApi};
pub use config::{CopierConfig, Pacing};
pub use dispatcher::{CopyDispatcher, CopyJob, CopyOptions, CopyOutcome, CopyResult, DispatchSummary};
pub use driver::{DriverState, IterationReport, LoopDriver};
pub use error::{CopierError, Result};
#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryRds;
pub use model::{DbInstance, DbSnapshot, InstanceStatus, SnapshotStatus, Tag};
pub use retention::RetentionEnforcer;

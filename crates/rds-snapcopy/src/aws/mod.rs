//! AWS backend.
//!
//! [`AwsRdsClient`] implements [`RdsApi`](crate::client::RdsApi) on top of
//! `aws-sdk-rds`. Pre-signed copy URLs are built by [`presign`].

mod client;
pub mod presign;

pub use client::AwsRdsClient;
pub use presign::{CopyPresigner, SigningCredentials};

//! `RdsApi` over the AWS SDK.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_rds::error::DisplayErrorContext;
use aws_sdk_rds::types;
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::presign::{CopyPresigner, SigningCredentials};
use crate::client::{CopySnapshotRequest, Page, RdsApi};
use crate::error::{CopierError, Result};
use crate::model::{DbInstance, DbSnapshot, InstanceStatus, SnapshotStatus, Tag};

/// RDS client bound to one region.
pub struct AwsRdsClient {
    client: aws_sdk_rds::Client,
    credentials: SharedCredentialsProvider,
    region: String,
}

impl AwsRdsClient {
    /// Open a session to `region` using the default credential chain.
    pub async fn connect(region: &str) -> Result<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::from_sdk_config(&config, region)
    }

    /// Build a client from an already loaded SDK config.
    pub fn from_sdk_config(config: &SdkConfig, region: &str) -> Result<Self> {
        let credentials = config.credentials_provider().ok_or_else(|| CopierError::Session {
            region: region.to_string(),
            message: "no credentials provider configured".to_string(),
        })?;

        tracing::debug!(region = %region, "Opened RDS session");

        Ok(Self {
            client: aws_sdk_rds::Client::new(config),
            credentials,
            region: region.to_string(),
        })
    }

    async fn signing_credentials(&self) -> Result<SigningCredentials> {
        let creds = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|e| CopierError::Presign {
                message: format!("failed to resolve credentials: {}", e),
            })?;
        Ok(SigningCredentials {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().map(str::to_string),
        })
    }
}

fn provider_error<E>(operation: &str, err: E) -> CopierError
where
    E: std::error::Error,
{
    CopierError::provider(operation, DisplayErrorContext(err).to_string())
}

fn to_chrono(time: &aws_sdk_rds::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

fn to_instance(instance: &types::DbInstance) -> DbInstance {
    DbInstance::new(
        instance.db_instance_identifier().unwrap_or_default(),
        InstanceStatus::from(instance.db_instance_status().unwrap_or_default()),
        instance.db_instance_arn().unwrap_or_default(),
    )
}

fn to_snapshot(snapshot: &types::DbSnapshot) -> DbSnapshot {
    DbSnapshot::new(
        snapshot.db_instance_identifier().unwrap_or_default(),
        snapshot.db_snapshot_identifier().unwrap_or_default(),
        snapshot.db_snapshot_arn().unwrap_or_default(),
        snapshot.snapshot_create_time().and_then(to_chrono),
        SnapshotStatus::from(snapshot.status().unwrap_or_default()),
    )
}

#[async_trait]
impl RdsApi for AwsRdsClient {
    fn region(&self) -> &str {
        &self.region
    }

    async fn describe_instances(&self, marker: Option<String>, page_size: i32) -> Result<Page<DbInstance>> {
        let output = self
            .client
            .describe_db_instances()
            .set_marker(marker)
            .max_records(page_size)
            .send()
            .await
            .map_err(|e| provider_error("DescribeDBInstances", e))?;

        Ok(Page {
            items: output.db_instances().iter().map(to_instance).collect(),
            marker: output.marker().map(str::to_string),
        })
    }

    async fn list_tags(&self, arn: &str) -> Result<Vec<Tag>> {
        let output = self
            .client
            .list_tags_for_resource()
            .resource_name(arn)
            .send()
            .await
            .map_err(|e| provider_error("ListTagsForResource", e))?;

        Ok(output
            .tag_list()
            .iter()
            .map(|t| Tag::new(t.key().unwrap_or_default(), t.value().unwrap_or_default()))
            .collect())
    }

    async fn describe_snapshots(
        &self,
        instance_identifier: &str,
        marker: Option<String>,
        page_size: i32,
    ) -> Result<Page<DbSnapshot>> {
        let output = self
            .client
            .describe_db_snapshots()
            .db_instance_identifier(instance_identifier)
            .set_marker(marker)
            .max_records(page_size)
            .send()
            .await
            .map_err(|e| provider_error("DescribeDBSnapshots", e))?;

        Ok(Page {
            items: output.db_snapshots().iter().map(to_snapshot).collect(),
            marker: output.marker().map(str::to_string),
        })
    }

    async fn describe_snapshot(&self, identifier: &str) -> Result<DbSnapshot> {
        let output = match self
            .client
            .describe_db_snapshots()
            .db_snapshot_identifier(identifier)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                if e.as_service_error().is_some_and(|s| s.is_db_snapshot_not_found_fault()) {
                    return Err(CopierError::SnapshotNotFound {
                        identifier: identifier.to_string(),
                    });
                }
                return Err(provider_error("DescribeDBSnapshots", e));
            }
        };

        output
            .db_snapshots()
            .first()
            .map(to_snapshot)
            .ok_or_else(|| CopierError::SnapshotNotFound {
                identifier: identifier.to_string(),
            })
    }

    async fn presign_copy(&self, request: &CopySnapshotRequest, expires_in: Duration) -> Result<String> {
        let credentials = self.signing_credentials().await?;
        CopyPresigner::new(credentials, self.region.clone()).presign(request, expires_in, Utc::now())
    }

    async fn copy_snapshot(&self, request: &CopySnapshotRequest) -> Result<DbSnapshot> {
        let output = self
            .client
            .copy_db_snapshot()
            .source_db_snapshot_identifier(&request.source_snapshot_arn)
            .target_db_snapshot_identifier(&request.target_identifier)
            .set_kms_key_id(request.kms_key_id.clone())
            .set_pre_signed_url(request.pre_signed_url.clone())
            .send()
            .await
            .map_err(|e| provider_error("CopyDBSnapshot", e))?;

        output
            .db_snapshot()
            .map(to_snapshot)
            .ok_or_else(|| CopierError::provider("CopyDBSnapshot", "response carried no snapshot"))
    }

    async fn delete_snapshot(&self, identifier: &str) -> Result<DbSnapshot> {
        let output = match self
            .client
            .delete_db_snapshot()
            .db_snapshot_identifier(identifier)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                if e.as_service_error().is_some_and(|s| s.is_db_snapshot_not_found_fault()) {
                    return Err(CopierError::SnapshotNotFound {
                        identifier: identifier.to_string(),
                    });
                }
                return Err(provider_error("DeleteDBSnapshot", e));
            }
        };

        output
            .db_snapshot()
            .map(to_snapshot)
            .ok_or_else(|| CopierError::provider("DeleteDBSnapshot", "response carried no snapshot"))
    }
}

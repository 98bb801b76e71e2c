//! Instance enumeration and tag-based scoping.

use std::sync::Arc;

use crate::client::RdsApi;
use crate::config::Pacing;
use crate::error::Result;
use crate::model::DbInstance;

/// Lists and filters database instances in one region.
#[derive(Clone)]
pub struct InstanceLister {
    client: Arc<dyn RdsApi>,
    pacing: Pacing,
}

impl InstanceLister {
    /// Create a lister over a regional client.
    pub fn new(client: Arc<dyn RdsApi>, pacing: Pacing) -> Self {
        Self { client, pacing }
    }

    /// Enumerate every instance in the region.
    ///
    /// Paginates until the provider stops returning markers or the page
    /// ceiling is reached, pausing after each page.
    pub async fn list(&self) -> Result<Vec<DbInstance>> {
        let mut instances = Vec::new();
        let mut marker = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .describe_instances(marker, self.pacing.instance_page_size)
                .await?;
            pages += 1;
            instances.extend(page.items);
            tokio::time::sleep(self.pacing.anti_rate_limit()).await;

            match page.marker {
                Some(next) if pages < self.pacing.max_pages => marker = Some(next),
                Some(_) => {
                    tracing::warn!(
                        region = %self.client.region(),
                        pages,
                        "Instance listing hit the page ceiling"
                    );
                    break;
                }
                None => break,
            }
        }

        Ok(instances)
    }

    /// Value of tag `key` on the resource `arn`; empty if the tag is absent.
    pub async fn tag_value(&self, arn: &str, key: &str) -> Result<String> {
        let tags = self.client.list_tags(arn).await?;
        Ok(tags
            .into_iter()
            .find(|t| t.key == key)
            .map(|t| t.value)
            .unwrap_or_default())
    }

    /// Keep instances that are available and carry a non-empty `tag_key`.
    ///
    /// A failed tag lookup skips that instance only.
    pub async fn filter(&self, instances: Vec<DbInstance>, tag_key: &str) -> Vec<DbInstance> {
        let mut in_scope = Vec::new();

        for instance in instances {
            if !instance.status.is_available() {
                tracing::info!(
                    instance = %instance.identifier,
                    status = %instance.status,
                    "Skipping instance that is not available"
                );
                continue;
            }

            let value = match self.tag_value(&instance.arn, tag_key).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        instance = %instance.identifier,
                        error = %e,
                        "Failed to read instance tags"
                    );
                    tokio::time::sleep(self.pacing.anti_rate_limit()).await;
                    continue;
                }
            };
            tokio::time::sleep(self.pacing.anti_rate_limit()).await;

            if value.is_empty() {
                continue;
            }

            tracing::info!(instance = %instance.identifier, tag = %tag_key, "Found in-scope instance");
            in_scope.push(instance);
        }

        in_scope
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use common_azure::LeaseStatus;
use metrics::counter;
use tracing::{debug, warn};

use super::{DiscoverySource, WorkItem};
use crate::storage::BlobStore;

/// Discovers work by enumerating a fixed set of containers and keeping
/// the blobs nobody holds a lease on. A container that fails to list
/// contributes nothing this cycle; the others still do.
pub struct ContainerListSource<B: ?Sized> {
    store: Arc<B>,
    containers: Vec<String>,
}

impl<B: BlobStore + ?Sized> ContainerListSource<B> {
    pub fn new(store: Arc<B>, containers: Vec<String>) -> Self {
        ContainerListSource { store, containers }
    }
}

#[async_trait]
impl<B: BlobStore + ?Sized> DiscoverySource for ContainerListSource<B> {
    async fn poll(&self) -> Vec<WorkItem> {
        let mut items = Vec::new();
        for container in &self.containers {
            let entries = match self.store.list_blobs(container).await {
                Ok(entries) => entries,
                Err(error) => {
                    counter!("capture_import_discovery_failures_total").increment(1);
                    warn!(container, %error, "failed to list container, skipping it this cycle");
                    continue;
                }
            };
            let candidates = entries
                .into_iter()
                .filter(|entry| entry.lease_status == LeaseStatus::Unlocked);
            for entry in candidates {
                items.push(WorkItem {
                    container: container.clone(),
                    blob_name: entry.name,
                    receipt: None,
                });
            }
        }
        debug!(discovered = items.len(), "container listing complete");
        items
    }
}

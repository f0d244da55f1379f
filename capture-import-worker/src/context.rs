use std::sync::Arc;

use anyhow::Context as _;
use common_azure::{BlobClient, QueueClient, StorageCredentials};
use health::{HealthHandle, HealthRegistry};
use tracing::info;

use crate::config::{Config, DiscoveryMode};

/// Everything the process needs that outlives a single cycle.
pub struct AppContext {
    pub config: Config,
    pub discovery_mode: DiscoveryMode,
    pub blob_client: Arc<BlobClient>,
    pub queue_client: Option<Arc<QueueClient>>,
    pub liveness: HealthRegistry,
    pub worker_liveness: HealthHandle,
}

impl AppContext {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;
        let discovery_mode = config.discovery_mode()?;

        let credentials = StorageCredentials {
            account: config.storage_account_name.clone(),
            access_key: config.storage_access_key.clone(),
        };
        let blob_client = match &config.blob_endpoint {
            Some(endpoint) => BlobClient::with_endpoint(&credentials, endpoint),
            None => BlobClient::new(&credentials),
        }
        .context("failed to build blob client")?;

        let queue_client = match &discovery_mode {
            DiscoveryMode::Queue(_) => {
                let client = match &config.queue_endpoint {
                    Some(endpoint) => QueueClient::with_endpoint(&credentials, endpoint),
                    None => QueueClient::new(&credentials),
                }
                .context("failed to build queue client")?;
                Some(Arc::new(client))
            }
            DiscoveryMode::Listing(_) => None,
        };

        let liveness = HealthRegistry::new("liveness");
        // A stalled loop is unhealthy after missing a few cycles.
        let worker_liveness =
            liveness.register("ingestion_loop".to_string(), 3 * config.fetch_interval());

        info!(
            account = config.storage_account_name,
            mode = ?discovery_mode,
            "capture import context ready"
        );

        Ok(AppContext {
            config,
            discovery_mode,
            blob_client: Arc::new(blob_client),
            queue_client,
            liveness,
            worker_liveness,
        })
    }
}

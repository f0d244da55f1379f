use std::time::Duration;

use envconfig::Envconfig;

use crate::error::ConfigError;
use crate::lease::{MAX_LEASE_SECS, MIN_LEASE_SECS};

/// Largest batch the queue service hands out per request.
pub const MAX_QUEUE_BATCH_SIZE: u32 = 32;

#[derive(Envconfig, Clone)]
pub struct Config {
    /// Tag attached to every emitted event.
    #[envconfig(from = "TAG")]
    pub tag: String,

    #[envconfig(from = "STORAGE_ACCOUNT_NAME")]
    pub storage_account_name: String,

    #[envconfig(from = "STORAGE_ACCESS_KEY")]
    pub storage_access_key: String,

    /// Comma-separated containers to poll (listing mode). Mutually
    /// exclusive with QUEUE_NAME.
    #[envconfig(from = "CONTAINER_NAMES")]
    pub container_names: Option<String>,

    /// Queue holding blob references (queue mode). Mutually exclusive
    /// with CONTAINER_NAMES.
    #[envconfig(from = "QUEUE_NAME")]
    pub queue_name: Option<String>,

    /// Output field the record body is emitted under.
    #[envconfig(from = "MESSAGE_KEY", default = "message")]
    pub message_key: String,

    #[envconfig(from = "FETCH_INTERVAL_SECS", default = "30")]
    pub fetch_interval_secs: u64,

    /// Blob lease duration, also used as the queue visibility timeout.
    /// The service only accepts 15 to 60 seconds.
    #[envconfig(from = "LEASE_DURATION_SECS", default = "60")]
    pub lease_duration_secs: u32,

    /// Messages drained from the queue per cycle, capped at 32 by the
    /// service.
    #[envconfig(from = "QUEUE_BATCH_SIZE", default = "32")]
    pub queue_batch_size: u32,

    /// Worker pool size for queue-discovered work.
    #[envconfig(from = "MAX_CONCURRENT_INGESTS", default = "4")]
    pub max_concurrent_ingests: usize,

    /// Sink selection: kafka, stdout or noop.
    #[envconfig(from = "EMITTER", default = "kafka")]
    pub emitter: String,

    #[envconfig(from = "KAFKA_HOSTS", default = "kafka:9092")]
    pub kafka_hosts: String,

    #[envconfig(from = "KAFKA_TOPIC", default = "events_capture_import")]
    pub kafka_topic: String,

    #[envconfig(from = "KAFKA_TLS", default = "false")]
    pub kafka_tls: bool,

    /// Endpoint overrides for Azurite or test servers.
    #[envconfig(from = "BLOB_ENDPOINT")]
    pub blob_endpoint: Option<String>,

    #[envconfig(from = "QUEUE_ENDPOINT")]
    pub queue_endpoint: Option<String>,

    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3305")]
    pub port: u16,
}

/// How candidate work units are discovered each cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Enumerate the given containers and ingest unlocked blobs.
    Listing(Vec<String>),
    /// Drain blob references from the given queue.
    Queue(String),
}

impl Config {
    /// Validate everything that must hold before the loop starts.
    /// Failures here abort the process once, at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_LEASE_SECS..=MAX_LEASE_SECS).contains(&self.lease_duration_secs) {
            return Err(ConfigError::LeaseDurationOutOfRange(
                self.lease_duration_secs,
            ));
        }
        if !(1..=MAX_QUEUE_BATCH_SIZE).contains(&self.queue_batch_size) {
            return Err(ConfigError::QueueBatchSizeOutOfRange(self.queue_batch_size));
        }
        if self.max_concurrent_ingests == 0 {
            return Err(ConfigError::NoConcurrency);
        }
        self.discovery_mode().map(|_| ())
    }

    pub fn discovery_mode(&self) -> Result<DiscoveryMode, ConfigError> {
        let containers: Vec<String> = self
            .container_names
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();
        let queue = self
            .queue_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());
        match (containers.is_empty(), queue) {
            (false, None) => Ok(DiscoveryMode::Listing(containers)),
            (true, Some(queue)) => Ok(DiscoveryMode::Queue(queue.to_string())),
            (false, Some(_)) => Err(ConfigError::AmbiguousDiscovery),
            (true, None) => Err(ConfigError::MissingDiscovery),
        }
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

use thiserror::Error;

/// Startup configuration problems. These are fatal: they are raised
/// once when the process starts and never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("lease_duration_secs must be between 15 and 60: {0}")]
    LeaseDurationOutOfRange(u32),
    #[error("queue_batch_size must be between 1 and 32: {0}")]
    QueueBatchSizeOutOfRange(u32),
    #[error("max_concurrent_ingests must be at least 1")]
    NoConcurrency,
    #[error("exactly one of container_names or queue_name must be set, got both")]
    AmbiguousDiscovery,
    #[error("exactly one of container_names or queue_name must be set, got neither")]
    MissingDiscovery,
    #[error("unknown emitter kind: {0}")]
    UnknownEmitter(String),
}

/// Failure of one work unit's pipeline. Never fatal to the loop: the
/// unit is logged, abandoned, and retried by a future lease owner.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("storage operation failed: {0}")]
    Storage(#[from] common_azure::AzureStorageError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to emit event batch: {0}")]
    Emit(String),
}

/// Structural decode failure for one capture payload.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid capture container: {0}")]
    Container(#[from] apache_avro::Error),
    #[error("capture entry is not an Avro record")]
    NotARecord,
    #[error("capture record is missing the {0} field")]
    MissingField(&'static str),
    #[error("unexpected value type for the {0} field")]
    FieldType(&'static str),
    #[error("could not parse enqueue time {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },
}

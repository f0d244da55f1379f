//! Event sinks.
//!
//! Every record recovered from a capture blob becomes an
//! [`EmittedEvent`] and is handed to an [`Emitter`] as part of the
//! blob's batch. The batch must be fully accepted before the blob is
//! retired; a sink failure abandons the blob for a later retry.

pub mod kafka;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::decode::CapturedRecord;
use crate::error::{ConfigError, IngestError};

pub use kafka::KafkaEmitter;

/// A decoded record shaped for the downstream sink: the configured
/// tag, the original enqueue time, and the body under the configured
/// message key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmittedEvent {
    pub tag: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub record: serde_json::Map<String, serde_json::Value>,
}

impl EmittedEvent {
    pub fn new(tag: &str, record: &CapturedRecord, message_key: &str) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert(
            message_key.to_string(),
            serde_json::Value::String(record.body.clone()),
        );
        EmittedEvent {
            tag: tag.to_string(),
            timestamp: record.enqueued_at,
            record: fields,
        }
    }
}

#[async_trait]
pub trait Emitter: Send + Sync {
    /// Deliver a batch of events. Returning `Ok` means every event is
    /// durably accepted by the sink; only then may the caller retire
    /// the blob the batch came from.
    async fn emit_batch(&self, events: &[EmittedEvent]) -> Result<(), IngestError>;
}

/// Sink selection from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterKind {
    Kafka,
    Stdout,
    NoOp,
}

impl FromStr for EmitterKind {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_lowercase().as_str() {
            "kafka" => Ok(EmitterKind::Kafka),
            "stdout" => Ok(EmitterKind::Stdout),
            "noop" => Ok(EmitterKind::NoOp),
            _ => Err(ConfigError::UnknownEmitter(raw.to_string())),
        }
    }
}

/// Writes one JSON line per event. Useful for local runs against
/// Azurite.
pub struct StdoutEmitter;

#[async_trait]
impl Emitter for StdoutEmitter {
    async fn emit_batch(&self, events: &[EmittedEvent]) -> Result<(), IngestError> {
        for event in events {
            let line = serde_json::to_string(event)
                .map_err(|err| IngestError::Emit(err.to_string()))?;
            println!("{line}");
        }
        Ok(())
    }
}

/// Accepts and discards everything. Lets the rest of the pipeline be
/// soak-tested without a sink attached.
pub struct NoOpEmitter;

#[async_trait]
impl Emitter for NoOpEmitter {
    async fn emit_batch(&self, events: &[EmittedEvent]) -> Result<(), IngestError> {
        info!(count = events.len(), "discarding event batch");
        Ok(())
    }
}

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use tracing::{debug, error, info};

use super::{EmittedEvent, Emitter};
use crate::config::Config;
use crate::error::IngestError;

/// Produces each event as a JSON message on a single topic, keyed by
/// the event tag. A batch only succeeds once every broker ack is in.
pub struct KafkaEmitter {
    producer: FutureProducer,
    topic: String,
}

impl KafkaEmitter {
    pub fn new(config: &Config) -> anyhow::Result<KafkaEmitter> {
        info!("connecting to Kafka brokers at {}...", config.kafka_hosts);

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("message.timeout.ms", "10000");

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer = client_config.create()?;

        // Ping the cluster to make sure we can reach brokers, fail after 10 seconds
        drop(
            producer
                .client()
                .fetch_metadata(Some(&config.kafka_topic), Timeout::After(Duration::new(10, 0)))?,
        );
        info!("connected to Kafka brokers");

        Ok(KafkaEmitter {
            producer,
            topic: config.kafka_topic.clone(),
        })
    }

    fn send(&self, event: &EmittedEvent) -> Result<DeliveryFuture, IngestError> {
        let payload = serde_json::to_string(event).map_err(|err| {
            error!("failed to serialize event: {}", err);
            IngestError::Emit(err.to_string())
        })?;

        match self.producer.send_result(FutureRecord {
            topic: &self.topic,
            payload: Some(&payload),
            partition: None,
            key: Some(&event.tag),
            timestamp: None,
            headers: None,
        }) {
            Ok(ack) => Ok(ack),
            Err((err, _)) => {
                counter!("capture_import_kafka_produce_errors_total").increment(1);
                error!("failed to enqueue event for produce: {}", err);
                Err(IngestError::Emit(err.to_string()))
            }
        }
    }

    async fn await_ack(delivery: DeliveryFuture) -> Result<(), IngestError> {
        match delivery.await {
            Err(_) => {
                counter!("capture_import_kafka_produce_errors_total").increment(1);
                error!("failed to produce to Kafka before write timeout");
                Err(IngestError::Emit("produce timed out".to_string()))
            }
            Ok(Err((err, _))) => {
                counter!("capture_import_kafka_produce_errors_total").increment(1);
                error!("failed to produce to Kafka: {}", err);
                Err(IngestError::Emit(err.to_string()))
            }
            Ok(Ok(_)) => Ok(()),
        }
    }
}

#[async_trait]
impl Emitter for KafkaEmitter {
    async fn emit_batch(&self, events: &[EmittedEvent]) -> Result<(), IngestError> {
        let mut deliveries = Vec::with_capacity(events.len());
        for event in events {
            deliveries.push(self.send(event)?);
        }
        for delivery in deliveries {
            Self::await_ack(delivery).await?;
        }
        Ok(())
    }
}

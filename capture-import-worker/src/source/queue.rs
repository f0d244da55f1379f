use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use metrics::counter;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{DiscoverySource, QueueReceipt, WorkItem};
use crate::storage::MessageQueue;

/// Blob reference carried in a queue message body, base64-encoded JSON
/// written by the capture notification feed.
#[derive(Debug, Deserialize)]
struct BlobRef {
    #[serde(rename = "Container")]
    container: String,
    #[serde(rename = "Name")]
    name: String,
}

/// Discovers work by draining blob references from a storage queue.
/// The visibility timeout doubles as the lease duration, so a message
/// reappears on its own if the worker dies mid-ingest.
pub struct QueueSource<Q: ?Sized> {
    queue: Arc<Q>,
    queue_name: String,
    visibility_timeout_secs: u32,
    batch_size: u32,
}

impl<Q: MessageQueue + ?Sized> QueueSource<Q> {
    pub fn new(
        queue: Arc<Q>,
        queue_name: String,
        visibility_timeout_secs: u32,
        batch_size: u32,
    ) -> Self {
        QueueSource {
            queue,
            queue_name,
            visibility_timeout_secs,
            batch_size,
        }
    }

    fn decode_reference(&self, message_id: &str, text: &str) -> Option<BlobRef> {
        let raw = match BASE64.decode(text) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(message_id, %error, "queue message body is not base64, skipping");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(blob_ref) => Some(blob_ref),
            Err(error) => {
                warn!(message_id, %error, "queue message is not a blob reference, skipping");
                None
            }
        }
    }
}

#[async_trait]
impl<Q: MessageQueue + ?Sized> DiscoverySource for QueueSource<Q> {
    async fn poll(&self) -> Vec<WorkItem> {
        let messages = match self
            .queue
            .get_messages(&self.queue_name, self.visibility_timeout_secs, self.batch_size)
            .await
        {
            Ok(messages) => messages,
            Err(error) => {
                counter!("capture_import_discovery_failures_total").increment(1);
                warn!(queue = self.queue_name, %error, "failed to poll queue, skipping this cycle");
                return Vec::new();
            }
        };
        debug!(queue = self.queue_name, received = messages.len(), "queue poll complete");
        messages
            .into_iter()
            .filter_map(|message| {
                // A malformed message is left invisible until its
                // timeout lapses; it will be reported again each cycle.
                let blob_ref = self.decode_reference(&message.id, &message.text)?;
                Some(WorkItem {
                    container: blob_ref.container,
                    blob_name: blob_ref.name,
                    receipt: Some(QueueReceipt {
                        message_id: message.id,
                        pop_receipt: message.pop_receipt,
                    }),
                })
            })
            .collect()
    }
}

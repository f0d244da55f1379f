//! In-memory stand-ins for the storage service and the event sink,
//! shared by the pipeline, discovery and worker tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use common_azure::{AzureStorageError, BlobEntry, LeaseStatus, QueueMessage};

use crate::emit::{EmittedEvent, Emitter};
use crate::error::IngestError;
use crate::storage::{BlobStore, MessageQueue};

const CAPTURE_SCHEMA: &str = r#"
{
    "type": "record",
    "name": "EventData",
    "fields": [
        {"name": "SequenceNumber", "type": "long"},
        {"name": "Offset", "type": "string"},
        {"name": "EnqueuedTimeUtc", "type": "string"},
        {"name": "Body", "type": "bytes"}
    ]
}"#;

/// Build a well-formed capture blob from `(enqueued_time, body)` pairs.
pub fn capture_blob(entries: &[(&str, &[u8])]) -> Vec<u8> {
    capture_blob_blocks(&[entries])
}

/// Build a capture blob with one container block per entry slice.
pub fn capture_blob_blocks(blocks: &[&[(&str, &[u8])]]) -> Vec<u8> {
    use apache_avro::types::{Record, Value};
    use apache_avro::{Schema, Writer};

    let schema = Schema::parse_str(CAPTURE_SCHEMA).unwrap();
    let mut writer = Writer::new(&schema, Vec::new());
    let mut sequence = 0i64;
    for entries in blocks {
        for (enqueued, body) in *entries {
            let mut record = Record::new(writer.schema()).unwrap();
            record.put("SequenceNumber", sequence);
            record.put("Offset", sequence.to_string());
            record.put("EnqueuedTimeUtc", *enqueued);
            record.put("Body", Value::Bytes(body.to_vec()));
            writer.append(record).unwrap();
            sequence += 1;
        }
        writer.flush().unwrap();
    }
    writer.into_inner().unwrap()
}

fn service_unavailable() -> AzureStorageError {
    AzureStorageError::Service {
        status: 503,
        body: "simulated outage".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List(String),
    Lease {
        container: String,
        blob: String,
        duration_secs: u32,
    },
    Get {
        container: String,
        blob: String,
    },
    Delete {
        container: String,
        blob: String,
        lease_id: String,
    },
}

#[derive(Default)]
pub struct FakeBlobStore {
    blobs: Mutex<BTreeMap<(String, String), Bytes>>,
    locked: HashSet<(String, String)>,
    conflicting: HashSet<(String, String)>,
    fail_list: bool,
    conflict: bool,
    fail_lease: bool,
    fail_get: bool,
    fail_delete: bool,
    lease_counter: AtomicU64,
    calls: Mutex<Vec<StoreCall>>,
}

impl FakeBlobStore {
    pub fn with_blob(self, container: &str, blob: &str, payload: &[u8]) -> Self {
        self.blobs.lock().unwrap().insert(
            (container.to_string(), blob.to_string()),
            Bytes::copy_from_slice(payload),
        );
        self
    }

    /// The next listing reports this blob as held by another owner.
    pub fn with_locked_blob(mut self, container: &str, blob: &str, payload: &[u8]) -> Self {
        self.locked
            .insert((container.to_string(), blob.to_string()));
        self.with_blob(container, blob, payload)
    }

    /// Listed as unlocked, but every lease attempt on it conflicts, as
    /// when another worker wins the race after the listing.
    pub fn with_contested_blob(mut self, container: &str, blob: &str, payload: &[u8]) -> Self {
        self.conflicting
            .insert((container.to_string(), blob.to_string()));
        self.with_blob(container, blob, payload)
    }

    pub fn listings_fail(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn leases_conflict(mut self) -> Self {
        self.conflict = true;
        self
    }

    pub fn leases_fail(mut self) -> Self {
        self.fail_lease = true;
        self
    }

    pub fn downloads_fail(mut self) -> Self {
        self.fail_get = true;
        self
    }

    pub fn deletes_fail(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remaining_blobs(&self) -> Vec<(String, String)> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobEntry>, AzureStorageError> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::List(container.to_string()));
        if self.fail_list {
            return Err(service_unavailable());
        }
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == container)
            .map(|key| BlobEntry {
                name: key.1.clone(),
                lease_status: if self.locked.contains(key) {
                    LeaseStatus::Locked
                } else {
                    LeaseStatus::Unlocked
                },
            })
            .collect())
    }

    async fn acquire_lease(
        &self,
        container: &str,
        blob: &str,
        duration_secs: u32,
    ) -> Result<String, AzureStorageError> {
        self.calls.lock().unwrap().push(StoreCall::Lease {
            container: container.to_string(),
            blob: blob.to_string(),
            duration_secs,
        });
        if self.fail_lease {
            return Err(service_unavailable());
        }
        if !self
            .blobs
            .lock()
            .unwrap()
            .contains_key(&(container.to_string(), blob.to_string()))
        {
            return Err(AzureStorageError::NotFound);
        }
        if self.conflict
            || self
                .conflicting
                .contains(&(container.to_string(), blob.to_string()))
        {
            return Err(AzureStorageError::Conflict);
        }
        let n = self.lease_counter.fetch_add(1, Ordering::Relaxed);
        Ok(format!("lease-{n}"))
    }

    async fn get_blob(&self, container: &str, blob: &str) -> Result<Bytes, AzureStorageError> {
        self.calls.lock().unwrap().push(StoreCall::Get {
            container: container.to_string(),
            blob: blob.to_string(),
        });
        if self.fail_get {
            return Err(service_unavailable());
        }
        self.blobs
            .lock()
            .unwrap()
            .get(&(container.to_string(), blob.to_string()))
            .cloned()
            .ok_or(AzureStorageError::NotFound)
    }

    async fn delete_blob(
        &self,
        container: &str,
        blob: &str,
        lease_id: &str,
    ) -> Result<(), AzureStorageError> {
        self.calls.lock().unwrap().push(StoreCall::Delete {
            container: container.to_string(),
            blob: blob.to_string(),
            lease_id: lease_id.to_string(),
        });
        if self.fail_delete {
            return Err(service_unavailable());
        }
        self.blobs
            .lock()
            .unwrap()
            .remove(&(container.to_string(), blob.to_string()))
            .map(|_| ())
            .ok_or(AzureStorageError::NotFound)
    }
}

#[derive(Default)]
pub struct FakeQueue {
    messages: Mutex<Vec<QueueMessage>>,
    fail_get: bool,
    fail_delete: bool,
    requests: Mutex<Vec<(u32, u32)>>,
    deleted: Mutex<Vec<(String, String)>>,
}

impl FakeQueue {
    pub fn with_message(self, id: &str, text: &str) -> Self {
        self.messages.lock().unwrap().push(QueueMessage {
            id: id.to_string(),
            pop_receipt: format!("receipt-{id}"),
            text: text.to_string(),
        });
        self
    }

    /// Enqueue a well-formed blob reference, encoded the way the
    /// capture notification feed encodes them.
    pub fn with_blob_reference(self, id: &str, container: &str, blob: &str) -> Self {
        use base64::Engine;
        let body = serde_json::json!({ "Container": container, "Name": blob });
        let text = base64::engine::general_purpose::STANDARD.encode(body.to_string());
        self.with_message(id, &text)
    }

    pub fn polls_fail(mut self) -> Self {
        self.fail_get = true;
        self
    }

    pub fn deletes_fail(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    /// `(visibility_timeout_secs, max_messages)` for each poll.
    pub fn requests(&self) -> Vec<(u32, u32)> {
        self.requests.lock().unwrap().clone()
    }

    /// `(message_id, pop_receipt)` for each delete.
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageQueue for FakeQueue {
    async fn get_messages(
        &self,
        _queue: &str,
        visibility_timeout_secs: u32,
        max_messages: u32,
    ) -> Result<Vec<QueueMessage>, AzureStorageError> {
        self.requests
            .lock()
            .unwrap()
            .push((visibility_timeout_secs, max_messages));
        if self.fail_get {
            return Err(service_unavailable());
        }
        let mut messages = self.messages.lock().unwrap();
        let take = (max_messages as usize).min(messages.len());
        Ok(messages.drain(..take).collect())
    }

    async fn delete_message(
        &self,
        _queue: &str,
        message_id: &str,
        pop_receipt: &str,
    ) -> Result<(), AzureStorageError> {
        if self.fail_delete {
            return Err(service_unavailable());
        }
        self.deleted
            .lock()
            .unwrap()
            .push((message_id.to_string(), pop_receipt.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEmitter {
    batches: Mutex<Vec<Vec<EmittedEvent>>>,
    fail: bool,
}

impl RecordingEmitter {
    pub fn failing() -> Self {
        RecordingEmitter {
            batches: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn batches(&self) -> Vec<Vec<EmittedEvent>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Emitter for RecordingEmitter {
    async fn emit_batch(&self, events: &[EmittedEvent]) -> Result<(), IngestError> {
        if self.fail {
            return Err(IngestError::Emit("simulated sink failure".to_string()));
        }
        self.batches.lock().unwrap().push(events.to_vec());
        Ok(())
    }
}

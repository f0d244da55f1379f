//! One blob's journey: lease, fetch, decode, emit, retire.
//!
//! Each step can fail without affecting any other work unit. A blob
//! that fails after the lease is taken is simply abandoned; its lease
//! lapses on its own and a later cycle (here or on another worker)
//! picks it up again. The one irrecoverable overlap is a batch that
//! was emitted but whose blob could not be deleted: the next owner
//! will emit it again, which is why delivery is at-least-once.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::emit::{EmittedEvent, Emitter};
use crate::lease::{try_acquire, LeaseOutcome};
use crate::storage::BlobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another worker holds the lease.
    AlreadyLeased,
    /// The blob was gone by the time we tried to lease it.
    Vanished,
}

/// Terminal state of one ingest attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Emitted and retired. The unit will never be seen again.
    Completed,
    /// Emitted, but the delete failed. The unit will be re-ingested
    /// and its records delivered again.
    EmittedNotRetired,
    /// Never ours to ingest this cycle.
    Skipped(SkipReason),
    /// Failed mid-pipeline before anything was emitted. The lease
    /// lapses and the unit is retried later.
    Abandoned,
}

pub struct IngestPipeline<B: ?Sized, E: ?Sized> {
    store: Arc<B>,
    emitter: Arc<E>,
    tag: String,
    message_key: String,
    lease_duration_secs: u32,
}

impl<B: BlobStore + ?Sized, E: Emitter + ?Sized> IngestPipeline<B, E> {
    pub fn new(
        store: Arc<B>,
        emitter: Arc<E>,
        tag: String,
        message_key: String,
        lease_duration_secs: u32,
    ) -> Self {
        IngestPipeline {
            store,
            emitter,
            tag,
            message_key,
            lease_duration_secs,
        }
    }

    /// Drive one blob from discovery to retirement. Never returns an
    /// error: every failure mode maps to an outcome the caller can
    /// count and move on from.
    pub async fn ingest_blob(&self, container: &str, blob: &str) -> IngestOutcome {
        let lease_id = match try_acquire(&*self.store, container, blob, self.lease_duration_secs)
            .await
        {
            Ok(LeaseOutcome::Acquired(lease_id)) => lease_id,
            Ok(LeaseOutcome::AlreadyLeased) => {
                counter!("capture_import_lease_conflicts_total").increment(1);
                return IngestOutcome::Skipped(SkipReason::AlreadyLeased);
            }
            Ok(LeaseOutcome::Vanished) => {
                return IngestOutcome::Skipped(SkipReason::Vanished);
            }
            Err(error) => {
                counter!("capture_import_blobs_abandoned_total").increment(1);
                warn!(container, blob, %error, "failed to acquire lease, abandoning blob");
                return IngestOutcome::Abandoned;
            }
        };

        let payload = match self.store.get_blob(container, blob).await {
            Ok(payload) => payload,
            Err(error) => {
                counter!("capture_import_blobs_abandoned_total").increment(1);
                warn!(container, blob, %error, "failed to download blob, abandoning it");
                return IngestOutcome::Abandoned;
            }
        };

        let records = match crate::decode::decode_capture_blob(&payload) {
            Ok(records) => records,
            Err(error) => {
                counter!("capture_import_blobs_abandoned_total").increment(1);
                warn!(container, blob, %error, "failed to decode blob, abandoning it");
                return IngestOutcome::Abandoned;
            }
        };

        let events: Vec<EmittedEvent> = records
            .iter()
            .map(|record| EmittedEvent::new(&self.tag, record, &self.message_key))
            .collect();

        // An empty batch still goes through the sink so an all-empty
        // blob is retired rather than rediscovered forever.
        if let Err(error) = self.emitter.emit_batch(&events).await {
            counter!("capture_import_blobs_abandoned_total").increment(1);
            warn!(container, blob, %error, "failed to emit event batch, abandoning blob");
            return IngestOutcome::Abandoned;
        }

        match self.store.delete_blob(container, blob, &lease_id).await {
            Ok(()) => {
                counter!("capture_import_blobs_ingested_total").increment(1);
                counter!("capture_import_events_emitted_total").increment(events.len() as u64);
                debug!(container, blob, events = events.len(), "blob ingested and retired");
                IngestOutcome::Completed
            }
            Err(error) => {
                counter!("capture_import_emitted_not_retired_total").increment(1);
                warn!(
                    container, blob, %error,
                    "records emitted but blob not deleted, it will be ingested again"
                );
                IngestOutcome::EmittedNotRetired
            }
        }
    }
}

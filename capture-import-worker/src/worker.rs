//! The ingestion loop.
//!
//! On a fixed cadence the worker polls its discovery source and drives
//! every discovered blob through the pipeline. Listing-discovered work
//! is processed inline; queue-discovered work is fanned out to a
//! bounded pool, and each message is deleted only once its blob made
//! it all the way through retirement.

use std::sync::Arc;
use std::time::Duration;

use health::HealthHandle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::emit::Emitter;
use crate::pipeline::{IngestOutcome, IngestPipeline};
use crate::source::{DiscoverySource, WorkItem};
use crate::storage::{BlobStore, MessageQueue};

/// Where completed queue-discovered work retires its message.
#[derive(Clone)]
pub struct QueueRetirement {
    pub queue: Arc<dyn MessageQueue>,
    pub queue_name: String,
}

#[derive(Clone)]
pub struct CaptureWorker {
    pipeline: Arc<IngestPipeline<dyn BlobStore, dyn Emitter>>,
    source: Arc<dyn DiscoverySource>,
    retirement: Option<QueueRetirement>,
    fetch_interval: Duration,
    concurrency: usize,
    liveness: HealthHandle,
}

impl CaptureWorker {
    pub fn new(
        pipeline: Arc<IngestPipeline<dyn BlobStore, dyn Emitter>>,
        source: Arc<dyn DiscoverySource>,
        retirement: Option<QueueRetirement>,
        fetch_interval: Duration,
        concurrency: usize,
        liveness: HealthHandle,
    ) -> Self {
        CaptureWorker {
            pipeline,
            source,
            retirement,
            fetch_interval,
            concurrency,
            liveness,
        }
    }

    /// Poll-and-ingest until cancelled, then drain in-flight work.
    /// Cycle deadlines advance from the previous deadline, not from
    /// when a cycle happens to finish; when a cycle overruns its
    /// deadline the next one starts immediately.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.fetch_interval);
        let tracker = TaskTracker::new();
        let limiter = Arc::new(Semaphore::new(self.concurrency));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.liveness.report_healthy();
            self.run_cycle(&shutdown, &tracker, &limiter).await;
        }

        info!("waiting for in-flight ingests before shutdown");
        tracker.close();
        tracker.wait().await;
    }

    pub(crate) async fn run_cycle(
        &self,
        shutdown: &CancellationToken,
        tracker: &TaskTracker,
        limiter: &Arc<Semaphore>,
    ) {
        for item in self.source.poll().await {
            // Observed between items as well as between cycles, so a
            // long listing does not hold up shutdown.
            if shutdown.is_cancelled() {
                return;
            }
            if item.receipt.is_some() {
                // Blocks once the pool is saturated, which in turn
                // paces how fast the queue is drained.
                let Ok(permit) = limiter.clone().acquire_owned().await else {
                    return;
                };
                let worker = self.clone();
                tracker.spawn(async move {
                    worker.process_item(item).await;
                    drop(permit);
                });
            } else {
                self.process_item(item).await;
            }
        }
    }

    async fn process_item(&self, item: WorkItem) {
        let outcome = self
            .pipeline
            .ingest_blob(&item.container, &item.blob_name)
            .await;
        let (Some(receipt), Some(retirement)) = (item.receipt, self.retirement.as_ref()) else {
            return;
        };
        if outcome != IngestOutcome::Completed {
            return;
        }
        if let Err(error) = retirement
            .queue
            .delete_message(
                &retirement.queue_name,
                &receipt.message_id,
                &receipt.pop_receipt,
            )
            .await
        {
            // Best-effort: the message reappears after its visibility
            // timeout and the blob's absence makes the retry a no-op.
            warn!(
                message_id = receipt.message_id, %error,
                "failed to delete queue message, it will be redelivered"
            );
        }
    }
}

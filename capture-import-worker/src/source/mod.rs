//! Discovery of candidate work units.
//!
//! A source produces the blobs worth ingesting this cycle, either by
//! enumerating containers or by draining a notification queue.
//! Discovery failures are isolated inside the source: a failing
//! container or queue poll yields an empty (or partial) batch and the
//! loop carries on.

pub mod listing;
pub mod queue;

use async_trait::async_trait;

pub use listing::ContainerListSource;
pub use queue::QueueSource;

/// Proof that a work unit came from a queue message. Carried through
/// ingestion so the message can be deleted once the blob is retired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueReceipt {
    pub message_id: String,
    pub pop_receipt: String,
}

/// One candidate blob to ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub container: String,
    pub blob_name: String,
    pub receipt: Option<QueueReceipt>,
}

#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Candidates for this cycle. Sources swallow their own failures
    /// and return whatever they managed to discover.
    async fn poll(&self) -> Vec<WorkItem>;
}

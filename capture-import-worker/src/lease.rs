use common_azure::AzureStorageError;
use tracing::trace;

use crate::error::IngestError;
use crate::storage::BlobStore;

/// Lease bounds enforced by the storage service.
pub const MIN_LEASE_SECS: u32 = 15;
pub const MAX_LEASE_SECS: u32 = 60;

/// Result of a lease attempt on a discovered blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome {
    /// We own the blob for the lease duration. The token must accompany
    /// the eventual delete.
    Acquired(String),
    /// Another worker holds the lease. Routine under concurrent workers.
    AlreadyLeased,
    /// The blob disappeared between discovery and the lease attempt,
    /// typically because another worker already retired it.
    Vanished,
}

/// Try to take an exclusive lease on a blob. Conflicts and missing
/// blobs are expected outcomes, not errors.
pub async fn try_acquire<B: BlobStore + ?Sized>(
    store: &B,
    container: &str,
    blob: &str,
    duration_secs: u32,
) -> Result<LeaseOutcome, IngestError> {
    match store.acquire_lease(container, blob, duration_secs).await {
        Ok(lease_id) => Ok(LeaseOutcome::Acquired(lease_id)),
        Err(AzureStorageError::Conflict) => {
            trace!(container, blob, "blob already leased by another worker");
            Ok(LeaseOutcome::AlreadyLeased)
        }
        Err(AzureStorageError::NotFound) => {
            trace!(container, blob, "blob gone before lease was acquired");
            Ok(LeaseOutcome::Vanished)
        }
        Err(err) => Err(err.into()),
    }
}

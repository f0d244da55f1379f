//! A minimal Azure Storage REST client covering the operations the
//! capture import worker consumes: container listing, blob leasing,
//! download, delete, and queue message retrieval/deletion.
//!
//! Requests are signed with Shared Key authorization; errors are
//! classified so callers can tell routine contention (409/404) apart
//! from transient service failures.

mod auth;
mod blob;
mod error;
mod queue;
mod transport;

pub use blob::{BlobClient, BlobEntry, LeaseStatus};
pub use error::AzureStorageError;
pub use queue::{QueueClient, QueueMessage};

/// Storage account credentials. The access key is the base64-encoded
/// account key from the Azure portal.
#[derive(Debug, Clone)]
pub struct StorageCredentials {
    pub account: String,
    pub access_key: String,
}

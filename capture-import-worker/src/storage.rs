//! Seam between the pipeline and the storage service.
//!
//! The worker only ever talks to storage through these two traits so
//! the pipeline and discovery strategies can be exercised against
//! in-memory fakes. The production implementations forward to the
//! `common-azure` clients.

use async_trait::async_trait;
use bytes::Bytes;
use common_azure::{AzureStorageError, BlobClient, BlobEntry, QueueClient, QueueMessage};

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobEntry>, AzureStorageError>;

    async fn acquire_lease(
        &self,
        container: &str,
        blob: &str,
        duration_secs: u32,
    ) -> Result<String, AzureStorageError>;

    async fn get_blob(&self, container: &str, blob: &str) -> Result<Bytes, AzureStorageError>;

    async fn delete_blob(
        &self,
        container: &str,
        blob: &str,
        lease_id: &str,
    ) -> Result<(), AzureStorageError>;
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn get_messages(
        &self,
        queue: &str,
        visibility_timeout_secs: u32,
        max_messages: u32,
    ) -> Result<Vec<QueueMessage>, AzureStorageError>;

    async fn delete_message(
        &self,
        queue: &str,
        message_id: &str,
        pop_receipt: &str,
    ) -> Result<(), AzureStorageError>;
}

#[async_trait]
impl BlobStore for BlobClient {
    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobEntry>, AzureStorageError> {
        BlobClient::list_blobs(self, container).await
    }

    async fn acquire_lease(
        &self,
        container: &str,
        blob: &str,
        duration_secs: u32,
    ) -> Result<String, AzureStorageError> {
        BlobClient::acquire_lease(self, container, blob, duration_secs).await
    }

    async fn get_blob(&self, container: &str, blob: &str) -> Result<Bytes, AzureStorageError> {
        BlobClient::get_blob(self, container, blob).await
    }

    async fn delete_blob(
        &self,
        container: &str,
        blob: &str,
        lease_id: &str,
    ) -> Result<(), AzureStorageError> {
        BlobClient::delete_blob(self, container, blob, lease_id).await
    }
}

#[async_trait]
impl MessageQueue for QueueClient {
    async fn get_messages(
        &self,
        queue: &str,
        visibility_timeout_secs: u32,
        max_messages: u32,
    ) -> Result<Vec<QueueMessage>, AzureStorageError> {
        QueueClient::get_messages(self, queue, visibility_timeout_secs, max_messages).await
    }

    async fn delete_message(
        &self,
        queue: &str,
        message_id: &str,
        pop_receipt: &str,
    ) -> Result<(), AzureStorageError> {
        QueueClient::delete_message(self, queue, message_id, pop_receipt).await
    }
}

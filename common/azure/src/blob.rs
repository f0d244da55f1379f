//! Blob service operations: listing, leasing, download and delete.

use bytes::Bytes;
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use crate::auth::SharedKey;
use crate::error::AzureStorageError;
use crate::transport::StorageTransport;
use crate::StorageCredentials;

/// Lease status of a blob as reported by the listing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    Unlocked,
    Locked,
    /// The service reported no status, or one we do not recognize.
    Unknown,
}

impl LeaseStatus {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("unlocked") => LeaseStatus::Unlocked,
            Some("locked") => LeaseStatus::Locked,
            _ => LeaseStatus::Unknown,
        }
    }
}

/// One entry from a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub name: String,
    pub lease_status: LeaseStatus,
}

/// Blob-service client for a single storage account.
pub struct BlobClient {
    transport: StorageTransport,
}

impl BlobClient {
    pub fn new(credentials: &StorageCredentials) -> Result<Self, AzureStorageError> {
        let endpoint = format!("https://{}.blob.core.windows.net", credentials.account);
        Self::with_endpoint(credentials, &endpoint)
    }

    /// Build a client against a custom endpoint (Azurite, test servers).
    pub fn with_endpoint(
        credentials: &StorageCredentials,
        endpoint: &str,
    ) -> Result<Self, AzureStorageError> {
        let key = SharedKey::new(&credentials.account, &credentials.access_key)?;
        Ok(Self {
            transport: StorageTransport::new(endpoint, key)?,
        })
    }

    /// List all blobs in a container, following continuation markers.
    ///
    /// Entries come back in the order the service returns them; callers
    /// must not assume anything stronger than that.
    pub async fn list_blobs(&self, container: &str) -> Result<Vec<BlobEntry>, AzureStorageError> {
        let mut entries = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut query = vec![
                ("restype", "container".to_string()),
                ("comp", "list".to_string()),
            ];
            if let Some(m) = &marker {
                query.push(("marker", m.clone()));
            }
            let response = self
                .transport
                .send(Method::GET, container, &query, &[])
                .await?;
            let body = response.text().await?;
            let parsed: ListBlobsResponse = quick_xml::de::from_str(&body).map_err(|err| {
                AzureStorageError::InvalidResponse(format!("malformed blob listing: {err}"))
            })?;
            entries.extend(
                parsed
                    .blobs
                    .map(|blobs| blobs.entries)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|blob| BlobEntry {
                        name: blob.name,
                        lease_status: LeaseStatus::parse(blob.properties.lease_status.as_deref()),
                    }),
            );
            match parsed.next_marker.filter(|m| !m.is_empty()) {
                Some(m) => marker = Some(m),
                None => break,
            }
        }
        debug!(
            account = self.transport.account(),
            container,
            count = entries.len(),
            "listed container"
        );
        Ok(entries)
    }

    /// Acquire a time-bounded exclusive lease on a blob, returning the
    /// lease id. The service enforces the 15-60 second duration range.
    /// 409 maps to [`AzureStorageError::Conflict`] (held by another
    /// owner), 404 to [`AzureStorageError::NotFound`].
    pub async fn acquire_lease(
        &self,
        container: &str,
        blob: &str,
        duration_secs: u32,
    ) -> Result<String, AzureStorageError> {
        let path = format!("{container}/{blob}");
        let query = [("comp", "lease".to_string())];
        let headers = [
            ("x-ms-lease-action", "acquire".to_string()),
            ("x-ms-lease-duration", duration_secs.to_string()),
        ];
        let response = self
            .transport
            .send(Method::PUT, &path, &query, &headers)
            .await?;
        response
            .headers()
            .get("x-ms-lease-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| {
                AzureStorageError::InvalidResponse(
                    "lease response is missing the x-ms-lease-id header".to_string(),
                )
            })
    }

    /// Download the full contents of a blob.
    pub async fn get_blob(&self, container: &str, blob: &str) -> Result<Bytes, AzureStorageError> {
        let path = format!("{container}/{blob}");
        let response = self.transport.send(Method::GET, &path, &[], &[]).await?;
        Ok(response.bytes().await?)
    }

    /// Delete a blob, proving ownership with the lease id. The lease id
    /// is a required parameter: deleting without presenting the token
    /// would not prove ownership.
    pub async fn delete_blob(
        &self,
        container: &str,
        blob: &str,
        lease_id: &str,
    ) -> Result<(), AzureStorageError> {
        let path = format!("{container}/{blob}");
        let headers = [("x-ms-lease-id", lease_id.to_string())];
        self.transport
            .send(Method::DELETE, &path, &[], &headers)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBlobsResponse {
    blobs: Option<BlobList>,
    next_marker: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    entries: Vec<BlobXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobXml {
    name: String,
    #[serde(default)]
    properties: BlobPropertiesXml,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct BlobPropertiesXml {
    #[serde(default)]
    lease_status: Option<String>,
}

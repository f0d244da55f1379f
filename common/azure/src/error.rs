use thiserror::Error;

/// Classified errors for Azure Storage operations.
///
/// The storage service signals routine contention with HTTP status
/// codes: a 409 means another owner holds a lease on the resource, a
/// 404 means the resource is already gone. Callers are expected to
/// treat those two as expected outcomes and everything else as a
/// transient infrastructure failure.
#[derive(Error, Debug)]
pub enum AzureStorageError {
    #[error("the resource is held by another lease owner")]
    Conflict,
    #[error("the resource does not exist")]
    NotFound,
    #[error("storage service returned {status}: {body}")]
    Service { status: u16, body: String },
    #[error("request to storage service failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("could not interpret storage response: {0}")]
    InvalidResponse(String),
    #[error("invalid storage credentials: {0}")]
    Credentials(String),
}

impl AzureStorageError {
    /// Classify a non-success HTTP status into an error.
    pub(crate) fn from_status(status: http::StatusCode, body: String) -> Self {
        match status {
            http::StatusCode::CONFLICT => AzureStorageError::Conflict,
            http::StatusCode::NOT_FOUND => AzureStorageError::NotFound,
            _ => AzureStorageError::Service {
                status: status.as_u16(),
                body,
            },
        }
    }
}

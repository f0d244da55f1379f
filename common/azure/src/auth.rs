//! Shared Key request signing for the Azure Storage REST API.
//!
//! Azure authorizes requests with an HMAC-SHA256 signature over a
//! canonical rendering of the request: the verb, a fixed set of
//! standard headers, the sorted `x-ms-*` headers, and the resource
//! path with its sorted query parameters. The signing key is the
//! base64-decoded storage account key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Method;
use sha2::Sha256;

use crate::error::AzureStorageError;

/// Service version pinned on every request via `x-ms-version`.
pub(crate) const STORAGE_API_VERSION: &str = "2021-08-06";

pub(crate) struct SharedKey {
    account: String,
    key: Vec<u8>,
}

impl SharedKey {
    pub(crate) fn new(account: &str, access_key: &str) -> Result<Self, AzureStorageError> {
        let key = BASE64.decode(access_key).map_err(|err| {
            AzureStorageError::Credentials(format!("access key is not valid base64: {err}"))
        })?;
        Ok(Self {
            account: account.to_owned(),
            key,
        })
    }

    pub(crate) fn account(&self) -> &str {
        &self.account
    }

    /// Produce the value for the `Authorization` header.
    ///
    /// `path` is the decoded resource path below the account, without a
    /// leading slash; `query` holds the decoded query parameters.
    pub(crate) fn authorization(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        headers: &HeaderMap,
    ) -> String {
        let to_sign = string_to_sign(method.as_str(), &self.account, path, query, headers);
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.key).expect("hmac accepts keys of any length");
        mac.update(to_sign.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        format!("SharedKey {}:{}", self.account, signature)
    }
}

fn string_to_sign(
    verb: &str,
    account: &str,
    path: &str,
    query: &[(&str, String)],
    headers: &HeaderMap,
) -> String {
    // Zero content length must be rendered as the empty string for
    // service versions 2015-02-21 and later.
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .filter(|value| *value != "0")
        .unwrap_or("");
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    // Verb, Content-Encoding, Content-Language, Content-Length,
    // Content-MD5, Content-Type, Date, If-Modified-Since, If-Match,
    // If-None-Match, If-Unmodified-Since, Range. The Date slot stays
    // empty because the date is carried in x-ms-date.
    format!(
        "{verb}\n\n\n{content_length}\n\n{content_type}\n\n\n\n\n\n\n{headers}{resource}",
        headers = canonicalized_headers(headers),
        resource = canonicalized_resource(account, path, query),
    )
}

/// All `x-ms-*` headers, lowercased and sorted by name, one per line.
fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms_headers: Vec<(String, &str)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .filter_map(|(name, value)| Some((name.as_str().to_lowercase(), value.to_str().ok()?)))
        .collect();
    ms_headers.sort();
    ms_headers
        .into_iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect()
}

/// `/{account}/{path}` followed by the sorted, decoded query parameters.
fn canonicalized_resource(account: &str, path: &str, query: &[(&str, String)]) -> String {
    let mut resource = format!("/{account}/{path}");
    let mut params: Vec<(&str, &str)> = query
        .iter()
        .map(|(name, value)| (*name, value.as_str()))
        .collect();
    params.sort();
    for (name, value) in params {
        resource.push_str(&format!("\n{}:{}", name.to_lowercase(), value));
    }
    resource
}

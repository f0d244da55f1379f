use std::time::SystemTime;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use url::Url;

use crate::auth::{SharedKey, STORAGE_API_VERSION};
use crate::error::AzureStorageError;

/// Issues signed requests against one storage service endpoint.
pub(crate) struct StorageTransport {
    http: reqwest::Client,
    endpoint: Url,
    key: SharedKey,
}

impl StorageTransport {
    pub(crate) fn new(endpoint: &str, key: SharedKey) -> Result<Self, AzureStorageError> {
        let endpoint = Url::parse(endpoint).map_err(|err| {
            AzureStorageError::Credentials(format!("invalid storage endpoint {endpoint:?}: {err}"))
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            key,
        })
    }

    pub(crate) fn account(&self) -> &str {
        self.key.account()
    }

    /// Send one signed request. `path` is the decoded resource path below
    /// the account (no leading slash); blob names may contain slashes and
    /// are kept as path segments.
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        extra_headers: &[(&'static str, String)],
    ) -> Result<reqwest::Response, AzureStorageError> {
        let url = self.url(path, query)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-ms-date",
            header_value(&httpdate::fmt_http_date(SystemTime::now()))?,
        );
        headers.insert("x-ms-version", HeaderValue::from_static(STORAGE_API_VERSION));
        for (name, value) in extra_headers {
            headers.insert(HeaderName::from_static(name), header_value(value)?);
        }
        let authorization = self.key.authorization(&method, path, query, &headers);
        headers.insert(AUTHORIZATION, header_value(&authorization)?);

        let response = self
            .http
            .request(method, url)
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AzureStorageError::from_status(status, body))
        }
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, AzureStorageError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                AzureStorageError::Credentials(format!(
                    "storage endpoint {} cannot carry a path",
                    self.endpoint
                ))
            })?
            .extend(path.split('/'));
        for (name, value) in query {
            url.query_pairs_mut().append_pair(name, value);
        }
        Ok(url)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, AzureStorageError> {
    HeaderValue::from_str(value)
        .map_err(|err| AzureStorageError::InvalidResponse(format!("invalid header value: {err}")))
}

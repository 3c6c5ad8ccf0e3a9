//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest`, with exponential
//! backoff retries on transient failures and standardized JSON response
//! handling. Every client built here carries the configured connect timeout.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{SyncError, SyncResult};

/// Transport settings shared by every client.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Bound on establishing a connection; independent of any fan-in wait.
    pub connect_timeout: Duration,
    /// Retries on transient failures (connect errors, 5xx, 429).
    pub max_retries: u32,
    pub user_agent: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            max_retries: 3,
            user_agent: concat!("cfp_sync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// A standardized container for API responses.
///
/// Wraps the deserialized data along with metadata about the HTTP transaction.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The deserialized response body, if the call succeeded.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
}

/// Builds the retrying transport shared by all [`ApiClient`]s.
pub fn build_client(options: &HttpOptions) -> SyncResult<ClientWithMiddleware> {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(options.max_retries);
    let client = reqwest::Client::builder()
        .connect_timeout(options.connect_timeout)
        .user_agent(options.user_agent.clone())
        .build()?;
    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

/// A flexible asynchronous HTTP client bound to one base URL.
#[derive(Clone)]
pub struct ApiClient {
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
}

impl ApiClient {
    /// Creates a client reusing an existing transport (and its connection pool).
    pub fn with_client(inner: ClientWithMiddleware, base_url: &str) -> SyncResult<Self> {
        Ok(Self {
            inner,
            base_url: parse_base_url(base_url)?,
        })
    }

    /// Performs a generic HTTP request and handles the response.
    ///
    /// `path` is joined to the base URL; an absolute URL replaces it.
    /// Non-2xx statuses are returned as `success: false`, not as errors.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> SyncResult<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let full_url = self.base_url.join(path)?;
        let mut req = self.inner.request(method, full_url);

        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
            })
        }
    }

    /// GETs `path` and deserializes the body; any failure is a [`SyncError::RemoteFailure`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let response = self
            .request::<T, ()>(Method::GET, path, None)
            .await
            .map_err(|e| SyncError::remote(path, e))?;
        match response.data {
            Some(data) if response.success => Ok(data),
            _ => Err(SyncError::remote(
                path,
                format!(
                    "status {}{}",
                    response.status,
                    response
                        .error_body
                        .map(|body| format!(": {}", truncate(&body, 200)))
                        .unwrap_or_default()
                ),
            )),
        }
    }
}

// A base without a trailing slash would have its last segment replaced on join.
fn parse_base_url(base_url: &str) -> SyncResult<Url> {
    let trimmed = base_url.trim();
    if trimmed.ends_with('/') {
        Ok(Url::parse(trimmed)?)
    } else {
        Ok(Url::parse(&format!("{trimmed}/"))?)
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

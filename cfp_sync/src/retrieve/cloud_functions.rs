//! # Cloud Functions
//!
//! Named remote procedures keyed by `(conference endpoint, user key)`: account
//! verification, vote casting and the favorite/scheduled add and remove calls.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::Method;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::ky_http::ApiClient;
use crate::error::{SyncError, SyncResult};

pub const VERIFY_ACCOUNT: &str = "verifyAccount";
pub const VOTE_TALK: &str = "voteTalk";

#[async_trait]
pub trait CloudFunctions: Send + Sync {
    /// Calls `function` and returns its JSON result.
    async fn call(&self, function: &str, endpoint: &str, user_key: &str, args: Vec<Value>) -> SyncResult<Value>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallBody<'a> {
    cfp_endpoint: &'a str,
    user_key: &'a str,
    args: Vec<Value>,
}

/// POSTs `{cfpEndpoint, userKey, args}` to `<base>/<function>`.
#[derive(Clone)]
pub struct HttpCloudFunctions {
    client: ApiClient,
}

impl HttpCloudFunctions {
    pub fn new(transport: ClientWithMiddleware, base_url: &str) -> SyncResult<Self> {
        Ok(Self {
            client: ApiClient::with_client(transport, base_url)?,
        })
    }
}

#[async_trait]
impl CloudFunctions for HttpCloudFunctions {
    async fn call(&self, function: &str, endpoint: &str, user_key: &str, args: Vec<Value>) -> SyncResult<Value> {
        let failure = |reason: String| SyncError::RemoteFunctionFailure {
            function: function.to_string(),
            reason,
        };
        let body = CallBody {
            cfp_endpoint: endpoint,
            user_key,
            args,
        };
        let response = self
            .client
            .request::<Value, _>(Method::POST, function, Some(body))
            .await
            .map_err(|e| failure(e.to_string()))?;
        match response.data {
            Some(value) if response.success => {
                debug!(function, status = response.status, "cloud function returned");
                Ok(value)
            }
            _ => Err(failure(format!(
                "status {}: {}",
                response.status,
                response.error_body.unwrap_or_default()
            ))),
        }
    }
}

/// One recorded [`CloudFunctions::call`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub function: String,
    pub endpoint: String,
    pub user_key: String,
    pub args: Vec<Value>,
}

/// Records every call and answers from a queue of scripted results
/// (`Value::Null` once the queue is empty). Used by demos and tests.
#[derive(Default)]
pub struct RecordingCloudFunctions {
    calls: Mutex<Vec<RecordedCall>>,
    replies: Mutex<VecDeque<SyncResult<Value>>>,
}

impl RecordingCloudFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: SyncResult<Value>) {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner).push_back(reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn calls_to(&self, function: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.function == function)
            .collect()
    }
}

#[async_trait]
impl CloudFunctions for RecordingCloudFunctions {
    async fn call(&self, function: &str, endpoint: &str, user_key: &str, args: Vec<Value>) -> SyncResult<Value> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                function: function.to_string(),
                endpoint: endpoint.to_string(),
                user_key: user_key.to_string(),
                args,
            });
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Ok(Value::Null))
    }
}

//! # Common Backend Utilities
//!
//! Shared HTTP plumbing used by every backend: client construction with a
//! bounded timeout, JSON decoding that keeps decode failures distinct from
//! transport failures, and per-call metrics.

use super::BackendError;
use crate::observability::metrics;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// Create an HTTP client whose requests all time out after `timeout`
pub(crate) fn http_client(timeout: Duration) -> Result<Client, BackendError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(BackendError::HttpClient)
}

/// Read a response body and decode it as JSON
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    context: &str,
) -> Result<T, BackendError> {
    let target = response.url().to_string();
    let body = response
        .bytes()
        .await
        .map_err(|source| BackendError::Request { target, source })?;
    serde_json::from_slice(&body).map_err(|source| BackendError::Decode {
        context: context.to_string(),
        source,
    })
}

/// Send a request, mapping transport failures to [`BackendError::Request`]
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    target: &str,
) -> Result<Response, BackendError> {
    request.send().await.map_err(|source| BackendError::Request {
        target: target.to_string(),
        source,
    })
}

/// Run one backend operation and record its outcome
///
/// Every backend call goes through here so request counts, error counts and
/// durations are labelled the same way for all stores.
pub(crate) async fn observe<T, F>(
    backend: &'static str,
    operation: &'static str,
    call: F,
) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    let start = Instant::now();
    let result = call.await;
    metrics::record_backend_request(backend, operation, start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        metrics::increment_backend_errors(backend, operation);
        debug!(backend, operation, error = %e, "Backend call failed");
    }
    result
}

//! HTTP transport shared by every wire codec
//!
//! Serializes a request once, POSTs it through the retry executor and
//! decodes the JSON reply. Bodies are read chunk by chunk and capped at
//! [`MAX_RESPONSE_SIZE`].

use std::time::Duration;

use agent_core::error::{AgentError, Result};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::retry::{RetryError, RetryableError, with_retry};

/// Largest response body accepted from a provider (10 MB)
pub const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Extracts a readable message from a provider error body
pub type ApiErrorFn<'a> = &'a (dyn Fn(&[u8]) -> Option<String> + Send + Sync);

/// Retrying JSON-over-HTTP client
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    max_attempts: u32,
}

impl HttpTransport {
    /// Build a client bounded by `timeout` per request
    pub fn new(timeout: Duration, max_attempts: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            client,
            max_attempts,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// POST `body` as JSON to `url` and decode the reply as `R`.
    ///
    /// Non-2xx replies are tagged with their status so the retry executor
    /// can decide whether to try again.
    pub async fn post_json<B, R>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        headers: &HeaderMap,
        body: &B,
        api_error: ApiErrorFn<'_>,
    ) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(|e| AgentError::completion("marshal", e))?;
        let payload = payload.as_slice();

        tracing::debug!(url, bytes = payload.len(), "sending completion request");

        let body = with_retry(cancel, self.max_attempts, move || {
            self.send_once(cancel, url, headers, payload, api_error)
        })
        .await?;

        serde_json::from_slice(&body).map_err(|e| AgentError::completion("unmarshal", e))
    }

    async fn send_once(
        &self,
        cancel: &CancellationToken,
        url: &str,
        headers: &HeaderMap,
        payload: &[u8],
        api_error: ApiErrorFn<'_>,
    ) -> std::result::Result<Vec<u8>, RetryError> {
        let request = self
            .client
            .post(url)
            .headers(headers.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(payload.to_vec());

        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AgentError::Cancelled.into()),
            sent = request.send() => sent,
        };
        let response = sent.map_err(|e| AgentError::completion("request", e))?;

        let status = response.status();
        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AgentError::Cancelled.into()),
            body = read_capped(response) => body?,
        };

        if !status.is_success() {
            let detail = api_error(&body)
                .unwrap_or_else(|| String::from_utf8_lossy(&body).trim().to_string());
            tracing::debug!(status = status.as_u16(), %detail, "provider returned an error");
            let err = AgentError::completion("status", format!("unexpected status {status}: {detail}"));
            return Err(RetryableError::new(status.as_u16(), err).into());
        }

        Ok(body)
    }
}

/// Read the full body, failing once it grows past [`MAX_RESPONSE_SIZE`]
async fn read_capped(mut response: reqwest::Response) -> Result<Vec<u8>> {
    if response
        .content_length()
        .is_some_and(|len| len > MAX_RESPONSE_SIZE as u64)
    {
        return Err(AgentError::ResponseTooLarge(MAX_RESPONSE_SIZE));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| AgentError::completion("read", e))?
    {
        if body.len() + chunk.len() > MAX_RESPONSE_SIZE {
            return Err(AgentError::ResponseTooLarge(MAX_RESPONSE_SIZE));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

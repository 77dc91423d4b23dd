//! HTTP transport.
//!
//! A single pooled `reqwest::Client` shared by every operation of a
//! [`crate::Client`].  Requests arrive fully signed; this layer only sends
//! them, retries idempotent ones once after a connection failure or
//! timeout, and aborts them when the caller's token is cancelled.

use std::time::Duration;

use reqwest::{Method, Request, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::errors::{ClientError, Result};
use crate::metrics;

#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
}

enum AttemptError {
    Cancelled,
    Failed(reqwest::Error),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Cancelled => false,
            AttemptError::Failed(err) => err.is_connect() || err.is_timeout(),
        }
    }
}

impl From<AttemptError> for ClientError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::Cancelled => ClientError::Cancelled,
            AttemptError::Failed(err) => err.into(),
        }
    }
}

impl Transport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Send a signed request.
    ///
    /// GET, HEAD and DELETE are retried once, byte-identical, when the first
    /// attempt fails to connect or times out.  Anything else surfaces the
    /// first failure.  Non-2xx responses are returned as-is.
    pub async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        let method = request.method().clone();
        let path = request.url().path().to_string();
        let retry = if is_idempotent(&method) {
            request.try_clone()
        } else {
            None
        };

        let result = match (self.attempt(request, cancel).await, retry) {
            (Err(err), Some(retry)) if err.is_retryable() => {
                warn!(
                    "Retrying {} {} after transport failure: {}",
                    method,
                    path,
                    ClientError::from(err)
                );
                metrics::record_retry(method.as_str());
                self.attempt(retry, cancel).await
            }
            (result, _) => result,
        };

        match result {
            Ok(response) => {
                debug!("{} {} -> {}", method, path, response.status().as_u16());
                Ok(response)
            }
            Err(err) => {
                let err = ClientError::from(err);
                debug!("{} {} failed: {}", method, path, err);
                Err(err)
            }
        }
    }

    async fn attempt(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> std::result::Result<Response, AttemptError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AttemptError::Cancelled),
            result = self.http.execute(request) => result.map_err(AttemptError::Failed),
        }
    }

    /// Start building a request on the pooled client.
    pub(crate) fn request(&self, method: Method, url: reqwest::Url) -> reqwest::RequestBuilder {
        self.http.request(method, url)
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::DELETE)
}

// -- Tests -------------------------------------------------------------------

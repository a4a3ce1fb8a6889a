//! HTTP connection to the metadata service.
//!
//! A [`Connection`] owns the base URL, the authentication headers and the
//! retry policy. It sends JSON-encoded messages to service endpoints and raw
//! requests to presigned URLs, and turns responses into typed values or
//! [`ArtifactError`]s.

use crate::config::ClientConfig;
use mlforge_abstraction::{ArtifactError, ArtifactResult};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, warn};

const GRPC_PREFIX: &str = "Grpc-Metadata-";

/// Value sent in the `Grpc-Metadata-source` header.
const CLIENT_SOURCE: &str = "RustClient";

/// Retry policy for requests that fail with a transient status or connection error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Retry `n` waits `backoff_factor * 2^(n-1)`.
    pub backoff_factor: Duration,
    /// Status codes that trigger a retry.
    pub status_forcelist: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_factor: Duration::from_secs(1),
            status_forcelist: vec![502, 503, 504],
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_factor.saturating_mul(1 << exponent)
    }

    /// Whether a response with this status should be retried.
    #[must_use]
    pub fn should_retry_status(&self, status: StatusCode) -> bool {
        self.status_forcelist.contains(&status.as_u16())
    }
}

/// Error body returned by the service on failure.
#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    code: Option<i64>,
}

/// HTTP connection configuration and request helpers.
#[derive(Debug, Clone)]
pub struct Connection {
    /// `scheme://host[:port]`, without trailing slash.
    base_url: String,
    /// Headers attached to every service request.
    auth_headers: BTreeMap<String, String>,
    retry: RetryPolicy,
    /// HTTP client for making requests.
    client: Client,
}

impl Connection {
    /// Creates a connection to the service at `base_url` with the default retry
    /// policy and no credentials.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut auth_headers = BTreeMap::new();
        auth_headers.insert(format!("{GRPC_PREFIX}source"), CLIENT_SOURCE.to_string());

        Self { base_url, auth_headers, retry: RetryPolicy::default(), client: Client::new() }
    }

    /// Builds a connection from a validated client configuration.
    ///
    /// # Errors
    /// Returns `ArtifactError::Config` if the configuration is incomplete or the
    /// HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> ArtifactResult<Self> {
        config.validate()?;
        let base_url = config.base_url()?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ArtifactError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let mut conn = Self::new(base_url).with_client(client).with_retry_policy(config.retry_policy());
        if let (Some(email), Some(dev_key)) = (&config.email, &config.dev_key) {
            conn = conn.with_auth(email.clone(), dev_key.clone());
        }
        Ok(conn)
    }

    /// Sets the credentials sent with every service request.
    #[must_use]
    pub fn with_auth(mut self, email: impl Into<String>, dev_key: impl Into<String>) -> Self {
        self.auth_headers.insert(format!("{GRPC_PREFIX}email"), email.into());
        self.auth_headers.insert(format!("{GRPC_PREFIX}developer_key"), dev_key.into());
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The email this connection authenticates as, if any.
    pub fn email(&self) -> Option<&str> {
        self.auth_headers.get(&format!("{GRPC_PREFIX}email")).map(String::as_str)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The underlying HTTP client, for building raw requests to presigned URLs.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Sends a message to a service endpoint.
    ///
    /// GET requests carry `body` as query parameters, every other method as a
    /// JSON body. Authentication headers are attached.
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - Endpoint path, appended to the base URL
    /// * `body` - Optional message to send
    ///
    /// # Errors
    /// Returns `ArtifactError::Transport` if no response could be obtained.
    /// Non-success statuses are returned as responses, not errors.
    pub async fn make_proto_request<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ArtifactResult<Response>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Sending service request");

        let mut request = self.client.request(method.clone(), &url);
        for (name, value) in &self.auth_headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = if method == Method::GET { request.query(body) } else { request.json(body) };
        }

        self.send(request).await
    }

    /// Sends a request, retrying on connection errors and on statuses in the
    /// retry policy's force list.
    ///
    /// Once retries are exhausted the last response is returned as-is. Requests
    /// whose body cannot be replayed (streamed bodies) are sent exactly once.
    ///
    /// # Errors
    /// Returns `ArtifactError::Transport` if no response could be obtained.
    pub async fn send(&self, request: RequestBuilder) -> ArtifactResult<Response> {
        if request.try_clone().is_none() {
            debug!("Request body is streamed, sending without retries");
            return request.send().await.map_err(|e| transport_error(&e));
        }

        let mut retries = 0;
        loop {
            let Some(attempt) = request.try_clone() else {
                return request.send().await.map_err(|e| transport_error(&e));
            };

            match attempt.send().await {
                Ok(response)
                    if retries < self.retry.max_retries
                        && self.retry.should_retry_status(response.status()) =>
                {
                    retries += 1;
                    let delay = self.retry.backoff(retries);
                    warn!(
                        status = %response.status(),
                        retry = retries,
                        delay = ?delay,
                        "Transient response status, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Ok(response),
                Err(e) if retries < self.retry.max_retries && (e.is_connect() || e.is_timeout()) => {
                    retries += 1;
                    let delay = self.retry.backoff(retries);
                    warn!(error = %e, retry = retries, delay = ?delay, "Connection error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(error = %e, "Request failed");
                    return Err(transport_error(&e));
                }
            }
        }
    }

    /// Requires a success status and decodes the JSON body as `T`.
    ///
    /// # Errors
    /// Returns `ArtifactError::Negotiation` for non-success statuses and
    /// `ArtifactError::Serialization` if the body does not decode.
    pub async fn must_proto_response<T>(response: Response, operation: &str) -> ArtifactResult<T>
    where
        T: DeserializeOwned,
    {
        let response = Self::must_response(response, operation).await?;
        let body = response.bytes().await.map_err(|e| transport_error(&e))?;

        serde_json::from_slice(&body).map_err(|e| {
            error!(operation = %operation, error = %e, "Failed to parse service response");
            ArtifactError::Serialization(format!("Failed to parse {} response: {}", operation, e))
        })
    }

    /// Like [`Connection::must_proto_response`], but "not found" and
    /// "permission denied" answers from the service yield `None`.
    ///
    /// The service signals these with status 404 and error code 5, or status
    /// 403 and error code 7.
    ///
    /// # Errors
    /// Returns `ArtifactError::Negotiation` for any other non-success status.
    pub async fn maybe_proto_response<T>(response: Response, operation: &str) -> ArtifactResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        if status.is_success() {
            return Self::must_proto_response(response, operation).await.map(Some);
        }

        let text = response.text().await.unwrap_or_default();
        let code = serde_json::from_str::<ServiceErrorBody>(&text).ok().and_then(|body| body.code);
        match (status.as_u16(), code) {
            (404, Some(5)) | (403, Some(7)) => {
                debug!(operation = %operation, status = %status, "Entity not found or not visible");
                Ok(None)
            }
            _ => Err(ArtifactError::Negotiation {
                operation: operation.to_string(),
                status: status.as_u16(),
                message: text,
            }),
        }
    }

    /// Requires a success status.
    ///
    /// # Errors
    /// Returns `ArtifactError::Negotiation` carrying the status and body otherwise.
    pub async fn must_response(response: Response, operation: &str) -> ArtifactResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        error!(
            operation = %operation,
            status = %status,
            error = %error_text,
            "Service returned error status"
        );
        Err(ArtifactError::Negotiation {
            operation: operation.to_string(),
            status: status.as_u16(),
            message: error_text,
        })
    }
}

pub(crate) fn transport_error(err: &reqwest::Error) -> ArtifactError {
    let operation = err
        .url()
        .map_or_else(|| "HTTP request".to_string(), |url| format!("request to {}", url.path()));
    ArtifactError::Transport { operation, message: err.to_string() }
}

//! Raw HTTP response boundary shared by the provider clients.

use std::time::Duration;

use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::CostProviderError;

/// User agent sent on every upstream request.
pub const USER_AGENT: &str = concat!("finops-crawler/", env!("CARGO_PKG_VERSION"));

/// Default timeout for one upstream request, body included.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// A response reduced to what the engine and providers inspect.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    /// Server-suggested delay from `Retry-After` (seconds form only).
    pub retry_after: Option<Duration>,
    /// `Location` header, used as a polling URL.
    pub location: Option<String>,
    pub body: String,
}

impl RawResponse {
    /// Read the status, headers and full body of a response.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::Http`] if the body cannot be read.
    pub async fn read(response: Response) -> Result<Self, CostProviderError> {
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response.text().await?;

        Ok(Self {
            status,
            retry_after,
            location,
            body,
        })
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::Serialization`] on malformed JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CostProviderError> {
        serde_json::from_str(&self.body).map_err(CostProviderError::Serialization)
    }
}

/// Build the shared HTTP client with [`DEFAULT_TIMEOUT_SECS`].
///
/// # Errors
///
/// Returns [`CostProviderError::Http`] if the TLS backend fails to initialize.
pub fn build_client() -> Result<Client, CostProviderError> {
    build_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Build an HTTP client whose requests fail after `timeout`.
///
/// # Errors
///
/// Returns [`CostProviderError::Http`] if the TLS backend fails to initialize.
pub fn build_client_with_timeout(timeout: Duration) -> Result<Client, CostProviderError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(CostProviderError::Http)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Join a base URL and a path without doubling the slash.
#[must_use]
pub fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

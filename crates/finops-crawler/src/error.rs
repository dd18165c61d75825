//! Error taxonomy shared by providers and the retrieval engine.

use thiserror::Error;

use crate::range::{DateRange, Scope};
use crate::RetrievalStrategy;

/// Errors that can occur while retrieving cost data.
///
/// The engine never converts one variant into another. Only
/// [`CostProviderError::RateLimited`] is handled internally; every other
/// variant reaches the caller unchanged.
#[derive(Error, Debug)]
pub enum CostProviderError {
    /// HTTP transport failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Credential exchange was rejected upstream.
    #[error("Authentication error: {status} - {message}")]
    Authentication { status: u16, message: String },

    /// One or more credential fields are absent.
    #[error("Missing credentials for {platform}: {}", missing.join(", "))]
    MissingCredential {
        platform: String,
        missing: Vec<String>,
    },

    /// No credential definition exists for the platform.
    #[error("No credential configuration for platform '{0}'")]
    UnknownPlatform(String),

    /// Start date is after end date.
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// A date string is not `YYYY-MM-DD`.
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Scope listing succeeded but returned nothing.
    #[error("{provider} reported no scopes")]
    EmptyScope { provider: &'static str },

    /// The provider does not declare the requested capability.
    #[error("{provider} does not support {capability}")]
    UnsupportedCapability {
        provider: &'static str,
        capability: &'static str,
    },

    /// Every page or blob was exhausted without producing a row.
    #[error("No cost data for scope {scope} between {range}")]
    NoData { scope: Scope, range: DateRange },

    /// Upstream response had an unexpected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The report reached a terminal status other than completed.
    #[error("Report failed with status '{status}'")]
    ReportFailed { status: String },

    /// A report artifact could not be downloaded.
    #[error("Artifact download failed for {link}: {status} - {message}")]
    ArtifactFetch {
        link: String,
        status: u16,
        message: String,
    },

    /// The scope's access tier does not allow the report API.
    #[error("Scope {scope} does not support cost reports: {status} - {message}")]
    UnsupportedScope {
        scope: Scope,
        status: u16,
        message: String,
    },

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Upstream asked the caller to slow down. Absorbed by the rate-limit guard.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The configured rate-limit retry ceiling was reached.
    #[error("Still rate limited after {attempts} retries")]
    RateLimitExhausted { attempts: u32 },

    /// A backoff was interrupted by the cancellation token.
    #[error("Retrieval cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CostProviderError {
    /// Whether the error is the internal rate-limit signal.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Failure of one scope's retrieval, carrying where it happened.
#[derive(Error, Debug)]
#[error("{strategy} retrieval for scope {scope} ({range}) failed: {source}")]
pub struct ScopeError {
    pub scope: Scope,
    pub range: DateRange,
    pub strategy: RetrievalStrategy,
    #[source]
    pub source: CostProviderError,
}

impl ScopeError {
    /// The underlying error kind, unchanged.
    #[must_use]
    pub const fn kind(&self) -> &CostProviderError {
        &self.source
    }
}

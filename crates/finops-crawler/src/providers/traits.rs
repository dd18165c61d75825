//! Cost provider trait and common types.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::normalize::RawRows;
use crate::range::{DateRange, Scope};
use crate::CostProviderError;

// ============================================================================
// Capabilities
// ============================================================================

/// Which retrieval features a provider offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CapabilitySet {
    /// Provider can enumerate scopes.
    pub scopes: bool,
    /// Provider answers paginated cost queries.
    pub pages: bool,
    /// Provider supports the submit/poll/download report workflow.
    pub reports: bool,
}

impl CapabilitySet {
    #[must_use]
    pub const fn new(scopes: bool, pages: bool, reports: bool) -> Self {
        Self {
            scopes,
            pages,
            reports,
        }
    }

    #[must_use]
    pub const fn supports(self, strategy: RetrievalStrategy) -> bool {
        match strategy {
            RetrievalStrategy::Paginated => self.pages,
            RetrievalStrategy::Report => self.reports,
        }
    }
}

/// How the rows of one scope are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    /// Synchronous query, following page cursors.
    Paginated,
    /// Submit a report job, poll it, download its blobs.
    Report,
}

impl RetrievalStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paginated => "paginated",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Pages
// ============================================================================

/// Continuation handle for the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Opaque token sent back in the next request.
    Token(String),
    /// Absolute URL of the next page.
    Url(String),
}

/// One page of rows plus the cursor to the next one.
#[derive(Debug, Clone)]
pub struct CostPage {
    pub rows: RawRows,
    /// `None` means the provider has no further pages.
    pub next: Option<PageCursor>,
}

// ============================================================================
// Reports
// ============================================================================

/// Completed report: blob count plus links in download order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReportManifest {
    pub blob_count: usize,
    pub blobs: Vec<String>,
}

/// Report status as seen by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStatus {
    /// Accepted but not ready.
    Accepted,
    /// Ready, with its manifest.
    Completed(ReportManifest),
    /// Any other terminal status, verbatim.
    Other(String),
}

/// Response to a report submission or poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportResponse {
    pub status: ReportStatus,
    /// Server-suggested delay before polling again.
    pub retry_after: Option<Duration>,
    /// URL to poll for the report status.
    pub location: Option<String>,
}

// ============================================================================
// Provider trait
// ============================================================================

/// Trait for billing API providers.
///
/// The engine branches only on [`CostProvider::capabilities`]. Methods for
/// capabilities a provider does not declare keep their default bodies,
/// which fail with [`CostProviderError::UnsupportedCapability`].
#[async_trait]
pub trait CostProvider: Send + Sync {
    /// Get the provider name (e.g., "aws", "azure", "openai").
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> CapabilitySet;

    /// Exchange long-lived credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::Authentication`] if the upstream rejects
    /// the credentials.
    async fn authenticate(&self) -> Result<(), CostProviderError>;

    /// List scopes in upstream order.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::EmptyScope`] when upstream reports none.
    async fn list_scopes(&self) -> Result<Vec<Scope>, CostProviderError> {
        Err(self.unsupported("scopes"))
    }

    /// Fetch one page of cost rows.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::RateLimited`] when throttled, or any
    /// upstream error.
    async fn fetch_cost_page(
        &self,
        scope: &Scope,
        range: &DateRange,
        cursor: Option<&PageCursor>,
    ) -> Result<CostPage, CostProviderError> {
        let _ = (scope, range, cursor);
        Err(self.unsupported("pages"))
    }

    /// Submit a cost report job.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::UnsupportedScope`] when the scope cannot
    /// produce reports.
    async fn submit_report(
        &self,
        scope: &Scope,
        range: &DateRange,
    ) -> Result<ReportResponse, CostProviderError> {
        let _ = (scope, range);
        Err(self.unsupported("reports"))
    }

    /// Poll a submitted report.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll request fails.
    async fn poll_report(&self, location: &str) -> Result<ReportResponse, CostProviderError> {
        let _ = location;
        Err(self.unsupported("reports"))
    }

    /// Download one report blob as delimited text.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::ArtifactFetch`] if the blob is unavailable.
    async fn download_artifact(&self, link: &str) -> Result<String, CostProviderError> {
        let _ = link;
        Err(self.unsupported("reports"))
    }

    #[doc(hidden)]
    fn unsupported(&self, capability: &'static str) -> CostProviderError {
        CostProviderError::UnsupportedCapability {
            provider: self.name(),
            capability,
        }
    }
}

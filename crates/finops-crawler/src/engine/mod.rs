//! Retrieval orchestration.
//!
//! [`CostRetriever`] authenticates a provider once, resolves its scopes and
//! runs either the paginated or the report path for each of them. Both paths
//! share one [`RateLimitGuard`] and one cancellation token.

pub mod paginate;
pub mod pause;
pub mod rate_limit;
pub mod report;

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::normalize::CostRecord;
use crate::providers::{CostProvider, RetrievalStrategy};
use crate::range::{DateRange, Scope};
use crate::{CostProviderError, ScopeError};

pub use pause::{Pause, Sleeper, TokioSleeper};
pub use rate_limit::{RateLimitGuard, DEFAULT_RATE_LIMIT_DELAY};
pub use report::{PollState, ReportPoller, DEFAULT_POLL_DELAY};

// ============================================================================
// Results
// ============================================================================

/// Ordered rows for one (scope, range, strategy).
#[derive(Debug, Clone, Serialize)]
pub struct ResultSet {
    pub scope: Scope,
    pub range: DateRange,
    pub strategy: RetrievalStrategy,
    pub records: Vec<CostRecord>,
}

impl ResultSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Per-scope outcomes of a session, in scope order.
#[derive(Debug)]
pub struct RetrievalReport {
    pub provider: &'static str,
    pub outcomes: Vec<Result<ResultSet, ScopeError>>,
}

impl RetrievalReport {
    pub fn successes(&self) -> impl Iterator<Item = &ResultSet> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScopeError> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(Result::is_ok)
    }
}

// ============================================================================
// Retriever
// ============================================================================

/// Drives one provider through a retrieval session.
pub struct CostRetriever {
    provider: Arc<dyn CostProvider>,
    config: EngineConfig,
    pause: Pause,
    authenticated: OnceCell<()>,
}

impl CostRetriever {
    /// Create a retriever using the tokio timer and a fresh cancellation token.
    #[must_use]
    pub fn new(provider: Arc<dyn CostProvider>, config: EngineConfig) -> Self {
        Self::with_pause(provider, config, Pause::default())
    }

    /// Create a retriever with an explicit sleeper and cancellation token.
    #[must_use]
    pub fn with_pause(provider: Arc<dyn CostProvider>, config: EngineConfig, pause: Pause) -> Self {
        Self {
            provider,
            config,
            pause,
            authenticated: OnceCell::new(),
        }
    }

    /// Token that aborts any in-flight backoff when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.pause.token().clone()
    }

    #[must_use]
    pub fn provider(&self) -> &dyn CostProvider {
        self.provider.as_ref()
    }

    fn guard(&self) -> RateLimitGuard {
        RateLimitGuard::new(
            self.config.rate_limit_delay,
            self.config.max_rate_limit_retries,
            self.pause.clone(),
        )
    }

    /// Authenticate the provider, at most once per retriever.
    ///
    /// # Errors
    ///
    /// Returns the provider's authentication error. A failed attempt is not
    /// cached, so a later call tries again.
    pub async fn authenticate(&self) -> Result<(), CostProviderError> {
        self.authenticated
            .get_or_try_init(|| async {
                info!(provider = self.provider.name(), "Authenticating");
                self.provider.authenticate().await
            })
            .await?;
        Ok(())
    }

    /// Scopes to retrieve, in provider order.
    ///
    /// Providers without the scope capability get one implicit scope and are
    /// never asked to list.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::EmptyScope`] if the provider lists none,
    /// or [`CostProviderError::RateLimitExhausted`] if listing stays throttled.
    pub async fn scopes(&self) -> Result<Vec<Scope>, CostProviderError> {
        self.authenticate().await?;
        if !self.provider.capabilities().scopes {
            return Ok(vec![Scope::implicit()]);
        }

        let scopes = self.guard().run(|| self.provider.list_scopes()).await?;
        if scopes.is_empty() {
            return Err(CostProviderError::EmptyScope {
                provider: self.provider.name(),
            });
        }
        Ok(scopes)
    }

    /// Retrieve one scope with the given strategy.
    ///
    /// # Errors
    ///
    /// Returns a [`ScopeError`] wrapping the unchanged provider or engine error.
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn retrieve_scope(
        &self,
        scope: &Scope,
        range: &DateRange,
        strategy: RetrievalStrategy,
    ) -> Result<ResultSet, ScopeError> {
        let wrap = |source| ScopeError {
            scope: scope.clone(),
            range: *range,
            strategy,
            source,
        };

        if !self.provider.capabilities().supports(strategy) {
            return Err(wrap(CostProviderError::UnsupportedCapability {
                provider: self.provider.name(),
                capability: match strategy {
                    RetrievalStrategy::Paginated => "pages",
                    RetrievalStrategy::Report => "reports",
                },
            }));
        }
        self.authenticate().await.map_err(wrap)?;

        let guard = self.guard();
        let records = match strategy {
            RetrievalStrategy::Paginated => {
                paginate::fetch_all_pages(self.provider.as_ref(), &guard, scope, range).await
            }
            RetrievalStrategy::Report => {
                ReportPoller::new(guard, self.pause.clone(), self.config.default_poll_delay)
                    .run(self.provider.as_ref(), scope, range)
                    .await
            }
        }
        .map_err(wrap)?;

        info!(scope = %scope, rows = records.len(), "Scope retrieved");
        Ok(ResultSet {
            scope: scope.clone(),
            range: *range,
            strategy,
            records,
        })
    }

    /// Retrieve every scope, continuing past per-scope failures.
    ///
    /// Up to `concurrency` scopes run at once; outcomes keep scope order.
    ///
    /// # Errors
    ///
    /// Fails only when authentication or scope discovery fails.
    pub async fn retrieve_all(
        &self,
        range: &DateRange,
        strategy: RetrievalStrategy,
    ) -> Result<RetrievalReport, CostProviderError> {
        let scopes = self.scopes().await?;
        info!(
            provider = self.provider.name(),
            scopes = scopes.len(),
            strategy = %strategy,
            "Retrieving costs"
        );

        let outcomes: Vec<_> = stream::iter(scopes.iter())
            .map(|scope| self.retrieve_scope(scope, range, strategy))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        for failure in outcomes.iter().filter_map(|o| o.as_ref().err()) {
            warn!(error = %failure, "Scope retrieval failed");
        }

        Ok(RetrievalReport {
            provider: self.provider.name(),
            outcomes,
        })
    }
}

impl std::fmt::Debug for CostRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostRetriever")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

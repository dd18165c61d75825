//! Submit/poll/download workflow for asynchronous cost reports.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::pause::Pause;
use super::rate_limit::RateLimitGuard;
use crate::normalize::{from_delimited, CostRecord};
use crate::providers::{CostProvider, ReportManifest, ReportResponse, ReportStatus};
use crate::range::{DateRange, Scope};
use crate::CostProviderError;

/// Poll delay used when the server does not suggest one.
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(5);

/// Where one report request stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling {
        retry_after: Option<Duration>,
        location: String,
    },
    Completed(ReportManifest),
    Failed(String),
}

impl PollState {
    /// Next state after a submission or poll response.
    ///
    /// A response without a `Location` keeps the previous polling URL when
    /// there is one.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::Protocol`] if an accepted report has no
    /// polling URL at all.
    pub fn advance(self, response: ReportResponse) -> Result<Self, CostProviderError> {
        match response.status {
            ReportStatus::Completed(manifest) => Ok(Self::Completed(manifest)),
            ReportStatus::Other(status) => Ok(Self::Failed(status)),
            ReportStatus::Accepted => {
                let previous = match self {
                    Self::Polling { location, .. } => Some(location),
                    _ => None,
                };
                let location = response.location.or(previous).ok_or_else(|| {
                    CostProviderError::Protocol(
                        "report accepted without a Location header".to_string(),
                    )
                })?;
                Ok(Self::Polling {
                    retry_after: response.retry_after,
                    location,
                })
            }
        }
    }
}

/// Drives one report from submission to downloaded rows.
#[derive(Debug, Clone)]
pub struct ReportPoller {
    guard: RateLimitGuard,
    pause: Pause,
    default_delay: Duration,
}

impl ReportPoller {
    #[must_use]
    pub fn new(guard: RateLimitGuard, pause: Pause, default_delay: Duration) -> Self {
        Self {
            guard,
            pause,
            default_delay,
        }
    }

    /// Submit, poll until terminal, then download every blob in order.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::ReportFailed`] for a non-completed
    /// terminal status, [`CostProviderError::Protocol`] if the manifest's
    /// blob count disagrees with its blob list, [`CostProviderError::ArtifactFetch`] if any blob
    /// fails (no partial rows are returned), [`CostProviderError::NoData`]
    /// if the blobs hold no rows, or any provider error.
    pub async fn run(
        &self,
        provider: &dyn CostProvider,
        scope: &Scope,
        range: &DateRange,
    ) -> Result<Vec<CostRecord>, CostProviderError> {
        let submitted = self
            .guard
            .run(|| provider.submit_report(scope, range))
            .await?;
        let mut state = PollState::Submitted.advance(submitted)?;

        let manifest = loop {
            match state {
                PollState::Completed(manifest) => break manifest,
                PollState::Failed(status) => {
                    return Err(CostProviderError::ReportFailed { status });
                }
                PollState::Polling {
                    retry_after,
                    ref location,
                } => {
                    let delay = retry_after.unwrap_or(self.default_delay);
                    debug!(
                        provider = provider.name(),
                        scope = %scope,
                        delay_secs = delay.as_secs(),
                        "Report not ready"
                    );
                    self.pause.wait(delay).await?;
                    let response = match provider.poll_report(location).await {
                        // A throttled poll means the report is still pending.
                        Err(CostProviderError::RateLimited(message)) => {
                            warn!(
                                provider = provider.name(),
                                scope = %scope,
                                message = %message,
                                "Report poll rate limited"
                            );
                            ReportResponse {
                                status: ReportStatus::Accepted,
                                retry_after: None,
                                location: None,
                            }
                        }
                        other => other?,
                    };
                    state = state.advance(response)?;
                }
                PollState::Submitted => {
                    return Err(CostProviderError::Protocol(
                        "report never left the submitted state".to_string(),
                    ));
                }
            }
        };

        info!(
            provider = provider.name(),
            scope = %scope,
            blobs = manifest.blob_count,
            "Report completed"
        );

        if manifest.blob_count != manifest.blobs.len() {
            return Err(CostProviderError::Protocol(format!(
                "report manifest declares {} blobs but lists {}",
                manifest.blob_count,
                manifest.blobs.len()
            )));
        }

        let mut records = Vec::new();
        for link in &manifest.blobs {
            let text = provider.download_artifact(link).await?;
            records.extend(from_delimited(&text)?);
        }

        if records.is_empty() {
            return Err(CostProviderError::NoData {
                scope: scope.clone(),
                range: *range,
            });
        }
        Ok(records)
    }
}

//! Cancellable sleeps used by both backoffs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::CostProviderError;

/// Source of delays. Swapped out in tests to record instead of wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A sleeper paired with the session's cancellation token.
#[derive(Clone)]
pub struct Pause {
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl Pause {
    #[must_use]
    pub fn new(sleeper: Arc<dyn Sleeper>, cancel: CancellationToken) -> Self {
        Self { sleeper, cancel }
    }

    /// Wait for `duration` unless cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::Cancelled`] if the token fires before or
    /// during the wait.
    pub async fn wait(&self, duration: Duration) -> Result<(), CostProviderError> {
        if self.cancel.is_cancelled() {
            return Err(CostProviderError::Cancelled);
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(CostProviderError::Cancelled),
            () = self.sleeper.sleep(duration) => Ok(()),
        }
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Default for Pause {
    fn default() -> Self {
        Self::new(Arc::new(TokioSleeper), CancellationToken::new())
    }
}

impl std::fmt::Debug for Pause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pause")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

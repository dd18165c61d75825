//! Fixed-delay retry for throttled requests.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::pause::Pause;
use crate::CostProviderError;

/// Delay between rate-limited attempts unless configured otherwise.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(10);

/// Retries a request for as long as upstream answers with a rate limit.
///
/// Only [`CostProviderError::RateLimited`] is retried. Every other error is
/// returned on the first occurrence.
#[derive(Debug, Clone)]
pub struct RateLimitGuard {
    delay: Duration,
    max_retries: Option<u32>,
    pause: Pause,
}

impl RateLimitGuard {
    #[must_use]
    pub fn new(delay: Duration, max_retries: Option<u32>, pause: Pause) -> Self {
        Self {
            delay,
            max_retries,
            pause,
        }
    }

    /// Run `request` until it stops being rate limited.
    ///
    /// The closure is invoked again with the same captured inputs, so the
    /// retried request is identical to the throttled one.
    ///
    /// # Errors
    ///
    /// Returns the request's own error, [`CostProviderError::Cancelled`] if
    /// cancelled during a delay, or [`CostProviderError::RateLimitExhausted`]
    /// once the optional ceiling is reached.
    pub async fn run<T, F, Fut>(&self, mut request: F) -> Result<T, CostProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CostProviderError>>,
    {
        let mut attempts: u32 = 0;
        loop {
            match request().await {
                Err(CostProviderError::RateLimited(message)) => {
                    if self.max_retries.is_some_and(|max| attempts >= max) {
                        return Err(CostProviderError::RateLimitExhausted { attempts });
                    }
                    attempts += 1;
                    warn!(
                        attempt = attempts,
                        delay_secs = self.delay.as_secs(),
                        message = %message,
                        "Rate limited, retrying"
                    );
                    self.pause.wait(self.delay).await?;
                }
                other => return other,
            }
        }
    }
}

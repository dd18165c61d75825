//! Cursor-following page loop.

use tracing::debug;

use super::rate_limit::RateLimitGuard;
use crate::normalize::{normalize, CostRecord};
use crate::providers::{CostProvider, PageCursor};
use crate::range::{DateRange, Scope};
use crate::CostProviderError;

/// Fetch every page for one scope, in order.
///
/// Pages are requested until the provider stops returning a cursor. Empty
/// pages in the middle are fine; only an empty total is an error.
///
/// # Errors
///
/// Returns [`CostProviderError::NoData`] if no page produced a row, or the
/// first non-rate-limit error from the provider.
pub async fn fetch_all_pages(
    provider: &dyn CostProvider,
    guard: &RateLimitGuard,
    scope: &Scope,
    range: &DateRange,
) -> Result<Vec<CostRecord>, CostProviderError> {
    let mut records = Vec::new();
    let mut cursor: Option<PageCursor> = None;
    let mut pages = 0_usize;

    loop {
        let page = guard
            .run(|| provider.fetch_cost_page(scope, range, cursor.as_ref()))
            .await?;
        pages += 1;

        let rows = normalize(page.rows)?;
        debug!(
            provider = provider.name(),
            scope = %scope,
            page = pages,
            rows = rows.len(),
            "Fetched cost page"
        );
        records.extend(rows);

        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    if records.is_empty() {
        return Err(CostProviderError::NoData {
            scope: scope.clone(),
            range: *range,
        });
    }
    Ok(records)
}

//! Date range and scope value types.

use std::fmt;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::CostProviderError;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Scope
// ============================================================================

/// Provider-defined partition of billing data (account id, subscription id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// Identifier used for providers that have no scope concept.
    pub const IMPLICIT: &'static str = "*";

    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The single scope used when a provider does not list scopes.
    #[must_use]
    pub fn implicit() -> Self {
        Self(Self::IMPLICIT.to_string())
    }

    #[must_use]
    pub fn is_implicit(&self) -> bool {
        self.0 == Self::IMPLICIT
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Date input
// ============================================================================

/// A date either already parsed or given as `YYYY-MM-DD` text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateInput {
    Date(NaiveDate),
    Text(String),
}

impl DateInput {
    /// Resolve the input to a calendar date.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::InvalidDate`] if the text is not a valid
    /// `YYYY-MM-DD` date.
    pub fn resolve(self) -> Result<NaiveDate, CostProviderError> {
        match self {
            Self::Date(date) => Ok(date),
            Self::Text(text) => NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
                .map_err(|_| CostProviderError::InvalidDate(text)),
        }
    }
}

impl From<NaiveDate> for DateInput {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

impl From<&str> for DateInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for DateInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

// ============================================================================
// Date range
// ============================================================================

/// Closed pair of calendar dates with `start <= end`.
///
/// Whether `end` itself is billed is up to each provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Build a range from two dates.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::InvalidRange`] if `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CostProviderError> {
        if start > end {
            return Err(CostProviderError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Build a range from dates or `YYYY-MM-DD` strings.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::InvalidDate`] for unparseable text and
    /// [`CostProviderError::InvalidRange`] if `start > end`.
    pub fn parse(
        start: impl Into<DateInput>,
        end: impl Into<DateInput>,
    ) -> Result<Self, CostProviderError> {
        let start = start.into().resolve()?;
        let end = end.into().resolve()?;
        Self::new(start, end)
    }

    /// The `days` days ending today (UTC).
    #[must_use]
    pub fn last_days(days: u32) -> Self {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(i64::from(days));
        Self { start, end }
    }

    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

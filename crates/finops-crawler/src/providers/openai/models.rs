//! Costs API payloads.

use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// Paging
// ============================================================================

/// `{"object": "page", ...}` envelope around a list of buckets.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiPage<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    /// Opaque token for the `page` query parameter.
    pub next_page: Option<String>,
}

/// One `bucket_width` slice of the requested window.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiBucket<T> {
    /// Unix seconds, passed through untouched.
    pub start_time: Value,
    pub end_time: Value,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

// ============================================================================
// Cost results
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiAmount {
    pub value: Value,
    /// Lowercase ISO code, e.g. `usd`.
    #[serde(default)]
    pub currency: Value,
}

/// `organization.costs.result`. Grouping fields are null when not grouped by.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiCost {
    pub amount: OpenAiAmount,
    #[serde(default)]
    pub line_item: Value,
    #[serde(default)]
    pub project_id: Value,
}

// ============================================================================
// Errors
// ============================================================================

/// `{"error": {...}}` body of a failed call.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiError {
    pub error: OpenAiErrorDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiErrorDetails {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

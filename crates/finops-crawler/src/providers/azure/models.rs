//! Azure API request and response models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Authentication
// ============================================================================

/// OAuth2 client-credentials token response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for Azure Resource Manager.
    pub access_token: Option<String>,
}

// ============================================================================
// Subscriptions
// ============================================================================

/// Subscription list page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionList {
    /// Subscriptions visible to the principal.
    #[serde(default)]
    pub value: Vec<Subscription>,
    /// Link to the next page, if any.
    pub next_link: Option<String>,
}

/// A single subscription.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Subscription GUID.
    pub subscription_id: String,
    /// Display name.
    pub display_name: Option<String>,
}

// ============================================================================
// Cost Management query
// ============================================================================

/// Body of a Cost Management query. Re-sent unchanged to every `nextLink`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostQueryRequest {
    #[serde(rename = "type")]
    pub query_type: &'static str,
    pub timeframe: &'static str,
    pub time_period: QueryTimePeriod,
    pub dataset: QueryDataset,
}

/// Custom time window, ISO-8601 timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct QueryTimePeriod {
    pub from: String,
    pub to: String,
}

/// Dataset definition.
#[derive(Debug, Clone, Serialize)]
pub struct QueryDataset {
    pub granularity: &'static str,
    pub aggregation: QueryAggregationSet,
    pub grouping: Vec<QueryGrouping>,
}

/// Aggregations keyed by output column.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAggregationSet {
    pub total_cost: QueryAggregation,
}

/// One aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAggregation {
    pub name: &'static str,
    pub function: &'static str,
}

/// Grouping dimension.
#[derive(Debug, Clone, Serialize)]
pub struct QueryGrouping {
    #[serde(rename = "type")]
    pub grouping_type: &'static str,
    pub name: &'static str,
}

/// Query response.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResult {
    pub properties: QueryProperties,
}

/// Columnar result page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryProperties {
    #[serde(default)]
    pub columns: Vec<QueryColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    /// Absolute URL of the next page.
    pub next_link: Option<String>,
}

/// Column descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: Option<String>,
}

// ============================================================================
// Cost details report
// ============================================================================

/// Body of a `generateCostDetailsReport` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostDetailsRequest {
    pub metric: &'static str,
    pub time_period: CostDetailsTimePeriod,
}

/// Report window, calendar dates.
#[derive(Debug, Clone, Serialize)]
pub struct CostDetailsTimePeriod {
    pub start: String,
    pub end: String,
}

/// Report operation status.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostDetailsOperation {
    /// e.g. "Completed", "Failed", "NoDataFound".
    pub status: String,
    pub manifest: Option<CostDetailsManifest>,
}

/// Blob manifest of a completed report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostDetailsManifest {
    #[serde(default)]
    pub blob_count: usize,
    #[serde(default)]
    pub blobs: Vec<CostDetailsBlob>,
}

/// One downloadable blob.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostDetailsBlob {
    pub blob_link: String,
    pub byte_count: Option<u64>,
}

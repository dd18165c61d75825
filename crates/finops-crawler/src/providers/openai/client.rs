//! OpenAI organization Costs API client.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};

use super::models::{OpenAiBucket, OpenAiCost, OpenAiError, OpenAiPage};
use crate::credentials::Credentials;
use crate::http::{self, RawResponse};
use crate::normalize::RawRows;
use crate::providers::{CapabilitySet, CostPage, CostProvider, PageCursor};
use crate::range::{DateRange, Scope};
use crate::CostProviderError;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1/organization";

/// Buckets requested per page.
const PAGE_LIMIT: u32 = 30;

/// Columns of every normalized OpenAI cost row.
pub const COLUMNS: [&str; 6] = [
    "start_time",
    "end_time",
    "line_item",
    "project_id",
    "amount",
    "currency",
];

/// Credential field holding the organization id.
pub const ORG_ID_FIELD: &str = "OPENAI_ORG_ID";
/// Credential field holding the admin API key.
pub const ADMIN_KEY_FIELD: &str = "OPENAI_ADMIN_KEY";

/// OpenAI Costs API provider.
///
/// Daily cost buckets grouped by line item and project. The provider has no
/// scope concept; the range end is exclusive.
#[derive(Clone)]
pub struct OpenAiCostProvider {
    client: Client,
    base_url: String,
    org_id: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiCostProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCostProvider")
            .field("base_url", &self.base_url)
            .field("org_id", &self.org_id)
            .finish_non_exhaustive()
    }
}

impl OpenAiCostProvider {
    /// Create a new OpenAI cost provider.
    ///
    /// # Arguments
    ///
    /// * `org_id` - OpenAI organization id, sent as `OpenAI-Organization`
    /// * `api_key` - OpenAI Admin API key
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty.
    pub fn new(
        org_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, CostProviderError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(CostProviderError::MissingCredential {
                platform: "openai".to_string(),
                missing: vec![ADMIN_KEY_FIELD.to_string()],
            });
        }

        Ok(Self {
            client: http::build_client()?,
            base_url: OPENAI_API_BASE.to_string(),
            org_id: org_id.into(),
            api_key,
        })
    }

    /// Create a provider from resolved `openai` credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if a credential field is absent.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, CostProviderError> {
        Self::new(
            credentials.require(ORG_ID_FIELD)?,
            credentials.require(ADMIN_KEY_FIELD)?,
        )
    }

    /// Point the provider at a different API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build query parameters for the costs endpoint.
    fn build_cost_query(range: &DateRange, page: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("start_time", unix_midnight(range.start()).to_string()),
            ("end_time", unix_midnight(range.end()).to_string()),
            ("bucket_width", "1d".to_string()),
            ("group_by", "line_item".to_string()),
            ("group_by", "project_id".to_string()),
            ("limit", PAGE_LIMIT.to_string()),
        ];

        if let Some(page) = page {
            params.push(("page", page.to_string()));
        }

        params
    }

    /// Flatten buckets into rows matching [`COLUMNS`].
    fn flatten(buckets: Vec<OpenAiBucket<OpenAiCost>>) -> Vec<Vec<Value>> {
        buckets
            .into_iter()
            .flat_map(|bucket| {
                let start = bucket.start_time;
                let end = bucket.end_time;
                bucket.results.into_iter().map(move |cost| {
                    vec![
                        start.clone(),
                        end.clone(),
                        cost.line_item,
                        cost.project_id,
                        cost.amount.value,
                        cost.amount.currency,
                    ]
                })
            })
            .collect()
    }

    fn error_for(response: RawResponse) -> CostProviderError {
        let message = serde_json::from_str::<OpenAiError>(&response.body)
            .map_or_else(|_| response.body.clone(), |e| e.error.message);

        match response.status {
            StatusCode::TOO_MANY_REQUESTS => CostProviderError::RateLimited(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                CostProviderError::Authentication {
                    status: response.status.as_u16(),
                    message,
                }
            }
            status => CostProviderError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

#[async_trait]
impl CostProvider for OpenAiCostProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(false, true, false)
    }

    async fn authenticate(&self) -> Result<(), CostProviderError> {
        // Admin keys are used as-is; there is no exchange step.
        if self.org_id.is_empty() {
            return Err(CostProviderError::MissingCredential {
                platform: "openai".to_string(),
                missing: vec![ORG_ID_FIELD.to_string()],
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(provider = "openai"))]
    async fn fetch_cost_page(
        &self,
        _scope: &Scope,
        range: &DateRange,
        cursor: Option<&PageCursor>,
    ) -> Result<CostPage, CostProviderError> {
        let page = match cursor {
            None => None,
            Some(PageCursor::Token(token)) => Some(token.as_str()),
            Some(PageCursor::Url(url)) => {
                return Err(CostProviderError::Protocol(format!(
                    "OpenAI pages by token, got URL cursor {url}"
                )));
            }
        };

        let url = http::join(&self.base_url, "/costs");
        debug!(url = %url, "Making OpenAI API request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("OpenAI-Organization", &self.org_id)
            .query(&Self::build_cost_query(range, page))
            .send()
            .await?;
        let response = RawResponse::read(response).await?;

        if !response.is_success() {
            return Err(Self::error_for(response));
        }

        let body: OpenAiPage<OpenAiBucket<OpenAiCost>> = response.json()?;
        let next = if body.has_more {
            body.next_page.map(PageCursor::Token)
        } else {
            None
        };

        Ok(CostPage {
            rows: RawRows::Columnar {
                columns: COLUMNS.iter().map(ToString::to_string).collect(),
                rows: Self::flatten(body.data),
            },
            next,
        })
    }
}

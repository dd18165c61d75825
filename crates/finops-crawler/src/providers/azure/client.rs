//! Azure Cost Management API client implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use super::models::{
    CostDetailsOperation, CostDetailsRequest, CostDetailsTimePeriod, CostQueryRequest,
    QueryAggregation, QueryAggregationSet, QueryDataset, QueryGrouping, QueryResult,
    QueryTimePeriod, SubscriptionList, TokenResponse,
};
use crate::credentials::Credentials;
use crate::http::{self, RawResponse};
use crate::normalize::RawRows;
use crate::providers::{
    CapabilitySet, CostPage, CostProvider, PageCursor, ReportManifest, ReportResponse,
    ReportStatus,
};
use crate::range::{DateRange, Scope};
use crate::CostProviderError;

/// Azure AD login endpoint.
const LOGIN_BASE: &str = "https://login.microsoftonline.com";

/// Azure Resource Manager endpoint.
const MANAGEMENT_BASE: &str = "https://management.azure.com";

/// Resource the access token is issued for.
const TOKEN_RESOURCE: &str = "https://management.azure.com/";

/// Azure API version for subscription listing.
const SUBSCRIPTIONS_API_VERSION: &str = "2020-01-01";

/// Azure API version for Cost Management queries.
const QUERY_API_VERSION: &str = "2019-11-01";

/// Azure API version for cost details reports.
const COST_DETAILS_API_VERSION: &str = "2022-05-01";

pub const TENANT_ID_FIELD: &str = "AZURE_TENANT_ID";
pub const CLIENT_ID_FIELD: &str = "AZURE_CLIENT_ID";
pub const CLIENT_SECRET_FIELD: &str = "AZURE_CLIENT_SECRET";

/// Azure Cost Management provider.
///
/// Scopes are subscriptions. Costs come either from the paginated query API
/// (daily, grouped by resource and charge type) or from the cost details
/// report. The range end is inclusive.
pub struct Azure {
    /// HTTP client.
    client: Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    login_base: String,
    management_base: String,
    /// Access token, set by `authenticate`.
    access_token: OnceCell<String>,
}

impl Azure {
    /// Create a new Azure provider.
    ///
    /// # Arguments
    /// * `tenant_id` - Azure AD tenant
    /// * `client_id` - Service principal application id
    /// * `client_secret` - Service principal secret
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, CostProviderError> {
        Ok(Self {
            client: http::build_client()?,
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            login_base: LOGIN_BASE.to_string(),
            management_base: MANAGEMENT_BASE.to_string(),
            access_token: OnceCell::new(),
        })
    }

    /// Create a provider from resolved `azure` credentials.
    ///
    /// # Errors
    /// Returns error if a credential field is absent.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, CostProviderError> {
        Self::new(
            credentials.require(TENANT_ID_FIELD)?,
            credentials.require(CLIENT_ID_FIELD)?,
            credentials.require(CLIENT_SECRET_FIELD)?,
        )
    }

    /// Override the login and management endpoints.
    #[must_use]
    pub fn with_endpoints(
        mut self,
        login_base: impl Into<String>,
        management_base: impl Into<String>,
    ) -> Self {
        self.login_base = login_base.into();
        self.management_base = management_base.into();
        self
    }

    fn token(&self) -> Result<&str, CostProviderError> {
        self.access_token.get().map(String::as_str).ok_or_else(|| {
            CostProviderError::Authentication {
                status: 0,
                message: "Azure provider used before authenticate()".to_string(),
            }
        })
    }

    fn subscription_url(&self, scope: &Scope, path: &str, api_version: &str) -> String {
        format!(
            "{}?api-version={api_version}",
            http::join(
                &self.management_base,
                &format!("/subscriptions/{scope}/providers/Microsoft.CostManagement/{path}")
            )
        )
    }

    /// Build the query body. `to` runs to the end of the last day.
    fn query_body(range: &DateRange) -> CostQueryRequest {
        CostQueryRequest {
            query_type: "ActualCost",
            timeframe: "Custom",
            time_period: QueryTimePeriod {
                from: format!("{}T00:00:00Z", range.start().format("%Y-%m-%d")),
                to: format!("{}T23:59:59Z", range.end().format("%Y-%m-%d")),
            },
            dataset: QueryDataset {
                granularity: "Daily",
                aggregation: QueryAggregationSet {
                    total_cost: QueryAggregation {
                        name: "Cost",
                        function: "Sum",
                    },
                },
                grouping: vec![
                    QueryGrouping {
                        grouping_type: "Dimension",
                        name: "ResourceId",
                    },
                    QueryGrouping {
                        grouping_type: "Dimension",
                        name: "ChargeType",
                    },
                ],
            },
        }
    }

    fn report_body(range: &DateRange) -> CostDetailsRequest {
        CostDetailsRequest {
            metric: "ActualCost",
            time_period: CostDetailsTimePeriod {
                start: range.start().format("%Y-%m-%d").to_string(),
                end: range.end().format("%Y-%m-%d").to_string(),
            },
        }
    }

    /// Map a non-success response.
    fn error_for(response: RawResponse) -> CostProviderError {
        let status = response.status;
        let message = error_message(&response.body);
        match status {
            StatusCode::TOO_MANY_REQUESTS => CostProviderError::RateLimited(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                CostProviderError::Authentication {
                    status: status.as_u16(),
                    message,
                }
            }
            _ => CostProviderError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Interpret a report submission or poll response.
    fn report_response(response: RawResponse) -> Result<ReportResponse, CostProviderError> {
        let status = if response.status == StatusCode::ACCEPTED {
            ReportStatus::Accepted
        } else {
            let operation: CostDetailsOperation = response.json()?;
            match operation.status.as_str() {
                "Completed" => {
                    let manifest = operation.manifest.ok_or_else(|| {
                        CostProviderError::Protocol(
                            "completed cost details report has no manifest".to_string(),
                        )
                    })?;
                    ReportStatus::Completed(ReportManifest {
                        blob_count: manifest.blob_count,
                        blobs: manifest.blobs.into_iter().map(|b| b.blob_link).collect(),
                    })
                }
                "InProgress" | "Queued" => ReportStatus::Accepted,
                _ => ReportStatus::Other(operation.status),
            }
        };

        Ok(ReportResponse {
            status,
            retry_after: response.retry_after,
            location: response.location,
        })
    }
}

/// Pull the human-readable message out of an ARM or AAD error body.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    value
        .pointer("/error/message")
        .or_else(|| value.get("error_description"))
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| body.to_string(), ToString::to_string)
}

impl std::fmt::Debug for Azure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Azure")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("management_base", &self.management_base)
            .field("authenticated", &self.access_token.initialized())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CostProvider for Azure {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, true, true)
    }

    #[instrument(skip(self), fields(provider = "azure"))]
    async fn authenticate(&self) -> Result<(), CostProviderError> {
        self.access_token
            .get_or_try_init(|| async {
                let url = http::join(&self.login_base, &format!("/{}/oauth2/token", self.tenant_id));
                debug!(url = %url, "Requesting access token");

                let response = self
                    .client
                    .post(&url)
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", self.client_id.as_str()),
                        ("client_secret", self.client_secret.as_str()),
                        ("resource", TOKEN_RESOURCE),
                    ])
                    .send()
                    .await?;
                let response = RawResponse::read(response).await?;

                if !response.is_success() {
                    return Err(CostProviderError::Authentication {
                        status: response.status.as_u16(),
                        message: error_message(&response.body),
                    });
                }

                let token: TokenResponse = response.json()?;
                let access_token = token.access_token.ok_or_else(|| {
                    CostProviderError::Protocol("token response has no access_token".to_string())
                })?;
                info!("Azure authentication successful");
                Ok(access_token)
            })
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(provider = "azure"))]
    async fn list_scopes(&self) -> Result<Vec<Scope>, CostProviderError> {
        let token = self.token()?;
        let mut scopes = Vec::new();
        let mut url = Some(format!(
            "{}?api-version={SUBSCRIPTIONS_API_VERSION}",
            http::join(&self.management_base, "/subscriptions")
        ));

        while let Some(current) = url.take() {
            debug!(url = %current, "GET request");
            let response = self.client.get(&current).bearer_auth(token).send().await?;
            let response = RawResponse::read(response).await?;
            if !response.is_success() {
                return Err(Self::error_for(response));
            }

            let page: SubscriptionList = response.json()?;
            scopes.extend(
                page.value
                    .into_iter()
                    .map(|s| Scope::new(s.subscription_id)),
            );
            url = page.next_link.filter(|link| !link.is_empty());
        }

        if scopes.is_empty() {
            return Err(CostProviderError::EmptyScope { provider: "azure" });
        }
        Ok(scopes)
    }

    #[instrument(skip(self), fields(provider = "azure"))]
    async fn fetch_cost_page(
        &self,
        scope: &Scope,
        range: &DateRange,
        cursor: Option<&PageCursor>,
    ) -> Result<CostPage, CostProviderError> {
        let url = match cursor {
            None => self.subscription_url(scope, "query", QUERY_API_VERSION),
            Some(PageCursor::Url(link)) => link.clone(),
            Some(PageCursor::Token(token)) => {
                return Err(CostProviderError::Protocol(format!(
                    "Azure pages by nextLink, got token cursor {token}"
                )));
            }
        };
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token()?)
            .json(&Self::query_body(range))
            .send()
            .await?;
        let response = RawResponse::read(response).await?;
        if !response.is_success() {
            return Err(Self::error_for(response));
        }

        let result: QueryResult = response.json()?;
        let properties = result.properties;
        Ok(CostPage {
            rows: RawRows::Columnar {
                columns: properties.columns.into_iter().map(|c| c.name).collect(),
                rows: properties.rows,
            },
            next: properties
                .next_link
                .filter(|link| !link.is_empty())
                .map(PageCursor::Url),
        })
    }

    #[instrument(skip(self), fields(provider = "azure"))]
    async fn submit_report(
        &self,
        scope: &Scope,
        range: &DateRange,
    ) -> Result<ReportResponse, CostProviderError> {
        let url = self.subscription_url(scope, "generateCostDetailsReport", COST_DETAILS_API_VERSION);
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token()?)
            .json(&Self::report_body(range))
            .send()
            .await?;
        let response = RawResponse::read(response).await?;

        if response.status == StatusCode::NOT_FOUND {
            return Err(CostProviderError::UnsupportedScope {
                scope: scope.clone(),
                status: response.status.as_u16(),
                message: error_message(&response.body),
            });
        }
        if !response.is_success() {
            return Err(Self::error_for(response));
        }
        Self::report_response(response)
    }

    #[instrument(skip(self), fields(provider = "azure"))]
    async fn poll_report(&self, location: &str) -> Result<ReportResponse, CostProviderError> {
        let response = self
            .client
            .get(location)
            .bearer_auth(self.token()?)
            .send()
            .await?;
        let response = RawResponse::read(response).await?;

        // A throttled poll is just a report that is not ready yet.
        if response.status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(ReportResponse {
                status: ReportStatus::Accepted,
                retry_after: response.retry_after,
                location: None,
            });
        }
        if !response.is_success() {
            return Err(Self::error_for(response));
        }
        Self::report_response(response)
    }

    #[instrument(skip(self), fields(provider = "azure"))]
    async fn download_artifact(&self, link: &str) -> Result<String, CostProviderError> {
        // Blob links are pre-signed; no bearer token.
        let fetch_failed = |status: u16, message: String| CostProviderError::ArtifactFetch {
            link: link.to_string(),
            status,
            message,
        };

        let response = self
            .client
            .get(link)
            .send()
            .await
            .map_err(|e| fetch_failed(e.status().map_or(0, |s| s.as_u16()), e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| fetch_failed(status.as_u16(), e.to_string()))?;

        if !status.is_success() {
            return Err(fetch_failed(status.as_u16(), body));
        }
        Ok(body)
    }
}

//! AWS API client implementation.
//!
//! Talks to Cost Explorer, Organizations and STS over their JSON/query
//! protocols with SigV4-signed requests.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::models::{
    AwsJsonError, DateInterval, DimensionValues, Expression, GetCallerIdentityEnvelope,
    GetCostAndUsageRequest, GetCostAndUsageResponse, GroupDefinition, ListAccountsRequest,
    ListAccountsResponse,
};
use super::sigv4::{SignableRequest, Signer, SigningCredentials};
use crate::credentials::Credentials;
use crate::http::{self, RawResponse};
use crate::normalize::RawRows;
use crate::providers::{CapabilitySet, CostPage, CostProvider, PageCursor};
use crate::range::{DateRange, Scope};
use crate::CostProviderError;

/// Region all three global endpoints sign for.
const SIGNING_REGION: &str = "us-east-1";

const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

const GET_COST_AND_USAGE_TARGET: &str = "AWSInsightsIndexService.GetCostAndUsage";
const LIST_ACCOUNTS_TARGET: &str = "AWSOrganizationsV20161128.ListAccounts";
const GET_CALLER_IDENTITY_BODY: &str = "Action=GetCallerIdentity&Version=2011-06-15";

const NOT_IN_ORGANIZATION: &str = "AWSOrganizationsNotInUseException";
const THROTTLING_CODES: [&str; 3] = [
    "ThrottlingException",
    "LimitExceededException",
    "TooManyRequestsException",
];

/// Metric requested from Cost Explorer.
const METRIC: &str = "UnblendedCost";

/// Columns of every normalized AWS cost row.
pub const COLUMNS: [&str; 7] = [
    "TimePeriodStart",
    "TimePeriodEnd",
    "SERVICE",
    "USAGE_TYPE",
    METRIC,
    "Unit",
    "Estimated",
];

pub const ACCESS_KEY_ID_FIELD: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY_FIELD: &str = "AWS_SECRET_ACCESS_KEY";
/// Optional field; temporary credentials are signed with it when set.
pub const SESSION_TOKEN_FIELD: &str = "AWS_SESSION_TOKEN";

/// Service endpoints. Overridable so tests can target a mock server.
#[derive(Debug, Clone)]
pub struct AwsEndpoints {
    pub cost_explorer: String,
    pub organizations: String,
    pub sts: String,
}

impl Default for AwsEndpoints {
    fn default() -> Self {
        Self {
            cost_explorer: "https://ce.us-east-1.amazonaws.com/".to_string(),
            organizations: "https://organizations.us-east-1.amazonaws.com/".to_string(),
            sts: "https://sts.amazonaws.com/".to_string(),
        }
    }
}

/// AWS Cost Explorer provider.
///
/// Scopes are linked accounts. Costs are daily `UnblendedCost` grouped by
/// service and usage type. The range end is exclusive.
pub struct Aws {
    /// HTTP client.
    client: Client,
    credentials: SigningCredentials,
    endpoints: AwsEndpoints,
    /// Account of the signing principal, set by `authenticate`.
    caller_account: OnceCell<String>,
}

impl Aws {
    /// Create a new AWS provider.
    ///
    /// # Arguments
    /// * `access_key_id` - AWS access key ID
    /// * `secret_access_key` - AWS secret access key
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Result<Self, CostProviderError> {
        Ok(Self {
            client: http::build_client()?,
            credentials: SigningCredentials {
                access_key_id: access_key_id.into(),
                secret_access_key: secret_access_key.into(),
                session_token: None,
            },
            endpoints: AwsEndpoints::default(),
            caller_account: OnceCell::new(),
        })
    }

    /// Create a provider from resolved `aws` credentials.
    ///
    /// # Errors
    /// Returns error if a required credential field is absent.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, CostProviderError> {
        let aws = Self::new(
            credentials.require(ACCESS_KEY_ID_FIELD)?,
            credentials.require(SECRET_ACCESS_KEY_FIELD)?,
        )?;
        Ok(match credentials.get(SESSION_TOKEN_FIELD) {
            Some(token) => aws.with_session_token(token),
            None => aws,
        })
    }

    /// Set a temporary-credentials session token.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.credentials.session_token = Some(token.into());
        self
    }

    /// Override the service endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: AwsEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Send a signed POST and read the response.
    async fn signed_post(
        &self,
        url: &str,
        service: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Result<RawResponse, CostProviderError> {
        let signer = Signer::new(self.credentials.clone(), SIGNING_REGION, service);
        let auth_headers = signer.sign(
            &SignableRequest {
                method: "POST",
                url,
                headers,
                body: &body,
            },
            Utc::now(),
        )?;

        debug!(url = %url, service, "POST request");
        let mut request = self.client.post(url);
        for (name, value) in headers.iter().copied() {
            request = request.header(name, value);
        }
        for (name, value) in auth_headers {
            request = request.header(name, value);
        }

        let response = request.body(body).send().await?;
        RawResponse::read(response).await
    }

    /// Call a JSON-protocol operation.
    async fn call_json<B: Serialize>(
        &self,
        url: &str,
        service: &str,
        target: &str,
        body: &B,
    ) -> Result<RawResponse, CostProviderError> {
        let body = serde_json::to_vec(body)?;
        self.signed_post(
            url,
            service,
            &[("content-type", JSON_CONTENT_TYPE), ("x-amz-target", target)],
            body,
        )
        .await
    }

    /// Map a JSON-protocol error response.
    fn error_for(response: RawResponse) -> CostProviderError {
        let parsed = serde_json::from_str::<AwsJsonError>(&response.body).ok();
        let code = parsed.as_ref().map(AwsJsonError::code).unwrap_or_default();

        if response.status == StatusCode::TOO_MANY_REQUESTS || THROTTLING_CODES.contains(&code) {
            let message = parsed.map_or(response.body, |e| e.message);
            return CostProviderError::RateLimited(message);
        }
        if matches!(
            response.status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return CostProviderError::Authentication {
                status: response.status.as_u16(),
                message: response.body,
            };
        }
        CostProviderError::Api {
            status: response.status.as_u16(),
            message: response.body,
        }
    }

    /// Resolve the caller's account through STS, once.
    async fn caller_account(&self) -> Result<&str, CostProviderError> {
        self.caller_account
            .get_or_try_init(|| async {
                let response = self
                    .signed_post(
                        &self.endpoints.sts,
                        "sts",
                        &[
                            ("content-type", FORM_CONTENT_TYPE),
                            ("accept", "application/json"),
                        ],
                        GET_CALLER_IDENTITY_BODY.as_bytes().to_vec(),
                    )
                    .await?;

                if !response.is_success() {
                    let message = serde_json::from_str::<Value>(&response.body)
                        .ok()
                        .and_then(|v| v.pointer("/Error/Message")?.as_str().map(ToString::to_string))
                        .unwrap_or_else(|| response.body.clone());
                    return Err(CostProviderError::Authentication {
                        status: response.status.as_u16(),
                        message,
                    });
                }

                let envelope: GetCallerIdentityEnvelope = response.json()?;
                let identity = envelope
                    .get_caller_identity_response
                    .get_caller_identity_result;
                info!(account = %identity.account, "AWS authentication successful");
                Ok(identity.account)
            })
            .await
            .map(String::as_str)
    }

    fn cost_request(
        scope: &Scope,
        range: &DateRange,
        next_page_token: Option<String>,
    ) -> GetCostAndUsageRequest {
        GetCostAndUsageRequest {
            time_period: DateInterval {
                start: range.start().format("%Y-%m-%d").to_string(),
                end: range.end().format("%Y-%m-%d").to_string(),
            },
            granularity: "DAILY",
            metrics: vec![METRIC],
            group_by: vec![
                GroupDefinition {
                    group_type: "DIMENSION",
                    key: "SERVICE",
                },
                GroupDefinition {
                    group_type: "DIMENSION",
                    key: "USAGE_TYPE",
                },
            ],
            filter: Expression {
                dimensions: DimensionValues {
                    key: "LINKED_ACCOUNT",
                    values: vec![scope.to_string()],
                },
            },
            next_page_token,
        }
    }

    /// Flatten time buckets and groups into rows matching [`COLUMNS`].
    fn flatten(response: GetCostAndUsageResponse) -> Vec<Vec<Value>> {
        let mut rows = Vec::new();
        for result in response.results_by_time {
            for group in result.groups {
                let key = |i: usize| group.keys.get(i).cloned().map_or(Value::Null, Value::String);
                let (amount, unit) = group
                    .metrics
                    .get(METRIC)
                    .map_or((Value::Null, Value::Null), |m| {
                        (m.amount.clone(), m.unit.clone())
                    });
                rows.push(vec![
                    Value::String(result.time_period.start.clone()),
                    Value::String(result.time_period.end.clone()),
                    key(0),
                    key(1),
                    amount,
                    unit,
                    result.estimated.clone(),
                ]);
            }
        }
        rows
    }
}

impl std::fmt::Debug for Aws {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aws")
            .field("credentials", &self.credentials)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CostProvider for Aws {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, true, false)
    }

    #[instrument(skip(self), fields(provider = "aws"))]
    async fn authenticate(&self) -> Result<(), CostProviderError> {
        self.caller_account().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(provider = "aws"))]
    async fn list_scopes(&self) -> Result<Vec<Scope>, CostProviderError> {
        let mut scopes = Vec::new();
        let mut request = ListAccountsRequest::default();

        loop {
            let response = self
                .call_json(
                    &self.endpoints.organizations,
                    "organizations",
                    LIST_ACCOUNTS_TARGET,
                    &request,
                )
                .await?;

            if !response.is_success() {
                let not_in_org = serde_json::from_str::<AwsJsonError>(&response.body)
                    .is_ok_and(|e| e.code() == NOT_IN_ORGANIZATION);
                if not_in_org {
                    warn!("Account is not a member of an organization, using caller account");
                    return Ok(vec![Scope::new(self.caller_account().await?)]);
                }
                return Err(Self::error_for(response));
            }

            let page: ListAccountsResponse = response.json()?;
            scopes.extend(page.accounts.into_iter().map(|a| Scope::new(a.id)));
            match page.next_token {
                Some(token) if !token.is_empty() => request.next_token = Some(token),
                _ => break,
            }
        }

        if scopes.is_empty() {
            return Err(CostProviderError::EmptyScope { provider: "aws" });
        }
        Ok(scopes)
    }

    #[instrument(skip(self), fields(provider = "aws"))]
    async fn fetch_cost_page(
        &self,
        scope: &Scope,
        range: &DateRange,
        cursor: Option<&PageCursor>,
    ) -> Result<CostPage, CostProviderError> {
        let token = match cursor {
            None => None,
            Some(PageCursor::Token(token)) => Some(token.clone()),
            Some(PageCursor::Url(url)) => {
                return Err(CostProviderError::Protocol(format!(
                    "Cost Explorer pages by token, got URL cursor {url}"
                )));
            }
        };

        let response = self
            .call_json(
                &self.endpoints.cost_explorer,
                "ce",
                GET_COST_AND_USAGE_TARGET,
                &Self::cost_request(scope, range, token),
            )
            .await?;
        if !response.is_success() {
            return Err(Self::error_for(response));
        }

        let body: GetCostAndUsageResponse = response.json()?;
        let next = body
            .next_page_token
            .clone()
            .filter(|t| !t.is_empty())
            .map(PageCursor::Token);

        Ok(CostPage {
            rows: RawRows::Columnar {
                columns: COLUMNS.iter().map(ToString::to_string).collect(),
                rows: Self::flatten(body),
            },
            next,
        })
    }
}

//! Azure provider against a wiremock Azure AD + Resource Manager.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use finops_crawler::engine::Pause;
use finops_crawler::providers::Azure;
use finops_crawler::{
    CostProvider, CostProviderError, CostRetriever, DateRange, EngineConfig, RetrievalStrategy,
    Scope,
};

use common::RecordingSleeper;

const QUERY_PATH: &str = "/subscriptions/sub-1/providers/Microsoft.CostManagement/query";
const REPORT_PATH: &str =
    "/subscriptions/sub-1/providers/Microsoft.CostManagement/generateCostDetailsReport";

// =============================================================================
// Helpers
// =============================================================================

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "access_token": "token-abc"
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_subscriptions(server: &MockServer, ids: &[&str]) {
    let value: Vec<_> = ids.iter().map(|id| json!({"subscriptionId": id})).collect();
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .and(query_param("api-version", "2020-01-01"))
        .and(header("authorization", "Bearer token-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": value })))
        .mount(server)
        .await;
}

fn azure(server: &MockServer) -> Arc<Azure> {
    Arc::new(
        Azure::new("tenant-1", "client-1", "secret-1")
            .unwrap()
            .with_endpoints(server.uri(), server.uri()),
    )
}

fn retriever(provider: Arc<Azure>) -> (CostRetriever, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let pause = Pause::new(sleeper.clone(), CancellationToken::new());
    (
        CostRetriever::with_pause(provider, EngineConfig::default(), pause),
        sleeper,
    )
}

fn range() -> DateRange {
    DateRange::parse("2024-01-01", "2024-01-07").unwrap()
}

fn query_page(rows: serde_json::Value, next_link: Option<String>) -> serde_json::Value {
    json!({
        "properties": {
            "nextLink": next_link,
            "columns": [
                {"name": "Cost", "type": "Number"},
                {"name": "UsageDate", "type": "Number"},
                {"name": "ResourceId", "type": "String"},
                {"name": "ChargeType", "type": "String"},
                {"name": "Currency", "type": "String"}
            ],
            "rows": rows
        }
    })
}

// =============================================================================
// Authentication and scopes
// =============================================================================

#[tokio::test]
async fn lists_subscriptions_after_token_exchange() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_subscriptions(&server, &["sub-1", "sub-2"]).await;

    let (retriever, _) = retriever(azure(&server));
    let scopes = retriever.scopes().await.unwrap();

    assert_eq!(scopes, vec![Scope::new("sub-1"), Scope::new("sub-2")]);
}

#[tokio::test]
async fn empty_subscription_list_is_empty_scope() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_subscriptions(&server, &[]).await;

    let (retriever, _) = retriever(azure(&server));
    let err = retriever.scopes().await.unwrap_err();

    assert!(matches!(err, CostProviderError::EmptyScope { provider: "azure" }));
}

#[tokio::test]
async fn rejected_credentials_are_authentication_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(&server)
        .await;

    let provider = azure(&server);
    let err = provider.authenticate().await.unwrap_err();

    match err {
        CostProviderError::Authentication { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "AADSTS7000215: Invalid client secret provided.");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// =============================================================================
// Query pagination
// =============================================================================

#[tokio::test]
async fn follows_next_link_and_retries_rate_limit() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    let next_link = format!("{}/next/page-2", server.uri());
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(query_param("api-version", "2019-11-01"))
        .and(header("authorization", "Bearer token-abc"))
        .and(body_partial_json(json!({
            "type": "ActualCost",
            "timeframe": "Custom",
            "timePeriod": {"from": "2024-01-01T00:00:00Z", "to": "2024-01-07T23:59:59Z"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_page(
            json!([
                [1.25, 20_240_101, "/vm/a", "Usage", "USD"],
                [0.5, 20_240_101, "/vm/b", "Usage", "USD"]
            ]),
            Some(next_link),
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/next/page-2"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too many requests"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/next/page-2"))
        .and(body_partial_json(json!({"type": "ActualCost"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_page(
            json!([[2.0, 20_240_102, "/vm/a", "Usage", "USD"]]),
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (retriever, sleeper) = retriever(azure(&server));
    let result = retriever
        .retrieve_scope(&Scope::new("sub-1"), &range(), RetrievalStrategy::Paginated)
        .await
        .unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result.records[0].get("Cost"), Some(&json!(1.25)));
    assert_eq!(result.records[1].get("ResourceId"), Some(&json!("/vm/b")));
    assert_eq!(result.records[2].get("UsageDate"), Some(&json!(20_240_102)));
    assert_eq!(
        result.records[0].columns().collect::<Vec<_>>(),
        vec!["Cost", "UsageDate", "ResourceId", "ChargeType", "Currency"]
    );
    assert_eq!(sleeper.delays(), vec![Duration::from_secs(10)]);
}

#[tokio::test]
async fn empty_subscription_costs_are_no_data_for_that_scope_only() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_subscriptions(&server, &["sub-1", "sub-2"]).await;

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_page(
            json!([[1.0, 20_240_101, "/vm/a", "Usage", "USD"]]),
            None,
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(
            "/subscriptions/sub-2/providers/Microsoft.CostManagement/query",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_page(json!([]), None)))
        .mount(&server)
        .await;

    let (retriever, _) = retriever(azure(&server));
    let report = retriever
        .retrieve_all(&range(), RetrievalStrategy::Paginated)
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].as_ref().unwrap().len(), 1);
    let failure = report.outcomes[1].as_ref().unwrap_err();
    assert_eq!(failure.scope, Scope::new("sub-2"));
    assert!(matches!(failure.kind(), CostProviderError::NoData { .. }));
}

// =============================================================================
// Cost details report
// =============================================================================

#[tokio::test]
async fn cost_details_report_polls_and_downloads_blobs() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    let operation = format!("{}/operations/op-1", server.uri());
    Mock::given(method("POST"))
        .and(path(REPORT_PATH))
        .and(query_param("api-version", "2022-05-01"))
        .and(body_partial_json(json!({
            "metric": "ActualCost",
            "timePeriod": {"start": "2024-01-01", "end": "2024-01-07"}
        })))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Location", operation.as_str())
                .insert_header("Retry-After", "2"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/operations/op-1"))
        .and(header("authorization", "Bearer token-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "op-1",
            "status": "Completed",
            "manifest": {
                "blobCount": 2,
                "blobs": [
                    {"blobLink": format!("{}/blobs/part-1.csv", server.uri()), "byteCount": 64},
                    {"blobLink": format!("{}/blobs/part-2.csv", server.uri()), "byteCount": 32}
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/blobs/part-1.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "\u{feff}date,meterName,costInBillingCurrency\n01/01/2024,\"Storage, Hot\",0.12\n01/02/2024,Compute,1.5\n",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blobs/part-2.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "date,meterName,costInBillingCurrency\n01/03/2024,Compute,2.0\n",
        ))
        .mount(&server)
        .await;

    let (retriever, sleeper) = retriever(azure(&server));
    let result = retriever
        .retrieve_scope(&Scope::new("sub-1"), &range(), RetrievalStrategy::Report)
        .await
        .unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result.records[0].get("meterName"), Some(&json!("Storage, Hot")));
    assert_eq!(result.records[2].get("date"), Some(&json!("01/03/2024")));
    assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);

    let requests = server.received_requests().await.unwrap();
    let blob_requests: Vec<_> = requests
        .iter()
        .filter(|r| r.url.path().starts_with("/blobs/"))
        .collect();
    assert_eq!(blob_requests.len(), 2);
    assert!(blob_requests
        .iter()
        .all(|r| r.headers.get("authorization").is_none()));
}

#[tokio::test]
async fn missing_blob_fails_the_whole_report() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path(REPORT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Completed",
            "manifest": {
                "blobCount": 2,
                "blobs": [
                    {"blobLink": format!("{}/blobs/part-1.csv", server.uri())},
                    {"blobLink": format!("{}/blobs/part-2.csv", server.uri())}
                ]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blobs/part-1.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blobs/part-2.csv"))
        .respond_with(ResponseTemplate::new(403).set_body_string("AuthenticationFailed"))
        .mount(&server)
        .await;

    let (retriever, _) = retriever(azure(&server));
    let err = retriever
        .retrieve_scope(&Scope::new("sub-1"), &range(), RetrievalStrategy::Report)
        .await
        .unwrap_err();

    match err.kind() {
        CostProviderError::ArtifactFetch {
            link,
            status,
            message,
        } => {
            assert!(link.ends_with("/blobs/part-2.csv"));
            assert_eq!(*status, 403);
            assert_eq!(message, "AuthenticationFailed");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn report_not_found_is_unsupported_scope() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path(REPORT_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": "NotFound", "message": "Offer type not supported"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (retriever, sleeper) = retriever(azure(&server));
    let err = retriever
        .retrieve_scope(&Scope::new("sub-1"), &range(), RetrievalStrategy::Report)
        .await
        .unwrap_err();

    match err.kind() {
        CostProviderError::UnsupportedScope {
            scope,
            status,
            message,
        } => {
            assert_eq!(scope, &Scope::new("sub-1"));
            assert_eq!(*status, 404);
            assert_eq!(message, "Offer type not supported");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn throttled_poll_keeps_polling_the_same_operation() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    let operation = format!("{}/operations/op-7", server.uri());
    Mock::given(method("POST"))
        .and(path(REPORT_PATH))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Location", operation.as_str())
                .insert_header("Retry-After", "2"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/operations/op-7"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Completed",
            "manifest": {
                "blobCount": 1,
                "blobs": [{"blobLink": format!("{}/blobs/only.csv", server.uri())}]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blobs/only.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2\n"))
        .mount(&server)
        .await;

    let (retriever, sleeper) = retriever(azure(&server));
    let result = retriever
        .retrieve_scope(&Scope::new("sub-1"), &range(), RetrievalStrategy::Report)
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(2), Duration::from_secs(3)]
    );
}

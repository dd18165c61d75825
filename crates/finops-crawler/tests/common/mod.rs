//! Scripted provider and recording sleeper shared by the engine tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use finops_crawler::engine::{Pause, Sleeper};
use finops_crawler::normalize::RawRows;
use finops_crawler::providers::{CostPage, ReportManifest, ReportResponse, ReportStatus};
use finops_crawler::{
    CapabilitySet, CostProvider, CostProviderError, CostRetriever, DateRange, EngineConfig,
    PageCursor, Scope,
};

// =============================================================================
// Sleepers
// =============================================================================

/// Records every requested delay and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Never wakes up; only cancellation ends the wait.
pub struct StuckSleeper;

#[async_trait]
impl Sleeper for StuckSleeper {
    async fn sleep(&self, _duration: Duration) {
        std::future::pending::<()>().await;
    }
}

// =============================================================================
// Scripted provider
// =============================================================================

type Script<T> = Mutex<VecDeque<Result<T, CostProviderError>>>;

/// Provider whose every answer is queued up front.
pub struct ScriptedProvider {
    pub capabilities: CapabilitySet,
    pub scopes: Mutex<Option<Result<Vec<Scope>, CostProviderError>>>,
    pub scope_errors: Mutex<VecDeque<CostProviderError>>,
    pub auth_error: Mutex<Option<CostProviderError>>,
    pub pages: Mutex<HashMap<String, VecDeque<Result<CostPage, CostProviderError>>>>,
    pub submissions: Script<ReportResponse>,
    pub polls: Script<ReportResponse>,
    pub blobs: Mutex<HashMap<String, Result<String, u16>>>,

    pub auth_calls: AtomicUsize,
    pub list_scope_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub cursors: Mutex<Vec<Option<PageCursor>>>,
    pub poll_locations: Mutex<Vec<String>>,
    pub downloads: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self {
            capabilities,
            scopes: Mutex::new(None),
            scope_errors: Mutex::new(VecDeque::new()),
            auth_error: Mutex::new(None),
            pages: Mutex::new(HashMap::new()),
            submissions: Mutex::new(VecDeque::new()),
            polls: Mutex::new(VecDeque::new()),
            blobs: Mutex::new(HashMap::new()),
            auth_calls: AtomicUsize::new(0),
            list_scope_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            cursors: Mutex::new(Vec::new()),
            poll_locations: Mutex::new(Vec::new()),
            downloads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_scopes(self, scopes: &[&str]) -> Self {
        *self.scopes.lock().unwrap() = Some(Ok(scopes.iter().map(|s| Scope::new(*s)).collect()));
        self
    }

    /// Fail the next scope listing with `err` before the scripted scopes apply.
    pub fn push_scope_error(&self, err: CostProviderError) {
        self.scope_errors.lock().unwrap().push_back(err);
    }

    pub fn push_page(&self, scope: &str, page: Result<CostPage, CostProviderError>) {
        self.pages
            .lock()
            .unwrap()
            .entry(scope.to_string())
            .or_default()
            .push_back(page);
    }

    pub fn push_submission(&self, response: Result<ReportResponse, CostProviderError>) {
        self.submissions.lock().unwrap().push_back(response);
    }

    pub fn push_poll(&self, response: Result<ReportResponse, CostProviderError>) {
        self.polls.lock().unwrap().push_back(response);
    }

    pub fn set_blob(&self, link: &str, body: Result<&str, u16>) {
        self.blobs
            .lock()
            .unwrap()
            .insert(link.to_string(), body.map(ToString::to_string));
    }

    pub fn cursors(&self) -> Vec<Option<PageCursor>> {
        self.cursors.lock().unwrap().clone()
    }

    pub fn poll_locations(&self) -> Vec<String> {
        self.poll_locations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CostProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    async fn authenticate(&self) -> Result<(), CostProviderError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        match self.auth_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn list_scopes(&self) -> Result<Vec<Scope>, CostProviderError> {
        self.list_scope_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.scope_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.scopes
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_cost_page(
        &self,
        scope: &Scope,
        _range: &DateRange,
        cursor: Option<&PageCursor>,
    ) -> Result<CostPage, CostProviderError> {
        self.cursors.lock().unwrap().push(cursor.cloned());
        self.pages
            .lock()
            .unwrap()
            .get_mut(scope.as_str())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(CostProviderError::Protocol("page script exhausted".into())))
    }

    async fn submit_report(
        &self,
        _scope: &Scope,
        _range: &DateRange,
    ) -> Result<ReportResponse, CostProviderError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submissions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CostProviderError::Protocol("submit script exhausted".into())))
    }

    async fn poll_report(&self, location: &str) -> Result<ReportResponse, CostProviderError> {
        self.poll_locations.lock().unwrap().push(location.to_string());
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CostProviderError::Protocol("poll script exhausted".into())))
    }

    async fn download_artifact(&self, link: &str) -> Result<String, CostProviderError> {
        self.downloads.lock().unwrap().push(link.to_string());
        match self.blobs.lock().unwrap().get(link) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(CostProviderError::ArtifactFetch {
                link: link.to_string(),
                status: *status,
                message: "blob unavailable".to_string(),
            }),
            None => Err(CostProviderError::ArtifactFetch {
                link: link.to_string(),
                status: 404,
                message: "unknown blob".to_string(),
            }),
        }
    }
}

// =============================================================================
// Builders
// =============================================================================

/// A columnar page of `n` rows, `{"cost": first + i, "date": "2024-01-01"}`.
pub fn page(first: u32, n: u32, next: Option<PageCursor>) -> CostPage {
    CostPage {
        rows: RawRows::Columnar {
            columns: vec!["cost".to_string(), "date".to_string()],
            rows: (first..first + n).map(|i| vec![json!(i), json!("2024-01-01")]).collect(),
        },
        next,
    }
}

pub fn token(value: &str) -> Option<PageCursor> {
    Some(PageCursor::Token(value.to_string()))
}

pub fn link(value: &str) -> Option<PageCursor> {
    Some(PageCursor::Url(value.to_string()))
}

pub fn accepted(retry_after_secs: Option<u64>, location: Option<&str>) -> ReportResponse {
    ReportResponse {
        status: ReportStatus::Accepted,
        retry_after: retry_after_secs.map(Duration::from_secs),
        location: location.map(ToString::to_string),
    }
}

pub fn completed(blobs: &[&str]) -> ReportResponse {
    ReportResponse {
        status: ReportStatus::Completed(ReportManifest {
            blob_count: blobs.len(),
            blobs: blobs.iter().map(ToString::to_string).collect(),
        }),
        retry_after: None,
        location: None,
    }
}

pub fn range() -> DateRange {
    DateRange::parse("2024-01-01", "2024-01-08").unwrap()
}

/// Retriever over `provider` with a recording sleeper.
pub fn retriever(
    provider: Arc<ScriptedProvider>,
    config: EngineConfig,
) -> (CostRetriever, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let pause = Pause::new(sleeper.clone(), CancellationToken::new());
    (CostRetriever::with_pause(provider, config, pause), sleeper)
}

/// Costs from a result, as integers.
pub fn costs(records: &[finops_crawler::CostRecord]) -> Vec<u64> {
    records
        .iter()
        .filter_map(|r| r.get("cost").and_then(serde_json::Value::as_u64))
        .collect()
}

#![allow(clippy::doc_markdown)] // Allow brand names like OpenAI, Azure without backticks

//! Historical cost retrieval from cloud and SaaS billing APIs.
//!
//! This crate drives billing APIs to completion and returns their rows as
//! ordered [`CostRecord`]s:
//!
//! - **AWS** - Cost Explorer, token pagination, one scope per linked account
//! - **Azure** - Cost Management query (`nextLink` pagination) and the
//!   asynchronous cost details report, one scope per subscription
//! - **OpenAI** - Organization Costs API, token pagination, no scopes
//!
//! ## Features
//!
//! - One engine for three retrieval shapes: token-paged, URL-paged and
//!   submit/poll/download
//! - Rate limits are retried transparently with a fixed delay
//! - Cancellable backoffs and per-scope failure isolation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use finops_crawler::credentials::EnvCredentialsResolver;
//! use finops_crawler::providers::build_provider;
//! use finops_crawler::{CostRetriever, DateRange, EngineConfig, RetrievalStrategy};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = EnvCredentialsResolver::from_env()?;
//!     let provider = build_provider("azure", &resolver)?;
//!     let retriever = CostRetriever::new(provider, EngineConfig::from_env()?);
//!
//!     let range = DateRange::parse("2024-01-01", "2024-01-31")?;
//!     let report = retriever
//!         .retrieve_all(&range, RetrievalStrategy::Paginated)
//!         .await?;
//!
//!     for result in report.successes() {
//!         println!("{}: {} rows", result.scope, result.len());
//!     }
//!     for failure in report.failures() {
//!         eprintln!("{failure}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod http;
pub mod normalize;
pub mod providers;
pub mod range;
pub mod telemetry;

pub use config::EngineConfig;
pub use engine::{CostRetriever, ResultSet, RetrievalReport};
pub use error::{CostProviderError, ScopeError};
pub use normalize::CostRecord;
pub use providers::{CapabilitySet, CostProvider, PageCursor, RetrievalStrategy};
pub use range::{DateInput, DateRange, Scope};

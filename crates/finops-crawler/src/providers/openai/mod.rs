//! OpenAI organization Costs API client.
//!
//! Daily spend buckets grouped by project and line item, paginated with an
//! opaque `next_page` token.
//!
//! ## Authentication
//!
//! Requires an Admin API key (obtained from OpenAI organization settings)
//! and the organization id.
//!
//! ## Example
//!
//! ```rust,ignore
//! use finops_crawler::providers::OpenAiCostProvider;
//!
//! let provider = OpenAiCostProvider::new("org-xxx", "sk-admin-xxx")?;
//! ```

mod client;
mod models;

pub use client::{OpenAiCostProvider, ADMIN_KEY_FIELD, COLUMNS, ORG_ID_FIELD};
pub use models::*;

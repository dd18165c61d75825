//! Azure Cost Management provider.
//!
//! Authenticates a service principal with the OAuth2 client-credentials
//! flow, lists subscriptions, and retrieves costs through the `query` API
//! (`nextLink` pagination) or the cost details report (202 polling plus CSV
//! blobs).

mod client;
mod models;

pub use client::{Azure, CLIENT_ID_FIELD, CLIENT_SECRET_FIELD, TENANT_ID_FIELD};
pub use models::*;

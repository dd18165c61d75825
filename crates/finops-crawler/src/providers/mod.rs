//! Billing API provider implementations.
//!
//! This module provides integrations with:
//!
//! - AWS - Cost Explorer, Organizations, STS
//! - Azure - Cost Management query and cost details report
//! - OpenAI - Organization Costs API

pub mod aws;
pub mod azure;
pub mod openai;
mod traits;

use std::sync::Arc;

pub use aws::Aws;
pub use azure::Azure;
pub use openai::OpenAiCostProvider;
pub use traits::{
    CapabilitySet, CostPage, CostProvider, PageCursor, ReportManifest, ReportResponse,
    ReportStatus, RetrievalStrategy,
};

use crate::credentials::CredentialsResolver;
use crate::CostProviderError;

/// Provider names accepted by [`build_provider`].
pub const PROVIDER_NAMES: [&str; 3] = ["aws", "azure", "openai"];

/// Build a provider by name, resolving its credentials first.
///
/// # Errors
///
/// Returns [`CostProviderError::UnknownPlatform`] for an unknown name, or the
/// resolver's error when credentials are incomplete.
pub fn build_provider(
    name: &str,
    resolver: &dyn CredentialsResolver,
) -> Result<Arc<dyn CostProvider>, CostProviderError> {
    if !PROVIDER_NAMES.contains(&name) {
        return Err(CostProviderError::UnknownPlatform(name.to_string()));
    }

    let credentials = resolver.resolve(name)?;
    let provider: Arc<dyn CostProvider> = match name {
        "aws" => Arc::new(Aws::from_credentials(&credentials)?),
        "azure" => Arc::new(Azure::from_credentials(&credentials)?),
        _ => Arc::new(OpenAiCostProvider::from_credentials(&credentials)?),
    };
    Ok(provider)
}

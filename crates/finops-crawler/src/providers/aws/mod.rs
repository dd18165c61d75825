//! AWS Cost Explorer provider.
//!
//! Lists linked accounts through Organizations (falling back to the STS
//! caller account outside an organization) and pages through
//! `GetCostAndUsage` with `NextPageToken`.

mod client;
mod models;
pub mod sigv4;

pub use client::{
    Aws, AwsEndpoints, ACCESS_KEY_ID_FIELD, COLUMNS, SECRET_ACCESS_KEY_FIELD, SESSION_TOKEN_FIELD,
};
pub use models::*;

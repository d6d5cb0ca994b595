//! Provider API interaction module
//!
//! This module provides the pieces used to talk to the cloud provider:
//! authentication, the HTTP transport, the [`ApiClient`] seam the engine calls
//! through, and error classification.
//!
//! # Module Structure
//!
//! - [`auth`] - Bearer token resolution and caching
//! - [`client`] - [`ApiClient`] trait and the HTTP gateway client
//! - [`http`] - HTTP utilities for JSON API calls
//! - [`error`] - Provider error type and the ignorable-error predicate
//!
//! # Example
//!
//! ```ignore
//! use cloudinv::provider::{ApiClient, Credentials, ProviderClient};
//!
//! async fn example(scope: &cloudinv::engine::Scope) -> anyhow::Result<()> {
//!     let client = ProviderClient::new("http://localhost:4566", Credentials::anonymous(), timeout)?;
//!     let trails = client.call(scope, "cloudtrail", "DescribeTrails", serde_json::json!({})).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod http;

pub use auth::Credentials;
pub use client::{ApiClient, ProviderClient};
pub use error::{
    find_api_error, ignore_access_denied_service_disabled, ApiError, ErrorClass, FetchCancelled,
};
pub use http::format_api_error;

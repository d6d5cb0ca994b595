//! Provider Client
//!
//! The [`ApiClient`] seam the engine calls through, and the HTTP gateway
//! implementation used by the CLI.

use super::auth::Credentials;
use super::error::find_api_error;
use super::http::HttpClient;
use crate::engine::Scope;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Header carrying the scope's account id
pub const ACCOUNT_HEADER: &str = "x-account-id";
/// Header carrying the scope's region
pub const REGION_HEADER: &str = "x-region";

/// Remote API used by fetch functions and post-resource resolvers.
///
/// One call shape covers both list operations (the response carries a page of
/// items plus an optional continuation token) and detail operations (the
/// response is a single record). Implementations must be safe to share across
/// concurrently running scopes.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn call(
        &self,
        scope: &Scope,
        service: &str,
        operation: &str,
        input: Value,
    ) -> Result<Value>;
}

/// Client for a provider gateway speaking JSON over HTTP.
///
/// Each operation is a `POST {endpoint}/{service}/{operation}` with the JSON
/// input as body; the scope travels in headers.
#[derive(Clone)]
pub struct ProviderClient {
    pub credentials: Credentials,
    pub http: HttpClient,
    endpoint: Url,
}

impl ProviderClient {
    /// Create a new provider client
    pub fn new(endpoint: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid provider endpoint: {}", endpoint))?;
        let http = HttpClient::new(timeout)?;

        Ok(Self {
            credentials,
            http,
            endpoint,
        })
    }

    /// Build the URL of one operation
    pub fn operation_url(&self, service: &str, operation: &str) -> Result<Url> {
        let url = format!(
            "{}/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            urlencoding::encode(service),
            urlencoding::encode(operation)
        );
        Url::parse(&url).with_context(|| format!("Invalid operation URL: {}", url))
    }
}

#[async_trait]
impl ApiClient for ProviderClient {
    async fn call(
        &self,
        scope: &Scope,
        service: &str,
        operation: &str,
        input: Value,
    ) -> Result<Value> {
        let url = self.operation_url(service, operation)?;

        let mut headers = Vec::with_capacity(2);
        if let Some(account) = scope.account_id.as_deref() {
            headers.push((ACCOUNT_HEADER, account));
        }
        if let Some(region) = scope.region.as_deref() {
            headers.push((REGION_HEADER, region));
        }

        let token = self.credentials.get_token().await?;
        let result = self
            .http
            .post(&url, token.as_deref(), &headers, &input)
            .await;

        // A rotated token file answers 401 until the cache is dropped
        let result = match result {
            Err(e) if self.credentials.is_refreshable() && is_unauthorized(&e) => {
                tracing::debug!("{}.{} unauthorized, refreshing token", service, operation);
                self.credentials.refresh_token().await;
                let token = self.credentials.get_token().await?;
                self.http
                    .post(&url, token.as_deref(), &headers, &input)
                    .await
            }
            other => other,
        };

        result.with_context(|| format!("{}.{} [{}]", service, operation, scope))
    }
}

fn is_unauthorized(error: &anyhow::Error) -> bool {
    find_api_error(error).is_some_and(|e| e.status == 401)
}

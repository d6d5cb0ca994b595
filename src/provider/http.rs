//! HTTP utilities for provider API calls

use super::error::{find_api_error, ApiError};
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for provider API calls
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cloudinv/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// POST a JSON document and parse the JSON response.
    ///
    /// Non-success statuses become an [`ApiError`] carrying the provider's
    /// error code, so callers can classify them.
    pub async fn post(
        &self,
        url: &Url,
        token: Option<&str>,
        headers: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value> {
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url.clone()).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            // Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(ApiError::from_response(status.as_u16(), &response_body).into());
        }

        if response_body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response_body).context("Failed to parse response JSON")
    }
}

/// Format an API error for display
/// Maps status classes to short messages without exposing response bodies
pub fn format_api_error(error: &anyhow::Error) -> String {
    if let Some(api) = find_api_error(error) {
        if api.is_access_denied_service_disabled() {
            return format!("Access denied or service disabled ({}).", api.code);
        }
        return match api.status {
            401 => "Authentication failed. Check the API token.".to_string(),
            403 => "Permission denied. Check the account's IAM permissions.".to_string(),
            404 => "Resource not found.".to_string(),
            409 => "Resource conflict.".to_string(),
            429 => "Rate limit exceeded. Please try again later.".to_string(),
            400 => format!("Invalid request ({}).", api.code),
            500..=599 => "Provider service temporarily unavailable. Please try again.".to_string(),
            _ => format!("Request failed ({}).", api.code),
        };
    }

    let error_str = format!("{:#}", error);
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(80)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

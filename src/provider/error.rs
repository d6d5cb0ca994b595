//! Provider API errors and their classification.

use serde_json::Value;
use std::fmt;

/// Error codes the provider returns when a service is disabled, not opted
/// into, or not permitted for the calling account in a region.
const ACCESS_DENIED_SERVICE_DISABLED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "AuthorizationError",
    "AWSOrganizationsNotInUseException",
    "InsufficientPrivilegesException",
    "InvalidClientTokenId",
    "OptInRequired",
    "SubscriptionRequiredException",
    "UnauthorizedOperation",
    "UnrecognizedClientException",
];

/// Error returned by the remote API for a non-success response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("API error {status}: {code}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build an error from a response status and body.
    ///
    /// Understands the JSON error envelopes the provider uses:
    /// `{"__type": "...", "message": "..."}`, `{"code": "...", "Message": "..."}`
    /// and `{"Error": {"Code": "...", "Message": "..."}}`. The `__type` value may
    /// carry a namespace prefix (`com.amazon#AccessDeniedException`) which is
    /// stripped.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let envelope = parsed
            .as_ref()
            .map(|v| v.get("Error").unwrap_or(v));

        let code = envelope
            .and_then(|e| {
                ["__type", "code", "Code"]
                    .iter()
                    .find_map(|key| e.get(*key).and_then(|v| v.as_str()))
            })
            .map(|c| c.rsplit('#').next().unwrap_or(c).to_string())
            .unwrap_or_else(|| default_code(status).to_string());

        let message = envelope
            .and_then(|e| {
                ["message", "Message"]
                    .iter()
                    .find_map(|key| e.get(*key).and_then(|v| v.as_str()))
            })
            .unwrap_or_default()
            .to_string();

        Self::new(status, code, message)
    }

    /// Whether this error means the service is disabled or not available for
    /// the calling scope.
    pub fn is_access_denied_service_disabled(&self) -> bool {
        ACCESS_DENIED_SERVICE_DISABLED_CODES.contains(&self.code.as_str())
    }
}

fn default_code(status: u16) -> &'static str {
    match status {
        400 => "BadRequest",
        401 => "Unauthorized",
        403 => "AccessDenied",
        404 => "NotFound",
        409 => "Conflict",
        429 => "Throttling",
        500..=599 => "ServiceUnavailable",
        _ => "Unknown",
    }
}

/// Raised when the shared cancellation token fires while a fetch is waiting on
/// the API or on the delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("fetch cancelled")]
pub struct FetchCancelled;

/// Find the [`ApiError`] inside an error chain, if any.
pub fn find_api_error(error: &anyhow::Error) -> Option<&ApiError> {
    error.chain().find_map(|e| e.downcast_ref::<ApiError>())
}

/// Whether an error chain contains a [`FetchCancelled`].
pub fn is_cancelled(error: &anyhow::Error) -> bool {
    error.chain().any(|e| e.is::<FetchCancelled>())
}

/// Error-ignore predicate for tables whose service may be disabled or not
/// permitted in some accounts or regions.
pub fn ignore_access_denied_service_disabled(error: &anyhow::Error) -> bool {
    find_api_error(error).is_some_and(ApiError::is_access_denied_service_disabled)
}

/// How a fetch error is treated by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Converted to an empty, successful result.
    Ignorable,
    /// Aborts the fetch and is reported.
    Fatal,
    /// The run is shutting down.
    Cancelled,
}

impl ErrorClass {
    /// Classify an error against an optional table predicate.
    ///
    /// Cancellation always wins; without a predicate every other error is
    /// fatal.
    pub fn of(error: &anyhow::Error, ignore: Option<fn(&anyhow::Error) -> bool>) -> Self {
        if is_cancelled(error) {
            return ErrorClass::Cancelled;
        }
        match ignore {
            Some(predicate) if predicate(error) => ErrorClass::Ignorable,
            _ => ErrorClass::Fatal,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorClass::Ignorable => "ignorable",
            ErrorClass::Fatal => "fatal",
            ErrorClass::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

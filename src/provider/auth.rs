//! Provider authentication
//!
//! Resolves the bearer token sent to the provider gateway, either from the
//! `CLOUDINV_API_TOKEN` environment variable or from a token file that may be
//! rotated while a run is in progress.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Environment variable holding a static API token
pub const TOKEN_ENV_VAR: &str = "CLOUDINV_API_TOKEN";

/// How long a token read from a file is reused before the file is read again
const TOKEN_FILE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
enum TokenSource {
    Anonymous,
    Static(String),
    File(PathBuf),
}

/// Provider credentials with token caching
#[derive(Debug, Clone)]
pub struct Credentials {
    source: TokenSource,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    /// When this token should be re-read from its source
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl Credentials {
    /// No token; requests are sent unauthenticated
    pub fn anonymous() -> Self {
        Self::with_source(TokenSource::Anonymous)
    }

    /// A fixed token
    pub fn from_token(token: impl Into<String>) -> Self {
        Self::with_source(TokenSource::Static(token.into()))
    }

    /// A token read from a file, re-read every few minutes
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::with_source(TokenSource::File(path.into()))
    }

    /// Resolve credentials: environment variable first, then token file,
    /// otherwise anonymous.
    pub fn resolve(token_file: Option<&Path>) -> Self {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                return Self::from_token(token.trim());
            }
        }
        match token_file {
            Some(path) => Self::from_file(path),
            None => Self::anonymous(),
        }
    }

    fn with_source(source: TokenSource) -> Self {
        Self {
            source,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the bearer token for API calls, if any
    pub async fn get_token(&self) -> Result<Option<String>> {
        let path = match &self.source {
            TokenSource::Anonymous => return Ok(None),
            TokenSource::Static(token) => return Ok(Some(token.clone())),
            TokenSource::File(path) => path,
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(Some(cached.token.clone()));
                }
                tracing::debug!("Cached token expired, re-reading {:?}", path);
            }
        }

        let token = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read token file {:?}", path))?
            .trim()
            .to_string();

        if token.is_empty() {
            return Err(anyhow::anyhow!("Token file {:?} is empty", path));
        }

        let mut cache = self.token_cache.write().await;
        *cache = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + TOKEN_FILE_TTL,
        });

        Ok(Some(token))
    }

    /// Whether the token can change between reads
    pub fn is_refreshable(&self) -> bool {
        matches!(self.source, TokenSource::File(_))
    }

    /// Drop any cached token so the next call reads the source again
    pub async fn refresh_token(&self) {
        let mut cache = self.token_cache.write().await;
        *cache = None;
    }
}

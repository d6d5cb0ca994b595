//! Configuration Management
//!
//! Loads the run configuration for cloudinv: provider endpoint, accounts and
//! their regions, and engine tunables. JSON by default; `.yaml`/`.yml` files
//! are read as YAML.

use crate::engine::{AccountRegions, ExecSettings, RetryPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:4566";

/// An account to sync
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountConfig {
    pub id: String,
    /// Regions enabled for this account; the default regions when absent
    #[serde(default)]
    pub regions: Option<Vec<String>>,
}

/// Fetch tunables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    pub channel_capacity: usize,
    pub max_concurrency: usize,
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
            max_concurrency: 8,
            request_timeout_secs: 30,
        }
    }
}

/// Retry tunables for ignorable fetch errors
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 500,
        }
    }
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Provider gateway base URL
    #[serde(default)]
    pub endpoint: Option<String>,
    /// File holding the bearer token
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// Regions used by accounts that list none
    #[serde(default)]
    pub default_regions: Vec<String>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloudinv").join("config.json"))
    }

    /// Load from `path`, or from the default location. A missing file gives
    /// the defaults; an unreadable or malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        Self::parse(&content, &path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

        if is_yaml {
            serde_yaml::from_str(content)
                .with_context(|| format!("Failed to parse YAML config {:?}", path))
        } else {
            serde_json::from_str(content)
                .with_context(|| format!("Failed to parse JSON config {:?}", path))
        }
    }

    /// Get effective endpoint (CLI > config > default)
    pub fn effective_endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    /// Restrict to the given accounts and regions (CLI overrides).
    ///
    /// Accounts named on the command line but absent from the file are added
    /// with the default regions. A region override replaces every account's
    /// region list.
    pub fn apply_overrides(&mut self, accounts: &[String], regions: &[String]) {
        if !accounts.is_empty() {
            let mut selected = Vec::with_capacity(accounts.len());
            for id in accounts {
                let existing = self.accounts.iter().find(|a| &a.id == id).cloned();
                selected.push(existing.unwrap_or(AccountConfig {
                    id: id.clone(),
                    regions: None,
                }));
            }
            self.accounts = selected;
        }

        if !regions.is_empty() {
            self.default_regions = regions.to_vec();
            for account in &mut self.accounts {
                account.regions = None;
            }
        }
    }

    /// Accounts with their effective regions, duplicates collapsed
    pub fn account_regions(&self) -> Vec<AccountRegions> {
        self.accounts
            .iter()
            .map(|account| {
                let regions = account.regions.as_ref().unwrap_or(&self.default_regions);
                let mut unique: Vec<String> = Vec::with_capacity(regions.len());
                for region in regions {
                    if !unique.contains(region) {
                        unique.push(region.clone());
                    }
                }
                AccountRegions::new(account.id.clone(), unique)
            })
            .collect()
    }

    pub fn exec_settings(&self) -> ExecSettings {
        ExecSettings {
            channel_capacity: self.fetch.channel_capacity.max(1),
            max_concurrency: self.fetch.max_concurrency.max(1),
            retry: RetryPolicy {
                max_retries: self.retry.max_retries,
                initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.request_timeout_secs)
    }
}

//! Scopes and the multiplexers that expand a table fetch across them.

use serde::Serialize;
use std::fmt;

/// One multiplexed execution unit.
///
/// Immutable once built; passed to a table's fetch function, its resolvers,
/// and every nested relation fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Scope {
    pub account_id: Option<String>,
    pub region: Option<String>,
}

impl Scope {
    pub fn account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            region: None,
        }
    }

    pub fn account_region(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            region: Some(region.into()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.account_id, &self.region) {
            (Some(account), Some(region)) => write!(f, "{}/{}", account, region),
            (Some(account), None) => write!(f, "{}", account),
            (None, Some(region)) => write!(f, "*/{}", region),
            (None, None) => write!(f, "default"),
        }
    }
}

/// An account and the regions enabled for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRegions {
    pub account_id: String,
    pub regions: Vec<String>,
}

impl AccountRegions {
    pub fn new(account_id: impl Into<String>, regions: Vec<String>) -> Self {
        Self {
            account_id: account_id.into(),
            regions,
        }
    }
}

/// Policy expanding one table fetch into scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplexer {
    /// One scope per account
    Account,
    /// One scope per (account, enabled region)
    AccountRegion,
}

impl Multiplexer {
    pub fn scopes(&self, accounts: &[AccountRegions]) -> Vec<Scope> {
        match self {
            Multiplexer::Account => accounts
                .iter()
                .map(|a| Scope::account(a.account_id.clone()))
                .collect(),
            Multiplexer::AccountRegion => accounts
                .iter()
                .flat_map(|a| {
                    a.regions
                        .iter()
                        .map(move |region| Scope::account_region(a.account_id.clone(), region.clone()))
                })
                .collect(),
        }
    }
}

/// Scopes a table runs under. Without a multiplexer a table runs exactly once
/// under the default scope.
pub fn scopes_for(multiplexer: Option<Multiplexer>, accounts: &[AccountRegions]) -> Vec<Scope> {
    match multiplexer {
        Some(m) => m.scopes(accounts),
        None => vec![Scope::default()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> Vec<AccountRegions> {
        vec![
            AccountRegions::new("111", vec!["us-east-1".into(), "eu-west-1".into()]),
            AccountRegions::new("222", vec!["us-west-2".into()]),
        ]
    }

    #[test]
    fn test_account_multiplexer() {
        let scopes = Multiplexer::Account.scopes(&accounts());
        assert_eq!(scopes, vec![Scope::account("111"), Scope::account("222")]);
    }

    #[test]
    fn test_account_region_multiplexer() {
        let scopes = Multiplexer::AccountRegion.scopes(&accounts());
        assert_eq!(
            scopes,
            vec![
                Scope::account_region("111", "us-east-1"),
                Scope::account_region("111", "eu-west-1"),
                Scope::account_region("222", "us-west-2"),
            ]
        );
    }

    #[test]
    fn test_no_multiplexer_runs_once() {
        assert_eq!(scopes_for(None, &accounts()), vec![Scope::default()]);
        assert_eq!(scopes_for(None, &[]), vec![Scope::default()]);
    }

    #[test]
    fn test_no_accounts_means_no_scopes() {
        assert!(scopes_for(Some(Multiplexer::AccountRegion), &[]).is_empty());
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(Scope::account_region("1", "r").to_string(), "1/r");
        assert_eq!(Scope::default().to_string(), "default");
    }
}

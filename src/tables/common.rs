//! Resolvers and helpers shared by the provider tables.

use crate::engine::{DeleteFilter, Scope};
use crate::schema::{Column, ColumnType, ResolveContext};
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Provider key/value tag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Tag {
    pub key: Option<String>,
    pub value: Option<String>,
}

/// Named setting or statistic (`Name`/`Value` pairs)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KeyValuePair {
    pub name: Option<String>,
    pub value: Option<String>,
}

/// Resolve the scope's account id
pub fn resolve_account<T>(ctx: &ResolveContext<'_>, _: &T) -> Result<Value> {
    Ok(ctx
        .scope
        .account_id
        .clone()
        .map(Value::String)
        .unwrap_or(Value::Null))
}

/// Resolve the scope's region
pub fn resolve_region<T>(ctx: &ResolveContext<'_>, _: &T) -> Result<Value> {
    Ok(ctx
        .scope
        .region
        .clone()
        .map(Value::String)
        .unwrap_or(Value::Null))
}

/// `account_id` and `region` columns every top-level table starts with
pub fn account_region_columns<T>() -> Vec<Column<T>> {
    vec![
        Column::func("account_id", ColumnType::String, resolve_account),
        Column::func("region", ColumnType::String, resolve_region),
    ]
}

/// Stale rows of a scope are those stored under the same account and region
pub fn delete_account_region_filter(scope: &Scope) -> DeleteFilter {
    let mut filter = DeleteFilter::new();
    if let Some(account) = &scope.account_id {
        filter = filter.with("account_id", account.as_str());
    }
    if let Some(region) = &scope.region {
        filter = filter.with("region", region.as_str());
    }
    filter
}

/// Build a JSON object from key/value pairs, skipping entries without a key.
/// Later duplicates overwrite earlier ones.
pub fn pairs_to_map<'a, I>(pairs: I) -> Value
where
    I: IntoIterator<Item = (Option<&'a str>, Option<&'a str>)>,
{
    let map: Map<String, Value> = pairs
        .into_iter()
        .filter_map(|(key, value)| {
            let value = value.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null);
            key.map(|k| (k.to_string(), value))
        })
        .collect();
    Value::Object(map)
}

pub fn tags_map(tags: &[Tag]) -> Value {
    pairs_to_map(tags.iter().map(|t| (t.key.as_deref(), t.value.as_deref())))
}

pub fn named_values_map(pairs: &[KeyValuePair]) -> Value {
    pairs_to_map(pairs.iter().map(|p| (p.name.as_deref(), p.value.as_deref())))
}

fn log_group_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"arn:[a-zA-Z0-9-]+:logs:[a-z0-9-]+:[0-9]+:log-group:([a-zA-Z0-9-/]+):")
            .expect("log group pattern is valid")
    })
}

/// Extract the log group name from a CloudWatch Logs log group ARN
pub fn log_group_name(arn: &str) -> Option<&str> {
    log_group_regex()
        .captures(arn)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Diagnostics;
    use serde_json::json;

    #[test]
    fn test_log_group_name() {
        let arn = "arn:aws:logs:us-east-1:123456789012:log-group:trail-logs/main:*";
        assert_eq!(log_group_name(arn), Some("trail-logs/main"));
        assert_eq!(log_group_name("arn:aws:s3:::bucket"), None);
        assert_eq!(log_group_name(""), None);
    }

    #[test]
    fn test_tags_map_skips_missing_keys() {
        let tags = vec![
            Tag {
                key: Some("env".into()),
                value: Some("prod".into()),
            },
            Tag {
                key: None,
                value: Some("orphan".into()),
            },
            Tag {
                key: Some("empty".into()),
                value: None,
            },
        ];
        assert_eq!(tags_map(&tags), json!({"env": "prod", "empty": null}));
    }

    #[test]
    fn test_scope_resolvers_and_filter() {
        let scope = Scope::account_region("123", "eu-west-1");
        let diagnostics = Diagnostics::new();
        let ctx = ResolveContext {
            scope: &scope,
            table: "t",
            column: "account_id",
            parent_id: None,
            diagnostics: &diagnostics,
        };
        assert_eq!(resolve_account(&ctx, &()).unwrap(), json!("123"));
        assert_eq!(resolve_region(&ctx, &()).unwrap(), json!("eu-west-1"));

        let filter = delete_account_region_filter(&scope);
        assert_eq!(
            filter.conditions(),
            &[
                ("account_id".to_string(), json!("123")),
                ("region".to_string(), json!("eu-west-1"))
            ]
        );
    }
}

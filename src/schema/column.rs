//! Column declarations and their resolvers.

use super::path::{field_name, resolve_path};
use crate::engine::{Diagnostics, Scope};
use anyhow::Result;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Declared value kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Bool,
    Int,
    BigInt,
    Timestamp,
    StringArray,
    Json,
    Uuid,
}

impl ColumnType {
    /// Whether `value` is a valid instance of this kind. Null always is.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            ColumnType::String => value.is_string(),
            ColumnType::Bool => value.is_boolean(),
            ColumnType::Int => value
                .as_i64()
                .is_some_and(|n| i32::try_from(n).is_ok()),
            ColumnType::BigInt => value.is_i64() || value.is_u64(),
            ColumnType::Timestamp => value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
            ColumnType::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| v.is_string() || v.is_null())),
            ColumnType::Json => value.is_object() || value.is_array(),
            ColumnType::Uuid => value
                .as_str()
                .is_some_and(|s| Uuid::parse_str(s).is_ok()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Bool => "bool",
            ColumnType::Int => "int",
            ColumnType::BigInt => "bigint",
            ColumnType::Timestamp => "timestamp",
            ColumnType::StringArray => "string[]",
            ColumnType::Json => "json",
            ColumnType::Uuid => "uuid",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context handed to custom column resolvers.
pub struct ResolveContext<'a> {
    pub scope: &'a Scope,
    pub table: &'static str,
    pub column: &'static str,
    pub parent_id: Option<Uuid>,
    pub(crate) diagnostics: &'a Diagnostics,
}

impl ResolveContext<'_> {
    /// Record a malformed-data warning for this column. Never fails.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(
            table = self.table,
            column = self.column,
            scope = %self.scope,
            "{}",
            message
        );
        self.diagnostics
            .warn(self.table, self.column, self.scope, message);
    }

    /// Record an informational note for this column.
    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(
            table = self.table,
            column = self.column,
            scope = %self.scope,
            "{}",
            message
        );
        self.diagnostics
            .info(self.table, self.column, self.scope, message);
    }
}

/// Custom resolver with access to the raw item and its context.
pub type ResolverFn<T> = fn(&ResolveContext<'_>, &T) -> Result<Value>;

/// How a column obtains its value.
pub enum ColumnResolver<T> {
    /// Read the same-named field (converted to PascalCase) off the item.
    Field,
    /// Dotted path into the item; missing intermediates give null.
    Path(&'static str),
    /// The synthetic id of the parent row.
    ParentId,
    /// Custom function.
    Func(ResolverFn<T>),
}

impl<T> Clone for ColumnResolver<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ColumnResolver<T> {}

impl<T> fmt::Debug for ColumnResolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnResolver::Field => f.write_str("Field"),
            ColumnResolver::Path(path) => write!(f, "Path({:?})", path),
            ColumnResolver::ParentId => f.write_str("ParentId"),
            ColumnResolver::Func(_) => f.write_str("Func"),
        }
    }
}

/// A column declaration.
#[derive(Debug)]
pub struct Column<T> {
    pub name: &'static str,
    pub kind: ColumnType,
    pub resolver: ColumnResolver<T>,
}

impl<T> Column<T> {
    /// Column read from the same-named field
    pub fn new(name: &'static str, kind: ColumnType) -> Self {
        Self {
            name,
            kind,
            resolver: ColumnResolver::Field,
        }
    }

    /// Column read from a dotted path
    pub fn path(name: &'static str, kind: ColumnType, path: &'static str) -> Self {
        Self {
            name,
            kind,
            resolver: ColumnResolver::Path(path),
        }
    }

    /// Column holding the parent row's id
    pub fn parent_id(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnType::Uuid,
            resolver: ColumnResolver::ParentId,
        }
    }

    /// Column computed by a custom resolver
    pub fn func(name: &'static str, kind: ColumnType, resolver: ResolverFn<T>) -> Self {
        Self {
            name,
            kind,
            resolver: ColumnResolver::Func(resolver),
        }
    }

    /// Compute this column's value for one item.
    ///
    /// `document` is the item's serialized form, used by field and path
    /// resolvers.
    pub fn resolve(&self, ctx: &ResolveContext<'_>, item: &T, document: &Value) -> Result<Value> {
        match self.resolver {
            ColumnResolver::Field => Ok(document
                .get(field_name(self.name))
                .cloned()
                .unwrap_or(Value::Null)),
            ColumnResolver::Path(path) => Ok(resolve_path(document, path)),
            ColumnResolver::ParentId => Ok(ctx
                .parent_id
                .map(|id| Value::String(id.to_string()))
                .unwrap_or(Value::Null)),
            ColumnResolver::Func(resolver) => resolver(ctx, item),
        }
    }
}

/// Name and kind of a column, detached from its resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnType,
}

impl<T> From<&Column<T>> for ColumnDef {
    fn from(column: &Column<T>) -> Self {
        Self {
            name: column.name,
            kind: column.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_accepted_everywhere() {
        for kind in [
            ColumnType::String,
            ColumnType::Bool,
            ColumnType::Int,
            ColumnType::BigInt,
            ColumnType::Timestamp,
            ColumnType::StringArray,
            ColumnType::Json,
            ColumnType::Uuid,
        ] {
            assert!(kind.accepts(&Value::Null), "{} rejects null", kind);
        }
    }

    #[test]
    fn test_kind_checks() {
        assert!(ColumnType::Int.accepts(&json!(42)));
        assert!(!ColumnType::Int.accepts(&json!(i64::MAX)));
        assert!(ColumnType::BigInt.accepts(&json!(i64::MAX)));
        assert!(!ColumnType::Bool.accepts(&json!("true")));
        assert!(ColumnType::Timestamp.accepts(&json!("2024-03-01T12:00:00Z")));
        assert!(!ColumnType::Timestamp.accepts(&json!("yesterday")));
        assert!(ColumnType::StringArray.accepts(&json!(["a", "b"])));
        assert!(!ColumnType::StringArray.accepts(&json!([1, 2])));
        assert!(ColumnType::Json.accepts(&json!({"k": "v"})));
        assert!(!ColumnType::Uuid.accepts(&json!("not-a-uuid")));
    }

    #[test]
    fn test_field_and_path_resolution() {
        let diagnostics = Diagnostics::default();
        let scope = Scope::default();
        let ctx = ResolveContext {
            scope: &scope,
            table: "t",
            column: "c",
            parent_id: None,
            diagnostics: &diagnostics,
        };
        let doc = json!({"VpcId": "vpc-1", "Status": {"Code": "active"}});

        let field = Column::<()>::new("vpc_id", ColumnType::String);
        assert_eq!(field.resolve(&ctx, &(), &doc).unwrap(), json!("vpc-1"));

        let path = Column::<()>::path("status_code", ColumnType::String, "Status.Code");
        assert_eq!(path.resolve(&ctx, &(), &doc).unwrap(), json!("active"));

        let parent = Column::<()>::parent_id("parent_id");
        assert_eq!(parent.resolve(&ctx, &(), &doc).unwrap(), Value::Null);
    }
}

//! Resources being resolved and the rows they turn into.

use super::column::ColumnDef;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Resolution contract violations. Fatal to the resource being resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("table {table} has no column {column}")]
    UnknownColumn {
        table: &'static str,
        column: String,
    },

    #[error("column {table}.{column} expects {expected}, got {found}")]
    TypeMismatch {
        table: &'static str,
        column: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("column {table}.{column} value is not serializable: {reason}")]
    Serialize {
        table: &'static str,
        column: String,
        reason: String,
    },
}

/// One raw item being turned into a row.
///
/// Owned by the execution path processing it. The raw item itself sits
/// behind an `Arc` so child fetches can read it after the row is forwarded.
#[derive(Debug)]
pub struct Resource<T> {
    table: &'static str,
    id: Uuid,
    parent_id: Option<Uuid>,
    item: Arc<T>,
    columns: Arc<[ColumnDef]>,
    values: Map<String, Value>,
}

impl<T> Resource<T> {
    pub(crate) fn new(
        table: &'static str,
        columns: Arc<[ColumnDef]>,
        item: Arc<T>,
        parent_id: Option<Uuid>,
    ) -> Self {
        Self {
            table,
            id: Uuid::new_v4(),
            parent_id,
            item,
            columns,
            values: Map::new(),
        }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Synthetic identifier of the row this resource becomes
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    /// The raw item
    pub fn item(&self) -> &T {
        &self.item
    }

    pub(crate) fn shared_item(&self) -> Arc<T> {
        Arc::clone(&self.item)
    }

    /// Resolved value of a column, if set
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Set a column's value, checking it is declared and of the right kind.
    pub fn set(&mut self, column: &str, value: Value) -> Result<(), ResolveError> {
        let def = self
            .columns
            .iter()
            .find(|c| c.name == column)
            .ok_or_else(|| ResolveError::UnknownColumn {
                table: self.table,
                column: column.to_string(),
            })?;

        if !def.kind.accepts(&value) {
            return Err(ResolveError::TypeMismatch {
                table: self.table,
                column: def.name,
                expected: def.kind.as_str(),
                found: value_kind(&value).to_string(),
            });
        }

        self.values.insert(def.name.to_string(), value);
        Ok(())
    }

    /// Serialize `value` and set it on `column`.
    pub fn set_value<V: Serialize>(&mut self, column: &str, value: V) -> Result<(), ResolveError> {
        let value = serde_json::to_value(value).map_err(|e| ResolveError::Serialize {
            table: self.table,
            column: column.to_string(),
            reason: e.to_string(),
        })?;
        self.set(column, value)
    }

    /// Finish the resource. Columns never set are filled with null so the row
    /// carries exactly the declared column set.
    pub fn into_row(mut self) -> Row {
        let mut values = Map::with_capacity(self.columns.len());
        for def in self.columns.iter() {
            let value = self.values.remove(def.name).unwrap_or(Value::Null);
            values.insert(def.name.to_string(), value);
        }

        Row {
            table: self.table.to_string(),
            id: self.id,
            parent_id: self.parent_id,
            values,
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A finished row handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub table: String,
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub values: Map<String, Value>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Column value as a string slice, if it is a string
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_str())
    }
}

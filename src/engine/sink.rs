//! Storage sinks receiving finished rows.

use crate::schema::Row;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use uuid::Uuid;

/// Equality predicates identifying previously persisted rows of one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeleteFilter {
    conditions: Vec<(String, Value)>,
}

impl DeleteFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `column` to equal `value`
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Whether a row's values satisfy every condition. An empty filter
    /// matches everything.
    pub fn matches(&self, values: &Map<String, Value>) -> bool {
        self.conditions
            .iter()
            .all(|(column, expected)| values.get(column) == Some(expected))
    }
}

/// Destination of finished rows.
///
/// The engine calls [`RowSink::delete_stale`] once per table and scope before
/// that scope's rows are written. Rows arrive parent first.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Purge rows of `table` matching `filter`; returns how many were removed
    async fn delete_stale(&self, table: &str, filter: &DeleteFilter) -> Result<usize>;

    async fn write(&self, row: Row) -> Result<()>;
}

/// Sink keeping rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<Row>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously persisted rows
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub fn rows(&self) -> Vec<Row> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn rows_for(&self, table: &str) -> Vec<Row> {
        self.rows()
            .into_iter()
            .filter(|r| r.table == table)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RowSink for MemorySink {
    /// Removes matching rows and, transitively, their child rows.
    async fn delete_stale(&self, table: &str, filter: &DeleteFilter) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let before = rows.len();

        let mut removed: HashSet<Uuid> = rows
            .iter()
            .filter(|r| r.table == table && filter.matches(&r.values))
            .map(|r| r.id)
            .collect();

        loop {
            let children: Vec<Uuid> = rows
                .iter()
                .filter(|r| !removed.contains(&r.id))
                .filter(|r| r.parent_id.is_some_and(|p| removed.contains(&p)))
                .map(|r| r.id)
                .collect();
            if children.is_empty() {
                break;
            }
            removed.extend(children);
        }

        rows.retain(|r| !removed.contains(&r.id));
        Ok(before - rows.len())
    }

    async fn write(&self, row: Row) -> Result<()> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(row);
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Purge {
        table: &'a str,
        filter: &'a DeleteFilter,
    },
    Row(&'a Row),
}

/// Sink writing one JSON object per line.
///
/// Purges are written as records too; applying them is left to whatever
/// loads the file.
pub struct JsonLinesSink {
    writer: tokio::sync::Mutex<BufWriter<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl JsonLinesSink {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(BufWriter::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }

    /// Create (or truncate) `path`
    pub async fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("Failed to create output file {:?}", path))?;
        Ok(Self::new(Box::new(file)))
    }

    pub async fn flush(&self) -> Result<()> {
        self.writer
            .lock()
            .await
            .flush()
            .await
            .context("Failed to flush output")
    }

    async fn write_record(&self, record: &Record<'_>) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("Failed to encode record")?;
        line.push(b'\n');
        self.writer
            .lock()
            .await
            .write_all(&line)
            .await
            .context("Failed to write record")
    }
}

#[async_trait]
impl RowSink for JsonLinesSink {
    async fn delete_stale(&self, table: &str, filter: &DeleteFilter) -> Result<usize> {
        self.write_record(&Record::Purge { table, filter }).await?;
        Ok(0)
    }

    async fn write(&self, row: Row) -> Result<()> {
        self.write_record(&Record::Row(&row)).await
    }
}

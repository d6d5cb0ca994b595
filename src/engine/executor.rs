//! Table execution
//!
//! Runs one table for one scope: the fetch function produces raw items onto a
//! bounded channel while this side resolves each item into a row, forwards it
//! to the sink and recurses into the table's relations with the item as
//! parent.

use super::diagnostics::Diagnostics;
use super::fetcher::{item_channel, FetchContext};
use super::multiplex::{Multiplexer, Scope};
use super::sink::{DeleteFilter, RowSink};
use crate::provider::error::is_cancelled;
use crate::provider::ErrorClass;
use crate::schema::{Item, Relation, ResolveContext, Resource, Table, TableDef, TableInfo};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Retry policy for fetch errors classified as ignorable.
///
/// A retry only happens when the failed attempt delivered no item, so rows
/// are never produced twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), doubling each time
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

/// Tunables shared by every table execution of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecSettings {
    /// Bound of each fetch's delivery channel
    pub channel_capacity: usize,
    /// Scopes of one table executed at the same time
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
            max_concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything a table execution needs for one scope.
#[derive(Clone)]
pub struct ExecContext {
    pub fetch: FetchContext,
    pub sink: Arc<dyn RowSink>,
    pub diagnostics: Diagnostics,
    pub settings: ExecSettings,
}

impl ExecContext {
    pub fn new(
        fetch: FetchContext,
        sink: Arc<dyn RowSink>,
        diagnostics: Diagnostics,
        settings: ExecSettings,
    ) -> Self {
        Self {
            fetch,
            sink,
            diagnostics,
            settings,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.fetch.scope
    }

    fn is_cancelled(&self) -> bool {
        self.fetch.cancel.is_cancelled()
    }
}

/// Stage at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The fetch function failed; the rest of that fetch is lost
    Fetch,
    /// One resource failed column or post resolution; it and its children
    /// are lost
    Resource,
    /// The sink refused a row or a purge
    Sink,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Fetch => "fetch",
            FailureKind::Resource => "resource",
            FailureKind::Sink => "sink",
        };
        f.write_str(label)
    }
}

/// A reported, non-propagated error.
#[derive(Debug)]
pub struct Failure {
    pub table: &'static str,
    pub scope: Scope,
    pub kind: FailureKind,
    pub error: anyhow::Error,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} error: {:#}",
            self.table, self.scope, self.kind, self.error
        )
    }
}

/// Outcome of executing a table subtree.
#[derive(Debug, Default)]
pub struct ExecReport {
    /// Rows forwarded to the sink, descendants included
    pub rows: usize,
    /// Fetches that ended on an ignorable error
    pub ignored: usize,
    pub failures: Vec<Failure>,
    /// Cancellation was observed
    pub cancelled: bool,
}

impl ExecReport {
    pub fn merge(&mut self, other: ExecReport) {
        self.rows += other.rows;
        self.ignored += other.ignored;
        self.failures.extend(other.failures);
        self.cancelled |= other.cancelled;
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub(crate) fn failure(
        table: &'static str,
        scope: &Scope,
        kind: FailureKind,
        error: anyhow::Error,
    ) -> Self {
        Self {
            failures: vec![Failure {
                table,
                scope: scope.clone(),
                kind,
                error,
            }],
            ..Self::default()
        }
    }

    fn fail(&mut self, table: &'static str, scope: &Scope, kind: FailureKind, error: anyhow::Error) {
        self.failures.push(Failure {
            table,
            scope: scope.clone(),
            kind,
            error,
        });
    }
}

impl<T: Item, P: Send + Sync + 'static> Table<T, P> {
    /// Execute this table under `ctx`'s scope, for one parent item.
    ///
    /// Fetch errors are classified: ignorable ones (after any retries) end the
    /// fetch with what it delivered, fatal ones are reported, cancellation
    /// marks the report. Nothing here propagates.
    pub(crate) async fn run(
        &self,
        ctx: &ExecContext,
        parent: Arc<P>,
        parent_id: Option<Uuid>,
    ) -> ExecReport {
        let mut report = ExecReport::default();
        let retry = ctx.settings.retry;
        let mut attempt = 0;

        loop {
            let (delivered, result) = self
                .fetch_and_process(ctx, Arc::clone(&parent), parent_id, &mut report)
                .await;

            let err = match result {
                Ok(()) => break,
                Err(err) => err,
            };

            match ErrorClass::of(&err, self.ignore_error) {
                ErrorClass::Cancelled => {
                    report.cancelled = true;
                    break;
                }
                ErrorClass::Ignorable if delivered == 0 && attempt < retry.max_retries => {
                    let delay = retry.backoff(attempt);
                    attempt += 1;
                    tracing::debug!(
                        "{} [{}]: retry {} in {:?} after {:#}",
                        self.name,
                        ctx.scope(),
                        attempt,
                        delay,
                        err
                    );
                    tokio::select! {
                        _ = ctx.fetch.cancel.cancelled() => {
                            report.cancelled = true;
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                ErrorClass::Ignorable => {
                    tracing::debug!("{} [{}]: ignoring {:#}", self.name, ctx.scope(), err);
                    report.ignored += 1;
                    break;
                }
                ErrorClass::Fatal => {
                    tracing::error!("{} [{}]: fetch failed: {:#}", self.name, ctx.scope(), err);
                    report.fail(self.name, ctx.scope(), FailureKind::Fetch, err);
                    break;
                }
            }
        }

        if ctx.is_cancelled() {
            report.cancelled = true;
        }
        report
    }

    /// One fetch attempt: producer and consumer joined on the current task.
    /// Returns how many items the producer delivered alongside its result.
    async fn fetch_and_process(
        &self,
        ctx: &ExecContext,
        parent: Arc<P>,
        parent_id: Option<Uuid>,
        report: &mut ExecReport,
    ) -> (usize, Result<()>) {
        let (tx, mut rx, delivered) =
            item_channel(ctx.settings.channel_capacity, ctx.fetch.cancel.clone());

        // The producer owns the sender; it is dropped as soon as the fetch
        // completes, which ends the consumer loop.
        let producer = (self.fetch)(ctx.fetch.clone(), parent, tx);
        let consumer = async {
            while let Some(item) = rx.recv().await {
                if ctx.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                self.process_item(ctx, item, parent_id, report).await;
            }
        };

        let (result, ()) = tokio::join!(producer, consumer);
        (delivered.load(Ordering::Relaxed), result)
    }

    /// Resolve one item, forward its row, then walk the relations.
    async fn process_item(
        &self,
        ctx: &ExecContext,
        item: T,
        parent_id: Option<Uuid>,
        report: &mut ExecReport,
    ) {
        let resource = match self.resolve(ctx, Arc::new(item), parent_id).await {
            Ok(resource) => resource,
            Err(err) if is_cancelled(&err) => {
                report.cancelled = true;
                return;
            }
            Err(err) => {
                tracing::warn!("{} [{}]: {:#}", self.name, ctx.scope(), err);
                report.fail(self.name, ctx.scope(), FailureKind::Resource, err);
                return;
            }
        };

        if ctx.is_cancelled() {
            report.cancelled = true;
            return;
        }

        let id = resource.id();
        let item = resource.shared_item();
        if let Err(err) = ctx.sink.write(resource.into_row()).await {
            let err = err.context(format!("Failed to write {} row", self.name));
            tracing::error!("{} [{}]: {:#}", self.name, ctx.scope(), err);
            report.fail(self.name, ctx.scope(), FailureKind::Sink, err);
            return;
        }
        report.rows += 1;

        for relation in &self.relations {
            if ctx.is_cancelled() {
                report.cancelled = true;
                return;
            }
            let child = relation.execute_for(ctx, Arc::clone(&item), id).await;
            report.merge(child);
        }
    }

    /// Column resolution in declaration order, then the post resolver.
    async fn resolve(
        &self,
        ctx: &ExecContext,
        item: Arc<T>,
        parent_id: Option<Uuid>,
    ) -> Result<Resource<T>> {
        let mut resource = Resource::new(self.name, Arc::clone(&self.defs), item, parent_id);
        let document = serde_json::to_value(resource.item())
            .with_context(|| format!("Failed to serialize {} item", self.name))?;

        for column in &self.columns {
            let resolve_ctx = ResolveContext {
                scope: ctx.scope(),
                table: self.name,
                column: column.name,
                parent_id,
                diagnostics: &ctx.diagnostics,
            };
            let value = column
                .resolve(&resolve_ctx, resource.item(), &document)
                .with_context(|| format!("Failed to resolve {}.{}", self.name, column.name))?;
            resource.set(column.name, value)?;
        }

        if let Some(post_resolver) = self.post_resolver {
            post_resolver(&ctx.fetch, &mut resource)
                .await
                .with_context(|| format!("Post-resolution of {} failed", self.name))?;
        }

        Ok(resource)
    }
}

impl<C: Item, P: Send + Sync + 'static> Relation<P> for Table<C, P> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn execute_for<'a>(
        &'a self,
        ctx: &'a ExecContext,
        parent: Arc<P>,
        parent_id: Uuid,
    ) -> BoxFuture<'a, ExecReport> {
        Box::pin(self.run(ctx, parent, Some(parent_id)))
    }

    fn info(&self) -> TableInfo {
        Table::info(self)
    }
}

impl<T: Item> TableDef for Table<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn multiplexer(&self) -> Option<Multiplexer> {
        self.multiplex
    }

    fn delete_filter(&self, scope: &Scope) -> Option<DeleteFilter> {
        self.delete_filter.map(|build| build(scope))
    }

    fn execute<'a>(&'a self, ctx: &'a ExecContext) -> BoxFuture<'a, ExecReport> {
        Box::pin(self.run(ctx, Arc::new(()), None))
    }

    fn info(&self) -> TableInfo {
        Table::info(self)
    }
}

//! Sync engine
//!
//! Drives a set of top-level tables: expands each across its scopes, purges
//! stale rows per scope and executes the table tree. Tables run one after
//! another; scopes of one table run concurrently.

use super::diagnostics::{Diagnostic, DiagnosticCounts, Diagnostics};
use super::executor::{ExecContext, ExecReport, ExecSettings, Failure, FailureKind};
use super::fetcher::FetchContext;
use super::multiplex::{scopes_for, AccountRegions, Scope};
use super::sink::RowSink;
use crate::provider::ApiClient;
use crate::schema::TableDef;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result of syncing one top-level table across its scopes.
#[derive(Debug)]
pub struct TableSummary {
    pub table: &'static str,
    pub scopes: usize,
    pub report: ExecReport,
}

/// Result of a whole sync run.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub tables: Vec<TableSummary>,
    pub diagnostics: Vec<Diagnostic>,
    pub diagnostic_counts: DiagnosticCounts,
    pub cancelled: bool,
}

impl SyncSummary {
    pub fn rows(&self) -> usize {
        self.tables.iter().map(|t| t.report.rows).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.tables.iter().flat_map(|t| t.report.failures.iter())
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failures().next().is_none()
    }
}

pub struct Engine {
    client: Arc<dyn ApiClient>,
    sink: Arc<dyn RowSink>,
    accounts: Vec<AccountRegions>,
    settings: ExecSettings,
    cancel: CancellationToken,
    diagnostics: Diagnostics,
}

impl Engine {
    pub fn new(
        client: Arc<dyn ApiClient>,
        sink: Arc<dyn RowSink>,
        accounts: Vec<AccountRegions>,
    ) -> Self {
        Self {
            client,
            sink,
            accounts,
            settings: ExecSettings::default(),
            cancel: CancellationToken::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn with_settings(mut self, settings: ExecSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Sync `tables` in order. Stops starting new tables once cancelled.
    pub async fn sync(&self, tables: &[&dyn TableDef]) -> SyncSummary {
        let mut summary = SyncSummary::default();

        for table in tables {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let table_summary = self.sync_table(*table).await;
            summary.cancelled |= table_summary.report.cancelled;
            summary.tables.push(table_summary);
        }

        summary.diagnostics = self.diagnostics.all();
        summary.diagnostic_counts = self.diagnostics.counts();
        summary
    }

    /// Sync one table across every scope its multiplexer yields.
    pub async fn sync_table(&self, table: &dyn TableDef) -> TableSummary {
        let scopes = scopes_for(table.multiplexer(), &self.accounts);
        let scope_count = scopes.len();
        tracing::info!("Syncing {} across {} scope(s)", table.name(), scope_count);

        let reports: Vec<ExecReport> = stream::iter(scopes)
            .map(|scope| self.sync_scope(table, scope))
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        let mut report = ExecReport::default();
        for scope_report in reports {
            report.merge(scope_report);
        }

        tracing::info!(
            "Synced {}: {} rows, {} ignored, {} failures",
            table.name(),
            report.rows,
            report.ignored,
            report.failures.len()
        );

        TableSummary {
            table: table.name(),
            scopes: scope_count,
            report,
        }
    }

    async fn sync_scope(&self, table: &dyn TableDef, scope: Scope) -> ExecReport {
        if self.cancel.is_cancelled() {
            return ExecReport {
                cancelled: true,
                ..ExecReport::default()
            };
        }

        if let Some(filter) = table.delete_filter(&scope) {
            match self.sink.delete_stale(table.name(), &filter).await {
                Ok(removed) => {
                    tracing::debug!("{} [{}]: purged {} stale rows", table.name(), scope, removed)
                }
                Err(err) => {
                    let err = err.context(format!("Failed to purge stale {} rows", table.name()));
                    tracing::error!("{} [{}]: {:#}", table.name(), scope, err);
                    return ExecReport::failure(table.name(), &scope, FailureKind::Sink, err);
                }
            }
        }

        let ctx = ExecContext::new(
            FetchContext::new(Arc::clone(&self.client), scope, self.cancel.clone()),
            Arc::clone(&self.sink),
            self.diagnostics.clone(),
            self.settings,
        );
        let report = table.execute(&ctx).await;

        tracing::debug!(
            "{} [{}]: {} rows, {} failures",
            table.name(),
            ctx.scope(),
            report.rows,
            report.failures.len()
        );
        report
    }
}

//! Execution engine
//!
//! Walks table trees: multiplexes top-level tables across scopes, streams
//! fetched items through bounded channels, resolves rows and forwards them to
//! a [`RowSink`].
//!
//! # Module Structure
//!
//! - [`multiplex`] - [`Scope`] and [`Multiplexer`] policies
//! - [`fetcher`] - [`FetchContext`], the delivery channel and pagination
//! - [`executor`] - per-table producer/consumer execution and reporting
//! - [`sync`] - [`Engine`], running tables across scopes
//! - [`sink`] - storage sinks
//! - [`diagnostics`] - non-fatal resolver notes

pub mod diagnostics;
pub mod executor;
pub mod fetcher;
pub mod multiplex;
pub mod sink;
pub mod sync;

pub use diagnostics::{Diagnostic, DiagnosticCounts, DiagnosticLevel, Diagnostics};
pub use executor::{
    ExecContext, ExecReport, ExecSettings, Failure, FailureKind, RetryPolicy,
};
pub use fetcher::{item_channel, paginate, paginate_batched, FetchContext, ItemSender, Page, PageStats};
pub use multiplex::{scopes_for, AccountRegions, Multiplexer, Scope};
pub use sink::{DeleteFilter, JsonLinesSink, MemorySink, RowSink};
pub use sync::{Engine, SyncSummary, TableSummary};

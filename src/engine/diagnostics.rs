//! Non-fatal notes raised while resolving columns.

use super::multiplex::Scope;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub table: &'static str,
    pub column: &'static str,
    pub scope: Scope,
    pub message: String,
}

/// Notes kept per run; later ones are only counted
pub const MAX_RETAINED: usize = 1000;

/// Number of notes raised at each level, retained or not
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticCounts {
    pub warnings: usize,
    pub infos: usize,
}

#[derive(Debug, Default)]
struct Store {
    entries: Vec<Diagnostic>,
    counts: DiagnosticCounts,
}

/// Shared collector of diagnostics for one run. Cloning shares the store.
///
/// Every note is counted, but only the first [`MAX_RETAINED`] are kept; the
/// full stream goes to `tracing` at the call site.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    store: Arc<Mutex<Store>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&self, table: &'static str, column: &'static str, scope: &Scope, message: String) {
        self.record(DiagnosticLevel::Warn, table, column, scope, message);
    }

    pub fn info(&self, table: &'static str, column: &'static str, scope: &Scope, message: String) {
        self.record(DiagnosticLevel::Info, table, column, scope, message);
    }

    fn record(
        &self,
        level: DiagnosticLevel,
        table: &'static str,
        column: &'static str,
        scope: &Scope,
        message: String,
    ) {
        let entry = Diagnostic {
            level,
            table,
            column,
            scope: scope.clone(),
            message,
        };
        // A poisoned lock only means another thread panicked mid-push.
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        match level {
            DiagnosticLevel::Warn => store.counts.warnings += 1,
            DiagnosticLevel::Info => store.counts.infos += 1,
        }
        if store.entries.len() < MAX_RETAINED {
            store.entries.push(entry);
        }
    }

    /// Retained notes, in the order they were raised
    pub fn all(&self) -> Vec<Diagnostic> {
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .clone()
    }

    pub fn counts(&self) -> DiagnosticCounts {
        self.store.lock().unwrap_or_else(|e| e.into_inner()).counts
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.all()
            .into_iter()
            .filter(|d| d.level == DiagnosticLevel::Warn)
            .collect()
    }
}

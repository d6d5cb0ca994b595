//! Table definitions: the unit of composition of the extraction tree.

use super::column::{Column, ColumnDef};
use super::resource::Resource;
use crate::engine::{DeleteFilter, ExecContext, ExecReport, FetchContext, ItemSender};
use crate::engine::{Multiplexer, Scope};
use anyhow::{bail, Result};
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Bound shared by every raw item type.
pub trait Item: Serialize + Send + Sync + 'static {}

impl<T> Item for T where T: Serialize + Send + Sync + 'static {}

/// Fetches raw items for one scope (and parent, for relations) onto the
/// delivery channel. Returns once every item has been sent.
pub type FetchFn<T, P> = fn(FetchContext, Arc<P>, ItemSender<T>) -> BoxFuture<'static, Result<()>>;

/// Second-pass enrichment of a column-resolved resource.
pub type PostResolverFn<T> =
    for<'a> fn(&'a FetchContext, &'a mut Resource<T>) -> BoxFuture<'a, Result<()>>;

/// Classifies fetch errors that should produce an empty result instead.
pub type IgnoreErrorFn = fn(&anyhow::Error) -> bool;

/// Builds the filter identifying stale rows to purge for a scope.
pub type DeleteFilterFn = fn(&Scope) -> DeleteFilter;

/// A table whose items are of type `T` and whose parent items are of type
/// `P` (`()` for top-level tables).
pub struct Table<T, P = ()> {
    pub name: &'static str,
    pub(crate) columns: Vec<Column<T>>,
    pub(crate) defs: Arc<[ColumnDef]>,
    pub(crate) fetch: FetchFn<T, P>,
    pub(crate) multiplex: Option<Multiplexer>,
    pub(crate) post_resolver: Option<PostResolverFn<T>>,
    pub(crate) ignore_error: Option<IgnoreErrorFn>,
    pub(crate) delete_filter: Option<DeleteFilterFn>,
    pub(crate) relations: Vec<Box<dyn Relation<T>>>,
}

impl<T: Item, P: Send + Sync + 'static> Table<T, P> {
    pub fn new(name: &'static str, fetch: FetchFn<T, P>) -> Self {
        Self {
            name,
            columns: Vec::new(),
            defs: Arc::from(Vec::new()),
            fetch,
            multiplex: None,
            post_resolver: None,
            ignore_error: None,
            delete_filter: None,
            relations: Vec::new(),
        }
    }

    pub fn columns(mut self, columns: Vec<Column<T>>) -> Self {
        self.defs = columns.iter().map(ColumnDef::from).collect();
        self.columns = columns;
        self
    }

    pub fn multiplex(mut self, multiplexer: Multiplexer) -> Self {
        self.multiplex = Some(multiplexer);
        self
    }

    pub fn post_resolver(mut self, resolver: PostResolverFn<T>) -> Self {
        self.post_resolver = Some(resolver);
        self
    }

    pub fn ignore_error(mut self, predicate: IgnoreErrorFn) -> Self {
        self.ignore_error = Some(predicate);
        self
    }

    pub fn delete_filter(mut self, filter: DeleteFilterFn) -> Self {
        self.delete_filter = Some(filter);
        self
    }

    /// Add a child table fed with this table's items
    pub fn relation<C: Item>(mut self, child: Table<C, T>) -> Self {
        self.relations.push(Box::new(child));
        self
    }

    pub fn info(&self) -> TableInfo {
        TableInfo {
            name: self.name,
            columns: self.defs.to_vec(),
            relations: self.relations.iter().map(|r| r.info()).collect(),
        }
    }
}

/// A child table, with its item type erased.
pub trait Relation<P>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch and resolve this table's items for one parent item.
    fn execute_for<'a>(
        &'a self,
        ctx: &'a ExecContext,
        parent: Arc<P>,
        parent_id: Uuid,
    ) -> BoxFuture<'a, ExecReport>;

    fn info(&self) -> TableInfo;
}

/// A top-level table, with its item type erased.
pub trait TableDef: Send + Sync {
    fn name(&self) -> &'static str;

    fn multiplexer(&self) -> Option<Multiplexer>;

    /// Filter for stale rows in `scope`, when the table declares one
    fn delete_filter(&self, scope: &Scope) -> Option<DeleteFilter>;

    /// Run the table, and its relations, for the scope held by `ctx`
    fn execute<'a>(&'a self, ctx: &'a ExecContext) -> BoxFuture<'a, ExecReport>;

    fn info(&self) -> TableInfo;
}

/// Static shape of a table tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: &'static str,
    pub columns: Vec<ColumnDef>,
    pub relations: Vec<TableInfo>,
}

impl TableInfo {
    /// This table's name followed by every descendant's, depth first
    pub fn table_names(&self) -> Vec<&'static str> {
        let mut names = vec![self.name];
        for relation in &self.relations {
            names.extend(relation.table_names());
        }
        names
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Find this table or a descendant by name
    pub fn find(&self, name: &str) -> Option<&TableInfo> {
        if self.name == name {
            return Some(self);
        }
        self.relations.iter().find_map(|r| r.find(name))
    }

    /// Check column names are unique within each table of the tree
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name) {
                bail!("table {} declares column {} twice", self.name, column.name);
            }
        }
        for relation in &self.relations {
            relation.validate()?;
        }
        Ok(())
    }
}

/// Check a set of table trees: column names unique per table, table names
/// unique across every tree.
pub fn validate_tables<'a>(tables: impl IntoIterator<Item = &'a TableInfo>) -> Result<()> {
    let mut seen = HashSet::new();
    for info in tables {
        info.validate()?;
        for name in info.table_names() {
            if !seen.insert(name) {
                bail!("table name {} is declared more than once", name);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn info(name: &'static str, columns: &[&'static str], relations: Vec<TableInfo>) -> TableInfo {
        TableInfo {
            name,
            columns: columns
                .iter()
                .map(|c| ColumnDef {
                    name: c,
                    kind: ColumnType::String,
                })
                .collect(),
            relations,
        }
    }

    #[test]
    fn test_duplicate_column_is_rejected() {
        let t = info("t", &["a", "b", "a"], vec![]);
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_duplicate_table_name_across_trees_is_rejected() {
        let a = info("a", &["x"], vec![info("shared", &["y"], vec![])]);
        let b = info("b", &["x"], vec![info("shared", &["y"], vec![])]);
        assert!(validate_tables([&a, &b]).is_err());

        let c = info("c", &["x"], vec![info("c_child", &["y"], vec![])]);
        assert!(validate_tables([&a, &c]).is_ok());
    }

    #[test]
    fn test_find_descendant() {
        let t = info("root", &[], vec![info("child", &[], vec![info("grandchild", &["z"], vec![])])]);
        assert_eq!(t.find("grandchild").map(|i| i.column_names()), Some(vec!["z"]));
        assert_eq!(t.table_names(), vec!["root", "child", "grandchild"]);
    }
}

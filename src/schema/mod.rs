//! Table schema model
//!
//! Tables declare how one category of provider objects is fetched and how
//! each raw item is flattened into a row.
//!
//! - [`table`] - [`Table`], relations and the type-erased [`TableDef`]
//! - [`column`] - column kinds and resolvers
//! - [`resource`] - per-item resolution state and finished [`Row`]s
//! - [`path`] - dotted-path lookups into serialized items

pub mod column;
pub mod path;
pub mod resource;
pub mod table;

pub use column::{Column, ColumnDef, ColumnResolver, ColumnType, ResolveContext, ResolverFn};
pub use path::{field_name, resolve_path};
pub use resource::{ResolveError, Resource, Row};
pub use table::{
    validate_tables, DeleteFilterFn, FetchFn, IgnoreErrorFn, Item, PostResolverFn, Relation,
    Table, TableDef, TableInfo,
};

//! Table Registry - the provider tables this build knows about
//!
//! Every top-level table is built once on first access and looked up by name
//! from the rest of the application.

pub mod cloudtrail_trails;
pub mod common;
pub mod directconnect_virtual_gateways;
pub mod ec2_regional_config;
pub mod ec2_vpc_peering_connections;
pub mod ecs_clusters;
pub mod elbv1_load_balancers;

use crate::schema::{validate_tables, TableDef, TableInfo};
use anyhow::Result;
use std::sync::OnceLock;

/// Global registry of top-level tables
static REGISTRY: OnceLock<Vec<Box<dyn TableDef>>> = OnceLock::new();

/// Get every top-level table (built on first access)
pub fn registry() -> &'static [Box<dyn TableDef>] {
    REGISTRY.get_or_init(|| {
        vec![
            Box::new(cloudtrail_trails::table()),
            Box::new(directconnect_virtual_gateways::table()),
            Box::new(ec2_regional_config::table()),
            Box::new(ec2_vpc_peering_connections::table()),
            Box::new(ecs_clusters::table()),
            Box::new(elbv1_load_balancers::table()),
        ]
    })
}

/// Get a top-level table by name
pub fn get_table(name: &str) -> Option<&'static dyn TableDef> {
    registry()
        .iter()
        .find(|t| t.name() == name)
        .map(|t| &**t)
}

/// Get all top-level table names
pub fn table_names() -> Vec<&'static str> {
    registry().iter().map(|t| t.name()).collect()
}

/// Static shape of every table tree
pub fn table_infos() -> Vec<TableInfo> {
    registry().iter().map(|t| t.info()).collect()
}

/// Check table names are globally unique and column names unique per table
pub fn validate_registry() -> Result<()> {
    validate_tables(&table_infos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    #[test]
    fn test_registry_is_valid() {
        validate_registry().unwrap();
    }

    #[test]
    fn test_get_table() {
        let table = get_table("aws_elbv1_load_balancers");
        assert!(table.is_some(), "load balancer table should exist");
        assert!(get_table("aws_nonexistent").is_none());
    }

    #[test]
    fn test_all_top_level_tables_are_scoped_by_account_and_region() {
        for info in table_infos() {
            let columns = info.column_names();
            assert_eq!(&columns[..2], &["account_id", "region"], "{}", info.name);
        }
        for table in registry() {
            assert!(table.multiplexer().is_some(), "{}", table.name());
        }
    }

    #[test]
    fn test_relations_reference_their_parent() {
        for info in table_infos() {
            for relation in &info.relations {
                let first = relation.columns[0];
                assert_eq!(first.kind, ColumnType::Uuid, "{}", relation.name);
            }
        }
    }

    #[test]
    fn test_table_names_listed() {
        let names = table_names();
        assert_eq!(names.len(), 6);
        assert!(names.contains(&"aws_ecs_clusters"));
    }
}

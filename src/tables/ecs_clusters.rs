//! ECS clusters, their attachments and default capacity provider strategies.

use super::common::{
    account_region_columns, delete_account_region_filter, named_values_map, tags_map,
    KeyValuePair, Tag,
};
use crate::engine::{paginate, FetchContext, ItemSender, Multiplexer, Page};
use crate::provider::ignore_access_denied_service_disabled;
use crate::schema::{Column, ColumnType, ResolveContext, Table};
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Attachment {
    pub details: Vec<KeyValuePair>,
    pub id: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "Type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CapacityProviderStrategyItem {
    pub capacity_provider: Option<String>,
    pub base: Option<i32>,
    pub weight: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Cluster {
    pub active_services_count: Option<i32>,
    pub attachments: Vec<Attachment>,
    pub attachments_status: Option<String>,
    pub capacity_providers: Vec<String>,
    pub cluster_arn: Option<String>,
    pub cluster_name: Option<String>,
    pub configuration: Option<Value>,
    pub default_capacity_provider_strategy: Vec<CapacityProviderStrategyItem>,
    pub pending_tasks_count: Option<i32>,
    pub registered_container_instances_count: Option<i32>,
    pub running_tasks_count: Option<i32>,
    pub settings: Vec<KeyValuePair>,
    pub statistics: Vec<KeyValuePair>,
    pub status: Option<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ListClustersOutput {
    cluster_arns: Vec<String>,
    next_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeClustersOutput {
    clusters: Vec<Cluster>,
}

pub fn table() -> Table<Cluster> {
    let mut columns = account_region_columns();
    columns.extend([
        Column::new("active_services_count", ColumnType::Int),
        Column::new("attachments_status", ColumnType::String),
        Column::new("capacity_providers", ColumnType::StringArray),
        Column::new("cluster_arn", ColumnType::String),
        Column::new("cluster_name", ColumnType::String),
        Column::path(
            "execute_config_kms_key_id",
            ColumnType::String,
            "Configuration.ExecuteCommandConfiguration.KmsKeyId",
        ),
        Column::path(
            "execute_config_logs_cloud_watch_encryption_enabled",
            ColumnType::Bool,
            "Configuration.ExecuteCommandConfiguration.LogConfiguration.CloudWatchEncryptionEnabled",
        ),
        Column::path(
            "execute_config_log_cloud_watch_log_group_name",
            ColumnType::String,
            "Configuration.ExecuteCommandConfiguration.LogConfiguration.CloudWatchLogGroupName",
        ),
        Column::path(
            "execute_config_log_s3_bucket_name",
            ColumnType::String,
            "Configuration.ExecuteCommandConfiguration.LogConfiguration.S3BucketName",
        ),
        Column::path(
            "execute_config_log_s3_encryption_enabled",
            ColumnType::Bool,
            "Configuration.ExecuteCommandConfiguration.LogConfiguration.S3EncryptionEnabled",
        ),
        Column::path(
            "execute_config_log_s3_key_prefix",
            ColumnType::String,
            "Configuration.ExecuteCommandConfiguration.LogConfiguration.S3KeyPrefix",
        ),
        Column::path(
            "execute_config_logging",
            ColumnType::String,
            "Configuration.ExecuteCommandConfiguration.Logging",
        ),
        Column::new("pending_tasks_count", ColumnType::Int),
        Column::new("registered_container_instances_count", ColumnType::Int),
        Column::new("running_tasks_count", ColumnType::Int),
        Column::func("settings", ColumnType::Json, resolve_settings),
        Column::func("statistics", ColumnType::Json, resolve_statistics),
        Column::new("status", ColumnType::String),
        Column::func("tags", ColumnType::Json, resolve_tags),
    ]);

    Table::new("aws_ecs_clusters", fetch_clusters)
        .columns(columns)
        .multiplex(Multiplexer::AccountRegion)
        .ignore_error(ignore_access_denied_service_disabled)
        .delete_filter(delete_account_region_filter)
        .relation(attachments())
        .relation(default_capacity_provider_strategies())
}

fn attachments() -> Table<Attachment, Cluster> {
    Table::new("aws_ecs_cluster_attachments", fetch_attachments).columns(vec![
        Column::parent_id("cluster_id"),
        Column::path("attachment_id", ColumnType::String, "Id"),
        Column::new("status", ColumnType::String),
        Column::new("type", ColumnType::String),
        Column::func("details", ColumnType::Json, resolve_attachment_details),
    ])
}

fn default_capacity_provider_strategies() -> Table<CapacityProviderStrategyItem, Cluster> {
    Table::new(
        "aws_ecs_cluster_default_capacity_provider_strategies",
        fetch_default_capacity_provider_strategies,
    )
    .columns(vec![
        Column::parent_id("cluster_id"),
        Column::new("capacity_provider", ColumnType::String),
        Column::new("base", ColumnType::Int),
        Column::new("weight", ColumnType::Int),
    ])
}

/// Each page of cluster ARNs is described before the next page is listed.
fn fetch_clusters(
    ctx: FetchContext,
    _: Arc<()>,
    tx: ItemSender<Cluster>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        paginate(&tx, |token| {
            let ctx = ctx.clone();
            async move {
                let listed: ListClustersOutput = ctx
                    .call("ecs", "ListClusters", &json!({ "NextToken": token }))
                    .await?;
                if listed.cluster_arns.is_empty() {
                    return Ok(Page::new(Vec::new(), listed.next_token));
                }
                let described: DescribeClustersOutput = ctx
                    .call(
                        "ecs",
                        "DescribeClusters",
                        &json!({ "Clusters": listed.cluster_arns }),
                    )
                    .await?;
                Ok(Page::new(described.clusters, listed.next_token))
            }
        })
        .await?;
        Ok(())
    })
}

fn fetch_attachments(
    _: FetchContext,
    cluster: Arc<Cluster>,
    tx: ItemSender<Attachment>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move { tx.send_all(cluster.attachments.iter().cloned()).await })
}

fn fetch_default_capacity_provider_strategies(
    _: FetchContext,
    cluster: Arc<Cluster>,
    tx: ItemSender<CapacityProviderStrategyItem>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        tx.send_all(cluster.default_capacity_provider_strategy.iter().cloned())
            .await
    })
}

fn resolve_settings(_: &ResolveContext<'_>, cluster: &Cluster) -> Result<Value> {
    Ok(named_values_map(&cluster.settings))
}

fn resolve_statistics(_: &ResolveContext<'_>, cluster: &Cluster) -> Result<Value> {
    Ok(named_values_map(&cluster.statistics))
}

fn resolve_tags(_: &ResolveContext<'_>, cluster: &Cluster) -> Result<Value> {
    Ok(tags_map(&cluster.tags))
}

fn resolve_attachment_details(_: &ResolveContext<'_>, attachment: &Attachment) -> Result<Value> {
    Ok(named_values_map(&attachment.details))
}

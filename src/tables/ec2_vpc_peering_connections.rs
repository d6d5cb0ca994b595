//! EC2 VPC peering connections.

use super::common::{account_region_columns, delete_account_region_filter, tags_map, Tag};
use crate::engine::{paginate, FetchContext, ItemSender, Multiplexer, Page};
use crate::provider::ignore_access_denied_service_disabled;
use crate::schema::{Column, ColumnType, ResolveContext, Table};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CidrBlock {
    pub cidr_block: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Ipv6CidrBlock {
    pub ipv6_cidr_block: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PeeringOptions {
    pub allow_dns_resolution_from_remote_vpc: Option<bool>,
    pub allow_egress_from_local_classic_link_to_remote_vpc: Option<bool>,
    pub allow_egress_from_local_vpc_to_remote_classic_link: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VpcInfo {
    pub cidr_block: Option<String>,
    pub cidr_block_set: Vec<CidrBlock>,
    pub ipv6_cidr_block_set: Vec<Ipv6CidrBlock>,
    pub owner_id: Option<String>,
    pub peering_options: Option<PeeringOptions>,
    pub region: Option<String>,
    pub vpc_id: Option<String>,
}

impl VpcInfo {
    fn cidr_blocks(&self) -> Value {
        string_list(self.cidr_block_set.iter().map(|b| b.cidr_block.as_deref()))
    }

    fn ipv6_cidr_blocks(&self) -> Value {
        string_list(self.ipv6_cidr_block_set.iter().map(|b| b.ipv6_cidr_block.as_deref()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PeeringStatus {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VpcPeeringConnection {
    pub accepter_vpc_info: Option<VpcInfo>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub requester_vpc_info: Option<VpcInfo>,
    pub status: Option<PeeringStatus>,
    pub tags: Vec<Tag>,
    pub vpc_peering_connection_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeVpcPeeringConnectionsOutput {
    vpc_peering_connections: Vec<VpcPeeringConnection>,
    next_token: Option<String>,
}

pub fn table() -> Table<VpcPeeringConnection> {
    let mut columns = account_region_columns();
    columns.extend([
        Column::path("accepter_cidr_block", ColumnType::String, "AccepterVpcInfo.CidrBlock"),
        Column::func(
            "accepter_cidr_block_set",
            ColumnType::StringArray,
            resolve_accepter_cidr_block_set,
        ),
        Column::func(
            "accepter_ipv6_cidr_block_set",
            ColumnType::StringArray,
            resolve_accepter_ipv6_cidr_block_set,
        ),
        Column::path("accepter_owner_id", ColumnType::String, "AccepterVpcInfo.OwnerId"),
        Column::path(
            "accepter_allow_dns_resolution_from_remote_vpc",
            ColumnType::Bool,
            "AccepterVpcInfo.PeeringOptions.AllowDnsResolutionFromRemoteVpc",
        ),
        Column::path(
            "accepter_allow_egress_local_classic_link_to_remote_vpc",
            ColumnType::Bool,
            "AccepterVpcInfo.PeeringOptions.AllowEgressFromLocalClassicLinkToRemoteVpc",
        ),
        Column::path(
            "accepter_allow_egress_local_vpc_to_remote_classic_link",
            ColumnType::Bool,
            "AccepterVpcInfo.PeeringOptions.AllowEgressFromLocalVpcToRemoteClassicLink",
        ),
        Column::path("accepter_vpc_region", ColumnType::String, "AccepterVpcInfo.Region"),
        Column::path("accepter_vpc_id", ColumnType::String, "AccepterVpcInfo.VpcId"),
        Column::new("expiration_time", ColumnType::Timestamp),
        Column::path("requester_cidr_block", ColumnType::String, "RequesterVpcInfo.CidrBlock"),
        Column::func(
            "requester_cidr_block_set",
            ColumnType::StringArray,
            resolve_requester_cidr_block_set,
        ),
        Column::func(
            "requester_ipv6_cidr_block_set",
            ColumnType::StringArray,
            resolve_requester_ipv6_cidr_block_set,
        ),
        Column::path("requester_owner_id", ColumnType::String, "RequesterVpcInfo.OwnerId"),
        Column::path(
            "requester_allow_dns_resolution_from_remote_vpc",
            ColumnType::Bool,
            "RequesterVpcInfo.PeeringOptions.AllowDnsResolutionFromRemoteVpc",
        ),
        Column::path(
            "requester_allow_egress_local_classic_link_to_remote_vpc",
            ColumnType::Bool,
            "RequesterVpcInfo.PeeringOptions.AllowEgressFromLocalClassicLinkToRemoteVpc",
        ),
        Column::path(
            "requester_allow_egress_local_vpc_to_remote_classic_link",
            ColumnType::Bool,
            "RequesterVpcInfo.PeeringOptions.AllowEgressFromLocalVpcToRemoteClassicLink",
        ),
        Column::path("requester_vpc_region", ColumnType::String, "RequesterVpcInfo.Region"),
        Column::path("requester_vpc_id", ColumnType::String, "RequesterVpcInfo.VpcId"),
        Column::path("status_code", ColumnType::String, "Status.Code"),
        Column::path("status_message", ColumnType::String, "Status.Message"),
        Column::func("tags", ColumnType::Json, resolve_tags),
        Column::new("vpc_peering_connection_id", ColumnType::String),
    ]);

    Table::new("aws_ec2_vpc_peering_connections", fetch_peering_connections)
        .columns(columns)
        .multiplex(Multiplexer::AccountRegion)
        .ignore_error(ignore_access_denied_service_disabled)
        .delete_filter(delete_account_region_filter)
}

fn fetch_peering_connections(
    ctx: FetchContext,
    _: Arc<()>,
    tx: ItemSender<VpcPeeringConnection>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let stats = paginate(&tx, |token| {
            let ctx = ctx.clone();
            async move {
                let output: DescribeVpcPeeringConnectionsOutput = ctx
                    .call(
                        "ec2",
                        "DescribeVpcPeeringConnections",
                        &json!({ "NextToken": token }),
                    )
                    .await?;
                Ok(Page::new(output.vpc_peering_connections, output.next_token))
            }
        })
        .await?;
        tracing::debug!("vpc peering connections [{}]: {} pages", ctx.scope, stats.pages);
        Ok(())
    })
}

fn string_list<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Value {
    Value::Array(
        values
            .map(|v| v.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null))
            .collect(),
    )
}

fn resolve_accepter_cidr_block_set(
    _: &ResolveContext<'_>,
    connection: &VpcPeeringConnection,
) -> Result<Value> {
    Ok(connection
        .accepter_vpc_info
        .as_ref()
        .map(VpcInfo::cidr_blocks)
        .unwrap_or_else(|| Value::Array(Vec::new())))
}

fn resolve_accepter_ipv6_cidr_block_set(
    _: &ResolveContext<'_>,
    connection: &VpcPeeringConnection,
) -> Result<Value> {
    Ok(connection
        .accepter_vpc_info
        .as_ref()
        .map(VpcInfo::ipv6_cidr_blocks)
        .unwrap_or_else(|| Value::Array(Vec::new())))
}

fn resolve_requester_cidr_block_set(
    _: &ResolveContext<'_>,
    connection: &VpcPeeringConnection,
) -> Result<Value> {
    Ok(connection
        .requester_vpc_info
        .as_ref()
        .map(VpcInfo::cidr_blocks)
        .unwrap_or_else(|| Value::Array(Vec::new())))
}

fn resolve_requester_ipv6_cidr_block_set(
    _: &ResolveContext<'_>,
    connection: &VpcPeeringConnection,
) -> Result<Value> {
    Ok(connection
        .requester_vpc_info
        .as_ref()
        .map(VpcInfo::ipv6_cidr_blocks)
        .unwrap_or_else(|| Value::Array(Vec::new())))
}

fn resolve_tags(_: &ResolveContext<'_>, connection: &VpcPeeringConnection) -> Result<Value> {
    Ok(tags_map(&connection.tags))
}

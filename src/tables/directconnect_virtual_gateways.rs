//! Direct Connect virtual private gateways.

use super::common::{account_region_columns, delete_account_region_filter};
use crate::engine::{FetchContext, ItemSender, Multiplexer};
use crate::provider::ignore_access_denied_service_disabled;
use crate::schema::{Column, ColumnType, Table};
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VirtualGateway {
    pub virtual_gateway_id: Option<String>,
    pub virtual_gateway_state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeVirtualGatewaysOutput {
    virtual_gateways: Vec<VirtualGateway>,
}

pub fn table() -> Table<VirtualGateway> {
    let mut columns = account_region_columns();
    columns.push(Column::new("virtual_gateway_id", ColumnType::String));
    columns.push(Column::new("virtual_gateway_state", ColumnType::String));

    Table::new("aws_directconnect_virtual_gateways", fetch_virtual_gateways)
        .columns(columns)
        .multiplex(Multiplexer::AccountRegion)
        .ignore_error(ignore_access_denied_service_disabled)
        .delete_filter(delete_account_region_filter)
}

fn fetch_virtual_gateways(
    ctx: FetchContext,
    _: Arc<()>,
    tx: ItemSender<VirtualGateway>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let output: DescribeVirtualGatewaysOutput = ctx
            .call("directconnect", "DescribeVirtualGateways", &json!({}))
            .await?;
        tx.send_all(output.virtual_gateways).await
    })
}

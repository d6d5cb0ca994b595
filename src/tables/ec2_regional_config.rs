//! Per-region EC2 account settings.

use super::common::{account_region_columns, delete_account_region_filter};
use crate::engine::{FetchContext, ItemSender, Multiplexer};
use crate::provider::ignore_access_denied_service_disabled;
use crate::schema::{Column, ColumnType, Table};
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Regional settings assembled from two lookups; one item per scope.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegionalConfig {
    pub ebs_encryption_enabled_by_default: bool,
    pub ebs_default_kms_key_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct GetEbsDefaultKmsKeyIdOutput {
    kms_key_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct GetEbsEncryptionByDefaultOutput {
    ebs_encryption_by_default: bool,
}

pub fn table() -> Table<RegionalConfig> {
    let mut columns = account_region_columns();
    columns.push(Column::new("ebs_encryption_enabled_by_default", ColumnType::Bool));
    columns.push(Column::new("ebs_default_kms_key_id", ColumnType::String));

    Table::new("aws_ec2_regional_config", fetch_regional_config)
        .columns(columns)
        .multiplex(Multiplexer::AccountRegion)
        .ignore_error(ignore_access_denied_service_disabled)
        .delete_filter(delete_account_region_filter)
}

fn fetch_regional_config(
    ctx: FetchContext,
    _: Arc<()>,
    tx: ItemSender<RegionalConfig>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let key: GetEbsDefaultKmsKeyIdOutput = ctx
            .call("ec2", "GetEbsDefaultKmsKeyId", &json!({}))
            .await?;
        let encryption: GetEbsEncryptionByDefaultOutput = ctx
            .call("ec2", "GetEbsEncryptionByDefault", &json!({}))
            .await?;
        tx.send(RegionalConfig {
            ebs_encryption_enabled_by_default: encryption.ebs_encryption_by_default,
            ebs_default_kms_key_id: key.kms_key_id,
        })
        .await
    })
}

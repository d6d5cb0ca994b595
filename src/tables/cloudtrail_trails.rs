//! CloudTrail trails and their event selectors.

use super::common::{account_region_columns, delete_account_region_filter, log_group_name};
use crate::engine::{FetchContext, ItemSender, Multiplexer};
use crate::provider::ignore_access_denied_service_disabled;
use crate::schema::{Column, ColumnType, ResolveContext, Resource, Table};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Trail {
    pub cloud_watch_logs_log_group_arn: Option<String>,
    pub cloud_watch_logs_role_arn: Option<String>,
    pub has_custom_event_selectors: Option<bool>,
    pub has_insight_selectors: Option<bool>,
    pub home_region: Option<String>,
    pub include_global_service_events: Option<bool>,
    pub is_multi_region_trail: Option<bool>,
    pub is_organization_trail: Option<bool>,
    pub kms_key_id: Option<String>,
    pub log_file_validation_enabled: Option<bool>,
    pub name: Option<String>,
    pub s3_bucket_name: Option<String>,
    pub s3_key_prefix: Option<String>,
    #[serde(rename = "SnsTopicARN")]
    pub sns_topic_arn: Option<String>,
    pub sns_topic_name: Option<String>,
    #[serde(rename = "TrailARN")]
    pub trail_arn: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeTrailsOutput {
    trail_list: Vec<Trail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TrailStatus {
    pub is_logging: Option<bool>,
    pub latest_cloud_watch_logs_delivery_error: Option<String>,
    pub latest_cloud_watch_logs_delivery_time: Option<DateTime<Utc>>,
    pub latest_delivery_attempt_succeeded: Option<String>,
    pub latest_delivery_attempt_time: Option<String>,
    pub latest_delivery_error: Option<String>,
    pub latest_delivery_time: Option<DateTime<Utc>>,
    pub latest_digest_delivery_error: Option<String>,
    pub latest_digest_delivery_time: Option<DateTime<Utc>>,
    pub latest_notification_attempt_succeeded: Option<String>,
    pub latest_notification_attempt_time: Option<String>,
    pub latest_notification_error: Option<String>,
    pub latest_notification_time: Option<DateTime<Utc>>,
    pub start_logging_time: Option<DateTime<Utc>>,
    pub stop_logging_time: Option<DateTime<Utc>>,
    pub time_logging_started: Option<String>,
    pub time_logging_stopped: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EventSelector {
    pub exclude_management_event_sources: Vec<String>,
    pub include_management_events: Option<bool>,
    pub read_write_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct GetEventSelectorsOutput {
    event_selectors: Vec<EventSelector>,
}

pub fn table() -> Table<Trail> {
    let mut columns = account_region_columns();
    columns.extend([
        Column::func(
            "cloudwatch_logs_log_group_name",
            ColumnType::String,
            resolve_log_group_name,
        ),
        Column::new("is_logging", ColumnType::Bool),
        Column::new("latest_cloud_watch_logs_delivery_error", ColumnType::String),
        Column::new("latest_cloud_watch_logs_delivery_time", ColumnType::Timestamp),
        Column::new("latest_delivery_attempt_succeeded", ColumnType::String),
        Column::new("latest_delivery_attempt_time", ColumnType::String),
        Column::new("latest_delivery_error", ColumnType::String),
        Column::new("latest_delivery_time", ColumnType::Timestamp),
        Column::new("latest_digest_delivery_error", ColumnType::String),
        Column::new("latest_digest_delivery_time", ColumnType::Timestamp),
        Column::new("latest_notification_attempt_succeeded", ColumnType::String),
        Column::new("latest_notification_attempt_time", ColumnType::String),
        Column::new("latest_notification_error", ColumnType::String),
        Column::new("latest_notification_time", ColumnType::Timestamp),
        Column::new("start_logging_time", ColumnType::Timestamp),
        Column::new("stop_logging_time", ColumnType::Timestamp),
        Column::new("time_logging_started", ColumnType::String),
        Column::new("time_logging_stopped", ColumnType::String),
        Column::new("cloud_watch_logs_log_group_arn", ColumnType::String),
        Column::new("cloud_watch_logs_role_arn", ColumnType::String),
        Column::new("has_custom_event_selectors", ColumnType::Bool),
        Column::new("has_insight_selectors", ColumnType::Bool),
        Column::new("home_region", ColumnType::String),
        Column::new("include_global_service_events", ColumnType::Bool),
        Column::new("is_multi_region_trail", ColumnType::Bool),
        Column::new("is_organization_trail", ColumnType::Bool),
        Column::new("kms_key_id", ColumnType::String),
        Column::new("log_file_validation_enabled", ColumnType::Bool),
        Column::new("name", ColumnType::String),
        Column::new("s3_bucket_name", ColumnType::String),
        Column::new("s3_key_prefix", ColumnType::String),
        Column::path("sns_topic_arn", ColumnType::String, "SnsTopicARN"),
        Column::new("sns_topic_name", ColumnType::String),
        Column::path("trail_arn", ColumnType::String, "TrailARN"),
    ]);

    Table::new("aws_cloudtrail_trails", fetch_trails)
        .columns(columns)
        .multiplex(Multiplexer::AccountRegion)
        .ignore_error(ignore_access_denied_service_disabled)
        .delete_filter(delete_account_region_filter)
        .post_resolver(resolve_trail_status)
        .relation(event_selectors())
}

fn event_selectors() -> Table<EventSelector, Trail> {
    Table::new("aws_cloudtrail_trail_event_selectors", fetch_event_selectors).columns(vec![
        Column::parent_id("trail_id"),
        Column::new("exclude_management_event_sources", ColumnType::StringArray),
        Column::new("include_management_events", ColumnType::Bool),
        Column::new("read_write_type", ColumnType::String),
    ])
}

fn fetch_trails(
    ctx: FetchContext,
    _: Arc<()>,
    tx: ItemSender<Trail>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let output: DescribeTrailsOutput = ctx.call("cloudtrail", "DescribeTrails", &json!({})).await?;
        tx.send_all(output.trail_list).await
    })
}

/// Fill the status columns from `GetTrailStatus`.
fn resolve_trail_status<'a>(
    ctx: &'a FetchContext,
    resource: &'a mut Resource<Trail>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let arn = resource
            .item()
            .trail_arn
            .clone()
            .context("trail has no ARN")?;
        let status: TrailStatus = ctx
            .call("cloudtrail", "GetTrailStatus", &json!({ "Name": arn }))
            .await?;

        resource.set_value("is_logging", status.is_logging)?;
        resource.set_value(
            "latest_cloud_watch_logs_delivery_error",
            status.latest_cloud_watch_logs_delivery_error,
        )?;
        resource.set_value(
            "latest_cloud_watch_logs_delivery_time",
            status.latest_cloud_watch_logs_delivery_time,
        )?;
        resource.set_value(
            "latest_delivery_attempt_succeeded",
            status.latest_delivery_attempt_succeeded,
        )?;
        resource.set_value("latest_delivery_attempt_time", status.latest_delivery_attempt_time)?;
        resource.set_value("latest_delivery_error", status.latest_delivery_error)?;
        resource.set_value("latest_delivery_time", status.latest_delivery_time)?;
        resource.set_value("latest_digest_delivery_error", status.latest_digest_delivery_error)?;
        resource.set_value("latest_digest_delivery_time", status.latest_digest_delivery_time)?;
        resource.set_value(
            "latest_notification_attempt_succeeded",
            status.latest_notification_attempt_succeeded,
        )?;
        resource.set_value(
            "latest_notification_attempt_time",
            status.latest_notification_attempt_time,
        )?;
        resource.set_value("latest_notification_error", status.latest_notification_error)?;
        resource.set_value("latest_notification_time", status.latest_notification_time)?;
        resource.set_value("start_logging_time", status.start_logging_time)?;
        resource.set_value("stop_logging_time", status.stop_logging_time)?;
        resource.set_value("time_logging_started", status.time_logging_started)?;
        resource.set_value("time_logging_stopped", status.time_logging_stopped)?;
        Ok(())
    })
}

fn resolve_log_group_name(ctx: &ResolveContext<'_>, trail: &Trail) -> Result<Value> {
    let Some(arn) = trail.cloud_watch_logs_log_group_arn.as_deref() else {
        ctx.info("CloudWatchLogsLogGroupARN is empty");
        return Ok(Value::Null);
    };

    match log_group_name(arn) {
        Some(name) => Ok(Value::String(name.to_string())),
        None => {
            ctx.warn(format!(
                "CloudWatchLogsLogGroupARN doesn't fit standard regex: {}",
                arn
            ));
            Ok(Value::Null)
        }
    }
}

fn fetch_event_selectors(
    ctx: FetchContext,
    trail: Arc<Trail>,
    tx: ItemSender<EventSelector>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let output: GetEventSelectorsOutput = ctx
            .call(
                "cloudtrail",
                "GetEventSelectors",
                &json!({ "TrailName": trail.trail_arn }),
            )
            .await?;
        tx.send_all(output.event_selectors).await
    })
}

//! Classic (v1) elastic load balancers and their nested descriptions.

use super::common::{account_region_columns, delete_account_region_filter, pairs_to_map, tags_map, Tag};
use crate::engine::{paginate_batched, FetchContext, ItemSender, Multiplexer, Page};
use crate::provider::ignore_access_denied_service_disabled;
use crate::schema::{Column, ColumnType, ResolveContext, Table};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// `DescribeTags` accepts at most this many load balancer names
pub const TAG_BATCH_SIZE: usize = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HealthCheck {
    pub healthy_threshold: Option<i32>,
    pub interval: Option<i32>,
    pub target: Option<String>,
    pub timeout: Option<i32>,
    pub unhealthy_threshold: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Instance {
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BackendServerDescription {
    pub instance_port: Option<i32>,
    pub policy_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Listener {
    pub instance_port: Option<i32>,
    pub instance_protocol: Option<String>,
    pub load_balancer_port: Option<i32>,
    pub protocol: Option<String>,
    #[serde(rename = "SSLCertificateId")]
    pub ssl_certificate_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListenerDescription {
    pub listener: Option<Listener>,
    pub policy_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AppCookieStickinessPolicy {
    pub cookie_name: Option<String>,
    pub policy_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LbCookieStickinessPolicy {
    pub cookie_expiration_period: Option<i64>,
    pub policy_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Policies {
    pub app_cookie_stickiness_policies: Vec<AppCookieStickinessPolicy>,
    #[serde(rename = "LBCookieStickinessPolicies")]
    pub lb_cookie_stickiness_policies: Vec<LbCookieStickinessPolicy>,
    pub other_policies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SourceSecurityGroup {
    pub group_name: Option<String>,
    pub owner_alias: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoadBalancerDescription {
    pub availability_zones: Vec<String>,
    pub backend_server_descriptions: Vec<BackendServerDescription>,
    pub canonical_hosted_zone_name: Option<String>,
    #[serde(rename = "CanonicalHostedZoneNameID")]
    pub canonical_hosted_zone_name_id: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    #[serde(rename = "DNSName")]
    pub dns_name: Option<String>,
    pub health_check: Option<HealthCheck>,
    pub instances: Vec<Instance>,
    pub listener_descriptions: Vec<ListenerDescription>,
    pub load_balancer_name: Option<String>,
    pub policies: Option<Policies>,
    pub scheme: Option<String>,
    pub security_groups: Vec<String>,
    pub source_security_group: Option<SourceSecurityGroup>,
    pub subnets: Vec<String>,
    #[serde(rename = "VPCId")]
    pub vpc_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AccessLog {
    pub emit_interval: Option<i32>,
    pub enabled: Option<bool>,
    pub s3_bucket_name: Option<String>,
    pub s3_bucket_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConnectionDraining {
    pub enabled: Option<bool>,
    pub timeout: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConnectionSettings {
    pub idle_timeout: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CrossZoneLoadBalancing {
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoadBalancerAttributes {
    pub access_log: Option<AccessLog>,
    pub additional_attributes: Vec<Tag>,
    pub connection_draining: Option<ConnectionDraining>,
    pub connection_settings: Option<ConnectionSettings>,
    pub cross_zone_load_balancing: Option<CrossZoneLoadBalancing>,
}

/// A load balancer description merged with its tags and attributes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancer {
    #[serde(flatten)]
    pub description: LoadBalancerDescription,
    pub tags: Value,
    pub attributes: Option<LoadBalancerAttributes>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PolicyAttributeDescription {
    pub attribute_name: Option<String>,
    pub attribute_value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PolicyDescription {
    pub policy_attribute_descriptions: Vec<PolicyAttributeDescription>,
    pub policy_name: Option<String>,
    pub policy_type_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeLoadBalancersOutput {
    load_balancer_descriptions: Vec<LoadBalancerDescription>,
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct TagDescription {
    load_balancer_name: Option<String>,
    tags: Vec<Tag>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeTagsOutput {
    tag_descriptions: Vec<TagDescription>,
}

impl DescribeTagsOutput {
    fn tags_for(&self, name: &str) -> Value {
        self.tag_descriptions
            .iter()
            .find(|d| d.load_balancer_name.as_deref() == Some(name))
            .map(|d| tags_map(&d.tags))
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeLoadBalancerAttributesOutput {
    load_balancer_attributes: Option<LoadBalancerAttributes>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeLoadBalancerPoliciesOutput {
    policy_descriptions: Vec<PolicyDescription>,
}

pub fn table() -> Table<LoadBalancer> {
    let mut columns = account_region_columns();
    columns.extend([
        Column::path(
            "attributes_access_log_enabled",
            ColumnType::Bool,
            "Attributes.AccessLog.Enabled",
        ),
        Column::path(
            "attributes_access_log_s3_bucket_name",
            ColumnType::String,
            "Attributes.AccessLog.S3BucketName",
        ),
        Column::path(
            "attributes_access_log_s3_bucket_prefix",
            ColumnType::String,
            "Attributes.AccessLog.S3BucketPrefix",
        ),
        Column::path(
            "attributes_access_log_emit_interval",
            ColumnType::Int,
            "Attributes.AccessLog.EmitInterval",
        ),
        Column::path(
            "attributes_connection_settings_idle_timeout",
            ColumnType::Int,
            "Attributes.ConnectionSettings.IdleTimeout",
        ),
        Column::path(
            "attributes_cross_zone_load_balancing_enabled",
            ColumnType::Bool,
            "Attributes.CrossZoneLoadBalancing.Enabled",
        ),
        Column::path(
            "attributes_connection_draining_enabled",
            ColumnType::Bool,
            "Attributes.ConnectionDraining.Enabled",
        ),
        Column::path(
            "attributes_connection_draining_timeout",
            ColumnType::Int,
            "Attributes.ConnectionDraining.Timeout",
        ),
        Column::func(
            "attributes_additional_attributes",
            ColumnType::Json,
            resolve_additional_attributes,
        ),
        Column::new("tags", ColumnType::Json),
        Column::new("availability_zones", ColumnType::StringArray),
        Column::new("canonical_hosted_zone_name", ColumnType::String),
        Column::path(
            "canonical_hosted_zone_name_id",
            ColumnType::String,
            "CanonicalHostedZoneNameID",
        ),
        Column::new("created_time", ColumnType::Timestamp),
        Column::path("dns_name", ColumnType::String, "DNSName"),
        Column::path(
            "health_check_healthy_threshold",
            ColumnType::Int,
            "HealthCheck.HealthyThreshold",
        ),
        Column::path("health_check_interval", ColumnType::Int, "HealthCheck.Interval"),
        Column::path("health_check_target", ColumnType::String, "HealthCheck.Target"),
        Column::path("health_check_timeout", ColumnType::Int, "HealthCheck.Timeout"),
        Column::path(
            "health_check_unhealthy_threshold",
            ColumnType::Int,
            "HealthCheck.UnhealthyThreshold",
        ),
        Column::func("instances", ColumnType::StringArray, resolve_instances),
        Column::new("load_balancer_name", ColumnType::String),
        Column::path("other_policies", ColumnType::StringArray, "Policies.OtherPolicies"),
        Column::new("scheme", ColumnType::String),
        Column::new("security_groups", ColumnType::StringArray),
        Column::path(
            "source_security_group_name",
            ColumnType::String,
            "SourceSecurityGroup.GroupName",
        ),
        Column::path(
            "source_security_group_owner_alias",
            ColumnType::String,
            "SourceSecurityGroup.OwnerAlias",
        ),
        Column::new("subnets", ColumnType::StringArray),
        Column::path("vpc_id", ColumnType::String, "VPCId"),
    ]);

    Table::new("aws_elbv1_load_balancers", fetch_load_balancers)
        .columns(columns)
        .multiplex(Multiplexer::AccountRegion)
        .ignore_error(ignore_access_denied_service_disabled)
        .delete_filter(delete_account_region_filter)
        .relation(backend_server_descriptions())
        .relation(listeners())
        .relation(app_cookie_stickiness_policies())
        .relation(lb_cookie_stickiness_policies())
        .relation(policies())
}

fn backend_server_descriptions() -> Table<BackendServerDescription, LoadBalancer> {
    Table::new(
        "aws_elbv1_load_balancer_backend_server_descriptions",
        fetch_backend_server_descriptions,
    )
    .columns(vec![
        Column::parent_id("load_balancer_id"),
        Column::new("instance_port", ColumnType::Int),
        Column::new("policy_names", ColumnType::StringArray),
    ])
}

fn listeners() -> Table<ListenerDescription, LoadBalancer> {
    Table::new("aws_elbv1_load_balancer_listeners", fetch_listeners).columns(vec![
        Column::parent_id("load_balancer_id"),
        Column::path("listener_instance_port", ColumnType::Int, "Listener.InstancePort"),
        Column::path(
            "listener_load_balancer_port",
            ColumnType::Int,
            "Listener.LoadBalancerPort",
        ),
        Column::path("listener_protocol", ColumnType::String, "Listener.Protocol"),
        Column::path(
            "listener_instance_protocol",
            ColumnType::String,
            "Listener.InstanceProtocol",
        ),
        Column::path(
            "listener_ssl_certificate_id",
            ColumnType::String,
            "Listener.SSLCertificateId",
        ),
        Column::new("policy_names", ColumnType::StringArray),
    ])
}

fn app_cookie_stickiness_policies() -> Table<AppCookieStickinessPolicy, LoadBalancer> {
    Table::new(
        "aws_elbv1_load_balancer_policies_app_cookie_stickiness_policies",
        fetch_app_cookie_stickiness_policies,
    )
    .columns(vec![
        Column::parent_id("load_balancer_id"),
        Column::new("cookie_name", ColumnType::String),
        Column::new("policy_name", ColumnType::String),
    ])
}

fn lb_cookie_stickiness_policies() -> Table<LbCookieStickinessPolicy, LoadBalancer> {
    Table::new(
        "aws_elbv1_load_balancer_policies_lb_cookie_stickiness_policies",
        fetch_lb_cookie_stickiness_policies,
    )
    .columns(vec![
        Column::parent_id("load_balancer_id"),
        Column::new("cookie_expiration_period", ColumnType::BigInt),
        Column::new("policy_name", ColumnType::String),
    ])
}

fn policies() -> Table<PolicyDescription, LoadBalancer> {
    Table::new("aws_elbv1_load_balancer_policies", fetch_policies).columns(vec![
        Column::parent_id("load_balancer_id"),
        Column::func(
            "policy_attribute_descriptions",
            ColumnType::Json,
            resolve_policy_attribute_descriptions,
        ),
        Column::new("policy_name", ColumnType::String),
        Column::new("policy_type_name", ColumnType::String),
    ])
}

/// Pages of descriptions are tagged and described in windows of
/// [`TAG_BATCH_SIZE`]; a load balancer is only emitted once its whole window
/// is enriched.
fn fetch_load_balancers(
    ctx: FetchContext,
    _: Arc<()>,
    tx: ItemSender<LoadBalancer>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let stats = paginate_batched(
            &tx,
            TAG_BATCH_SIZE,
            |marker| {
                let ctx = ctx.clone();
                async move {
                    let output: DescribeLoadBalancersOutput = ctx
                        .call("elb", "DescribeLoadBalancers", &json!({ "Marker": marker }))
                        .await?;
                    Ok(Page::new(output.load_balancer_descriptions, output.next_marker))
                }
            },
            |batch: Vec<LoadBalancerDescription>| {
                let ctx = ctx.clone();
                async move { enrich_load_balancers(&ctx, batch).await }
            },
        )
        .await?;
        tracing::debug!(
            "load balancers [{}]: {} pages, {} tag batches",
            ctx.scope,
            stats.pages,
            stats.batches
        );
        Ok(())
    })
}

async fn enrich_load_balancers(
    ctx: &FetchContext,
    batch: Vec<LoadBalancerDescription>,
) -> Result<Vec<LoadBalancer>> {
    let names: Vec<String> = batch
        .iter()
        .filter_map(|lb| lb.load_balancer_name.clone())
        .collect();
    let tags: DescribeTagsOutput = ctx
        .call("elb", "DescribeTags", &json!({ "LoadBalancerNames": names }))
        .await?;

    let mut enriched = Vec::with_capacity(batch.len());
    for description in batch {
        let lb_tags = match description.load_balancer_name.as_deref() {
            Some(name) => tags.tags_for(name),
            None => Value::Object(Map::new()),
        };
        let attributes: DescribeLoadBalancerAttributesOutput = ctx
            .call(
                "elb",
                "DescribeLoadBalancerAttributes",
                &json!({ "LoadBalancerName": description.load_balancer_name }),
            )
            .await?;
        enriched.push(LoadBalancer {
            description,
            tags: lb_tags,
            attributes: attributes.load_balancer_attributes,
        });
    }
    Ok(enriched)
}

fn fetch_backend_server_descriptions(
    _: FetchContext,
    lb: Arc<LoadBalancer>,
    tx: ItemSender<BackendServerDescription>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        tx.send_all(lb.description.backend_server_descriptions.iter().cloned())
            .await
    })
}

fn fetch_listeners(
    _: FetchContext,
    lb: Arc<LoadBalancer>,
    tx: ItemSender<ListenerDescription>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        tx.send_all(lb.description.listener_descriptions.iter().cloned())
            .await
    })
}

fn fetch_app_cookie_stickiness_policies(
    _: FetchContext,
    lb: Arc<LoadBalancer>,
    tx: ItemSender<AppCookieStickinessPolicy>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let Some(policies) = &lb.description.policies else {
            return Ok(());
        };
        tx.send_all(policies.app_cookie_stickiness_policies.iter().cloned())
            .await
    })
}

fn fetch_lb_cookie_stickiness_policies(
    _: FetchContext,
    lb: Arc<LoadBalancer>,
    tx: ItemSender<LbCookieStickinessPolicy>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let Some(policies) = &lb.description.policies else {
            return Ok(());
        };
        tx.send_all(policies.lb_cookie_stickiness_policies.iter().cloned())
            .await
    })
}

fn fetch_policies(
    ctx: FetchContext,
    lb: Arc<LoadBalancer>,
    tx: ItemSender<PolicyDescription>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let output: DescribeLoadBalancerPoliciesOutput = ctx
            .call(
                "elb",
                "DescribeLoadBalancerPolicies",
                &json!({ "LoadBalancerName": lb.description.load_balancer_name }),
            )
            .await?;
        tx.send_all(output.policy_descriptions).await
    })
}

fn resolve_additional_attributes(_: &ResolveContext<'_>, lb: &LoadBalancer) -> Result<Value> {
    Ok(lb
        .attributes
        .as_ref()
        .map(|a| tags_map(&a.additional_attributes))
        .unwrap_or(Value::Null))
}

fn resolve_instances(_: &ResolveContext<'_>, lb: &LoadBalancer) -> Result<Value> {
    Ok(Value::Array(
        lb.description
            .instances
            .iter()
            .filter_map(|i| i.instance_id.clone())
            .map(Value::String)
            .collect(),
    ))
}

fn resolve_policy_attribute_descriptions(
    _: &ResolveContext<'_>,
    policy: &PolicyDescription,
) -> Result<Value> {
    Ok(pairs_to_map(policy.policy_attribute_descriptions.iter().map(|a| {
        (a.attribute_name.as_deref(), a.attribute_value.as_deref())
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapper_serializes_flat() {
        let lb = LoadBalancer {
            description: LoadBalancerDescription {
                load_balancer_name: Some("web".into()),
                dns_name: Some("web.elb.example".into()),
                ..LoadBalancerDescription::default()
            },
            tags: json!({"env": "prod"}),
            attributes: Some(LoadBalancerAttributes {
                connection_draining: Some(ConnectionDraining {
                    enabled: Some(true),
                    timeout: Some(300),
                }),
                ..LoadBalancerAttributes::default()
            }),
        };
        let doc = serde_json::to_value(&lb).unwrap();
        assert_eq!(doc["LoadBalancerName"], "web");
        assert_eq!(doc["DNSName"], "web.elb.example");
        assert_eq!(doc["Tags"]["env"], "prod");
        assert_eq!(doc["Attributes"]["ConnectionDraining"]["Timeout"], 300);
    }

    #[test]
    fn test_tags_for_unknown_name_is_empty() {
        let output = DescribeTagsOutput {
            tag_descriptions: vec![TagDescription {
                load_balancer_name: Some("a".into()),
                tags: vec![Tag {
                    key: Some("k".into()),
                    value: Some("v".into()),
                }],
            }],
        };
        assert_eq!(output.tags_for("a"), json!({"k": "v"}));
        assert_eq!(output.tags_for("b"), json!({}));
    }
}

//! Integration tests for the provider HTTP client using wiremock
//!
//! These tests verify the gateway client against mocked endpoints: request
//! shape, scope headers, authentication, and how error responses surface to
//! the engine.

use cloudinv::engine::{AccountRegions, Engine, MemorySink, RowSink, Scope};
use cloudinv::provider::{
    find_api_error, ignore_access_denied_service_disabled, ApiClient, Credentials, ProviderClient,
};
use cloudinv::tables;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{bearer_token, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, credentials: Credentials) -> ProviderClient {
    ProviderClient::new(&server.uri(), credentials, Duration::from_secs(5)).unwrap()
}

/// Test module for gateway client integration tests
mod provider_client_tests {
    use super::*;

    /// Successful call posts the input and returns parsed JSON
    #[tokio::test]
    async fn test_call_posts_input_with_scope_headers() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/cloudtrail/DescribeTrails"))
            .and(bearer_token("test-token"))
            .and(header("x-account-id", "123456789012"))
            .and(header("x-region", "us-east-1"))
            .and(body_json(json!({"IncludeShadowTrails": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "TrailList": [{"Name": "main", "TrailARN": "arn:aws:cloudtrail:us-east-1:123456789012:trail/main"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, Credentials::from_token("test-token"));
        let scope = Scope::account_region("123456789012", "us-east-1");
        let response = client
            .call(
                &scope,
                "cloudtrail",
                "DescribeTrails",
                json!({"IncludeShadowTrails": false}),
            )
            .await
            .expect("call should succeed");

        assert_eq!(response["TrailList"][0]["Name"], "main");
    }

    /// Anonymous credentials send no Authorization header
    #[tokio::test]
    async fn test_anonymous_call_has_no_authorization() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ec2/GetEbsEncryptionByDefault"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"EbsEncryptionByDefault": true})),
            )
            .mount(&server)
            .await;

        let client = client(&server, Credentials::anonymous());
        let response = client
            .call(
                &Scope::account("1"),
                "ec2",
                "GetEbsEncryptionByDefault",
                json!({}),
            )
            .await
            .unwrap();
        assert_eq!(response["EbsEncryptionByDefault"], true);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));
        assert!(!requests[0].headers.contains_key("x-region"));
    }

    /// Empty response body is returned as null
    #[tokio::test]
    async fn test_empty_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ecs/ListClusters"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client(&server, Credentials::anonymous());
        let response = client
            .call(&Scope::default(), "ecs", "ListClusters", json!({}))
            .await
            .unwrap();
        assert!(response.is_null());
    }

    /// Error envelopes surface as ApiError with the provider's code
    #[tokio::test]
    async fn test_error_code_is_parsed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/directconnect/DescribeVirtualGateways"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "__type": "com.amazonaws.directconnect#UnrecognizedClientException",
                "message": "The security token included in the request is invalid"
            })))
            .mount(&server)
            .await;

        let client = client(&server, Credentials::anonymous());
        let err = client
            .call(
                &Scope::account_region("1", "eu-west-1"),
                "directconnect",
                "DescribeVirtualGateways",
                json!({}),
            )
            .await
            .unwrap_err();

        let api = find_api_error(&err).expect("should carry an ApiError");
        assert_eq!(api.status, 400);
        assert_eq!(api.code, "UnrecognizedClientException");
        assert!(ignore_access_denied_service_disabled(&err));
        assert!(format!("{:#}", err).contains("directconnect.DescribeVirtualGateways"));
    }

    /// Server errors are not ignorable
    #[tokio::test]
    async fn test_server_error_is_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ecs/ListClusters"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>down</html>"))
            .mount(&server)
            .await;

        let client = client(&server, Credentials::anonymous());
        let err = client
            .call(&Scope::account("1"), "ecs", "ListClusters", json!({}))
            .await
            .unwrap_err();

        assert_eq!(find_api_error(&err).unwrap().code, "ServiceUnavailable");
        assert!(!ignore_access_denied_service_disabled(&err));
    }

    /// A 401 after the token file was rotated re-reads the file and retries once
    #[tokio::test]
    async fn test_rotated_token_file_is_reread_on_unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ecs/ListClusters"))
            .and(bearer_token("old-token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "__type": "ExpiredTokenException",
                "message": "The security token included in the request is expired"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/ecs/ListClusters"))
            .and(bearer_token("new-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ClusterArns": ["arn:c1"]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "old-token\n").unwrap();
        let credentials = Credentials::from_file(file.path());
        assert_eq!(
            credentials.get_token().await.unwrap().as_deref(),
            Some("old-token")
        );

        std::fs::write(file.path(), "new-token\n").unwrap();
        let client = client(&server, credentials);
        let response = client
            .call(&Scope::account("1"), "ecs", "ListClusters", json!({}))
            .await
            .expect("retry with the rotated token should succeed");

        assert_eq!(response["ClusterArns"][0], "arn:c1");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    /// A fixed token that is rejected is not retried
    #[tokio::test]
    async fn test_unauthorized_static_token_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ecs/ListClusters"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "__type": "UnrecognizedClientException",
                "message": "invalid token"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, Credentials::from_token("bad-token"));
        let err = client
            .call(&Scope::account("1"), "ecs", "ListClusters", json!({}))
            .await
            .unwrap_err();

        assert_eq!(find_api_error(&err).unwrap().status, 401);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    /// Malformed success body is an error
    #[tokio::test]
    async fn test_malformed_json_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ecs/ListClusters"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let client = client(&server, Credentials::anonymous());
        let result = client
            .call(&Scope::account("1"), "ecs", "ListClusters", json!({}))
            .await;
        assert!(result.is_err());
    }
}

/// End-to-end table syncs through the HTTP client
mod engine_over_http_tests {
    use super::*;

    /// Pagination tokens are sent back to the gateway until exhausted
    #[tokio::test]
    async fn test_vpc_peering_connections_paginate() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ec2/DescribeVpcPeeringConnections"))
            .and(body_json(json!({"NextToken": null})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "VpcPeeringConnections": [{"VpcPeeringConnectionId": "pcx-1"}],
                "NextToken": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/ec2/DescribeVpcPeeringConnections"))
            .and(body_json(json!({"NextToken": "page-2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "VpcPeeringConnections": [
                    {"VpcPeeringConnectionId": "pcx-2"},
                    {"VpcPeeringConnectionId": "pcx-3"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::new());
        let engine = Engine::new(
            Arc::new(client(&server, Credentials::from_token("t"))),
            Arc::clone(&sink) as Arc<dyn RowSink>,
            vec![AccountRegions::new("111", vec!["us-east-1".into()])],
        );

        let table = tables::get_table("aws_ec2_vpc_peering_connections").unwrap();
        let summary = engine.sync(&[table]).await;

        assert!(summary.is_success(), "{:?}", summary.tables);
        let rows = sink.rows_for("aws_ec2_vpc_peering_connections");
        let ids: Vec<_> = rows.iter().map(|r| r.values["vpc_peering_connection_id"].clone()).collect();
        assert_eq!(ids, vec![json!("pcx-1"), json!("pcx-2"), json!("pcx-3")]);
        assert!(rows.iter().all(|r| r.values["account_id"] == "111"));
        assert!(rows.iter().all(|r| r.values["region"] == "us-east-1"));
    }

    /// Access denied in one region yields no rows and no failure
    #[tokio::test]
    async fn test_access_denied_region_is_skipped() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/directconnect/DescribeVirtualGateways"))
            .and(header("x-region", "ap-east-1"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "__type": "AccessDeniedException",
                "message": "not enabled"
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/directconnect/DescribeVirtualGateways"))
            .and(header("x-region", "us-east-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "VirtualGateways": [{"VirtualGatewayId": "vgw-1", "VirtualGatewayState": "available"}]
            })))
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::new());
        let engine = Engine::new(
            Arc::new(client(&server, Credentials::anonymous())),
            Arc::clone(&sink) as Arc<dyn RowSink>,
            vec![AccountRegions::new(
                "111",
                vec!["us-east-1".into(), "ap-east-1".into()],
            )],
        );

        let table = tables::get_table("aws_directconnect_virtual_gateways").unwrap();
        let summary = engine.sync(&[table]).await;

        assert!(summary.is_success());
        assert_eq!(summary.tables[0].scopes, 2);
        assert_eq!(summary.tables[0].report.ignored, 1);
        let rows = sink.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values["region"], "us-east-1");
    }

    /// Non-ignorable errors are reported as failures
    #[tokio::test]
    async fn test_throttling_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/directconnect/DescribeVirtualGateways"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "__type": "ThrottlingException",
                "message": "Rate exceeded"
            })))
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::new());
        let engine = Engine::new(
            Arc::new(client(&server, Credentials::anonymous())),
            Arc::clone(&sink) as Arc<dyn RowSink>,
            vec![AccountRegions::new("111", vec!["us-east-1".into()])],
        );

        let table = tables::get_table("aws_directconnect_virtual_gateways").unwrap();
        let summary = engine.sync(&[table]).await;

        assert!(!summary.is_success());
        let failures: Vec<_> = summary.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(
            find_api_error(&failures[0].error).unwrap().code,
            "ThrottlingException"
        );
        assert!(sink.is_empty());
    }
}

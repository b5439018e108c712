use chrono::{Duration, TimeZone, Utc};
use mockito::Matcher;
use serde_json::json;
use siem_alerts::{
    config::{AcumenElasticConfig, DatadogConfig, ElasticConfig},
    models::{AlertQuery, AlertSeverity},
    siem::{
        acumen_elastic::AcumenElasticClient,
        datadog::{DatadogClient, SIGNALS_SEARCH_PATH as DATADOG_PATH},
        elastic::{ElasticClient, SIGNALS_SEARCH_PATH as ELASTIC_PATH},
    },
    acumen_list_elastic_alerts, list_datadog_alerts, list_elastic_alerts, AppError,
};

fn query() -> AlertQuery {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    AlertQuery::new(start, start + Duration::hours(1))
}

fn datadog_signal(id: &str, severity: &str) -> serde_json::Value {
    json!({
        "id": id,
        "type": "signal",
        "attributes": {
            "timestamp": "2024-03-01T00:30:00.000Z",
            "message": "Signal message",
            "tags": ["env:prod"],
            "attributes": {
                "status": severity,
                "workflow": {
                    "rule": { "id": "rule-1", "name": "Impossible travel" },
                    "triage": { "state": "open" }
                }
            }
        }
    })
}

/// Datadog requests carry both keys and the window filter
#[tokio::test]
async fn test_datadog_list_alerts() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", DATADOG_PATH)
        .match_header("DD-API-KEY", "api-key")
        .match_header("DD-APPLICATION-KEY", "app-key")
        .match_body(Matcher::PartialJson(json!({
            "filter": {
                "from": "2024-03-01T00:00:00.000Z",
                "to": "2024-03-01T01:00:00.000Z",
                "query": "source:cloudtrail"
            },
            "page": { "limit": 100 },
            "sort": "timestamp"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "data": [datadog_signal("sig-1", "critical")] }).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = DatadogClient::new(
        server.url(),
        "api-key".to_string(),
        "app-key".to_string(),
        5,
    )
    .unwrap();
    let alerts = client
        .list_alerts(&query().with_filter("source:cloudtrail"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].external_id, "sig-1");
    assert_eq!(alerts[0].source, "datadog");
    assert_eq!(alerts[0].title, "Impossible travel");
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    assert!(alerts[0].is_urgent());
}

/// Cursor pagination stops once the limit is reached
#[tokio::test]
async fn test_datadog_pagination_truncates_to_limit() {
    let mut server = mockito::Server::new_async().await;
    let first_page = server
        .mock("POST", DATADOG_PATH)
        .match_body(Matcher::PartialJson(json!({ "page": { "limit": 3 } })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": [datadog_signal("a", "low"), datadog_signal("b", "low")],
                "meta": { "page": { "after": "cursor-1" } }
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let second_page = server
        .mock("POST", DATADOG_PATH)
        .match_body(Matcher::PartialJson(
            json!({ "page": { "limit": 1, "cursor": "cursor-1" } }),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": [datadog_signal("c", "low"), datadog_signal("d", "low")],
                "meta": { "page": { "after": "cursor-2" } }
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let client = DatadogClient::new(server.url(), "k".to_string(), "a".to_string(), 5).unwrap();
    let signals = client.search_signals(&query().with_limit(3)).await.unwrap();

    first_page.assert_async().await;
    second_page.assert_async().await;
    let ids: Vec<&str> = signals.iter().filter_map(|s| s["id"].as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

/// An empty page ends pagination even when a cursor is returned
#[tokio::test]
async fn test_datadog_empty_page_stops() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", DATADOG_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "data": [], "meta": { "page": { "after": "again" } } }).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = DatadogClient::new(server.url(), "k".to_string(), "a".to_string(), 5).unwrap();
    let alerts = client.list_alerts(&query()).await.unwrap();

    mock.assert_async().await;
    assert!(alerts.is_empty());
}

/// HTTP failures map onto error variants
#[tokio::test]
async fn test_datadog_error_mapping() {
    let cases = vec![
        (401, "AUTHENTICATION_ERROR"),
        (403, "AUTHORIZATION_ERROR"),
        (429, "RATE_LIMIT_EXCEEDED"),
        (500, "INTEGRATION_ERROR"),
    ];

    for (status, expected_code) in cases {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", DATADOG_PATH)
            .with_status(status)
            .with_body(r#"{"errors":["nope"]}"#)
            .create_async()
            .await;

        let client =
            DatadogClient::new(server.url(), "k".to_string(), "a".to_string(), 5).unwrap();
        let err = client.list_alerts(&query()).await.unwrap_err();
        assert_eq!(err.error_code(), expected_code, "status {}", status);
    }
}

/// Invalid queries fail before any request is sent
#[tokio::test]
async fn test_invalid_query_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let q = query();
    let inverted = AlertQuery::new(q.end_time, q.start_time);

    let datadog = DatadogClient::new(server.url(), "k".to_string(), "a".to_string(), 5).unwrap();
    assert!(matches!(
        datadog.list_alerts(&inverted).await,
        Err(AppError::Validation(_))
    ));

    let elastic = ElasticClient::new(server.url(), "k".to_string(), 5).unwrap();
    assert!(matches!(
        elastic.list_alerts(&q.with_limit(0)).await,
        Err(AppError::Validation(_))
    ));

    mock.assert_async().await;
}

/// The exported Datadog function reads keys from the configured env vars
#[tokio::test]
async fn test_list_datadog_alerts_from_config() {
    std::env::set_var("IT_DATADOG_API_KEY", "env-api-key");
    std::env::set_var("IT_DATADOG_APP_KEY", "env-app-key");

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", DATADOG_PATH)
        .match_header("DD-API-KEY", "env-api-key")
        .match_header("DD-APPLICATION-KEY", "env-app-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "data": [datadog_signal("x", "medium")] }).to_string())
        .create_async()
        .await;

    let config = DatadogConfig {
        api_url: Some(server.url()),
        api_key_env: "IT_DATADOG_API_KEY".to_string(),
        app_key_env: "IT_DATADOG_APP_KEY".to_string(),
        ..DatadogConfig::default()
    };

    let alerts = list_datadog_alerts(&config, &query()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Medium);
}

/// Missing credentials are a configuration error
#[tokio::test]
async fn test_list_datadog_alerts_missing_credentials() {
    let config = DatadogConfig {
        api_url: Some("http://127.0.0.1:9".to_string()),
        api_key_env: "IT_DATADOG_UNSET_API_KEY".to_string(),
        app_key_env: "IT_DATADOG_UNSET_APP_KEY".to_string(),
        ..DatadogConfig::default()
    };

    let result = list_datadog_alerts(&config, &query()).await;
    assert!(matches!(result, Err(AppError::Configuration(_))));
}

/// Kibana requests use the ApiKey scheme and the xsrf header
#[tokio::test]
async fn test_list_elastic_alerts() {
    std::env::set_var("IT_ELASTIC_API_KEY", "elastic-key");

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", ELASTIC_PATH)
        .match_header("kbn-xsrf", "kibana")
        .match_header("authorization", "ApiKey elastic-key")
        .match_body(Matcher::PartialJson(json!({
            "size": 100,
            "query": { "bool": { "filter": [{
                "range": { "@timestamp": {
                    "gte": "2024-03-01T00:00:00.000Z",
                    "lte": "2024-03-01T01:00:00.000Z"
                } }
            }] } }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "hits": {
                    "total": { "value": 2 },
                    "hits": [
                        {
                            "_id": "e-1",
                            "_index": ".internal.alerts-security.alerts-default-000001",
                            "_source": {
                                "@timestamp": "2024-03-01T00:10:00.000Z",
                                "kibana.alert.rule.name": "Credential dumping",
                                "kibana.alert.severity": "high",
                                "kibana.alert.workflow_status": "open"
                            }
                        },
                        {
                            "_id": "e-2",
                            "_source": {
                                "@timestamp": "2024-03-01T00:20:00.000Z",
                                "kibana": {
                                    "alert": {
                                        "rule": { "name": "Nested rule" },
                                        "risk_score": 21
                                    }
                                }
                            }
                        }
                    ]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let config = ElasticConfig {
        kibana_url: server.url(),
        api_key_env: "IT_ELASTIC_API_KEY".to_string(),
        timeout_secs: 5,
    };

    let alerts = list_elastic_alerts(&config, &query()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].external_id, "e-1");
    assert_eq!(alerts[0].title, "Credential dumping");
    assert_eq!(alerts[0].severity, AlertSeverity::High);
    assert_eq!(alerts[1].title, "Nested rule");
    assert_eq!(alerts[1].severity, AlertSeverity::Low);
    assert!(alerts.iter().all(|a| a.source == "elastic"));
}

/// A malformed body surfaces as a serialization error
#[tokio::test]
async fn test_elastic_invalid_json() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", ELASTIC_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("<html>login</html>")
        .create_async()
        .await;

    let client = ElasticClient::new(server.url(), "k".to_string(), 5).unwrap();
    let result = client.list_alerts(&query()).await;
    assert!(matches!(result, Err(AppError::Serialization(_))));
}

/// Acumen searches the alerts index directly with basic auth and status filters
#[tokio::test]
async fn test_acumen_list_elastic_alerts() {
    std::env::set_var("IT_ACUMEN_USERNAME", "analyst");
    std::env::set_var("IT_ACUMEN_PASSWORD", "pw");

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/.alerts-security.alerts-acme/_search")
        .match_header("authorization", "Basic YW5hbHlzdDpwdw==")
        .match_body(Matcher::PartialJson(json!({
            "query": { "bool": { "filter": [
                { "range": { "@timestamp": {
                    "gte": "2024-03-01T00:00:00.000Z",
                    "lte": "2024-03-01T01:00:00.000Z"
                } } },
                { "terms": { "kibana.alert.workflow_status": ["open"] } }
            ] } }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "hits": { "hits": [{
                    "_id": "ac-1",
                    "_source": {
                        "@timestamp": "2024-03-01T00:45:00.000Z",
                        "kibana.alert.rule.name": "Suspicious PowerShell",
                        "kibana.alert.severity": "medium",
                        "kibana.alert.workflow_status": "open"
                    }
                }] }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let config = AcumenElasticConfig {
        elasticsearch_url: server.url(),
        index: ".alerts-security.alerts-acme".to_string(),
        tenant: Some("acme".to_string()),
        statuses: vec!["open".to_string()],
        username_env: "IT_ACUMEN_USERNAME".to_string(),
        password_env: "IT_ACUMEN_PASSWORD".to_string(),
        timeout_secs: 5,
    };

    let alerts = acumen_list_elastic_alerts(&config, &query()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].source, "acumen_elastic");
    assert_eq!(alerts[0].title, "Suspicious PowerShell");
    assert_eq!(alerts[0].labels.get("tenant").map(String::as_str), Some("acme"));
}

/// Acumen credential rejection is an authentication error
#[tokio::test]
async fn test_acumen_unauthorized() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/.alerts-security.alerts-default/_search")
        .with_status(401)
        .create_async()
        .await;

    let config = AcumenElasticConfig {
        elasticsearch_url: server.url(),
        index: ".alerts-security.alerts-default".to_string(),
        tenant: None,
        statuses: Vec::new(),
        username_env: "UNUSED".to_string(),
        password_env: "UNUSED".to_string(),
        timeout_secs: 5,
    };

    let client =
        AcumenElasticClient::new(&config, "analyst".to_string(), "wrong".to_string()).unwrap();
    let result = client.list_alerts(&query()).await;
    assert!(matches!(result, Err(AppError::Authentication(_))));
}

/// A server that accepts but never answers trips the client timeout
#[tokio::test]
async fn test_request_timeout() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let client = DatadogClient::new(
        format!("http://{}", addr),
        "k".to_string(),
        "a".to_string(),
        1,
    )
    .unwrap();
    let result = client.list_alerts(&query()).await;

    server.abort();
    assert!(
        matches!(result, Err(AppError::Timeout(_))),
        "got {:?}",
        result.err()
    );
}

/// A refused connection is a network error
#[tokio::test]
async fn test_connection_refused() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let client = ElasticClient::new(format!("http://{}", addr), "k".to_string(), 5).unwrap();
    let result = client.list_alerts(&query()).await;

    assert!(
        matches!(result, Err(AppError::Network(_))),
        "got {:?}",
        result.err()
    );
}

use super::http::{build_client, read_json};
use super::normalize::{
    first_number, first_string, lookup, parse_timestamp, string_list, UNTITLED,
};
use crate::config::{read_secret, ElasticConfig};
use crate::error::{AppError, Result};
use crate::models::{AlertQuery, AlertSeverity, SiemAlert};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};
use validator::Validate;

pub const SOURCE_NAME: &str = "elastic";

/// Kibana detection engine signals search endpoint
pub const SIGNALS_SEARCH_PATH: &str = "/api/detection_engine/signals/search";

/// Kibana detection engine client
#[derive(Clone)]
pub struct ElasticClient {
    pub(crate) kibana_url: String,
    pub(crate) api_key: String,
    pub(crate) client: Client,
}

impl ElasticClient {
    /// Create a new Kibana client
    pub fn new(kibana_url: impl Into<String>, api_key: String, timeout_secs: u64) -> Result<Self> {
        if api_key.is_empty() {
            return Err(AppError::Configuration(
                "Elastic API key cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            kibana_url: kibana_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: build_client(timeout_secs)?,
        })
    }

    /// Create a client from configuration, reading the API key from the environment
    pub fn from_config(config: &ElasticConfig) -> Result<Self> {
        let api_key = read_secret(&config.api_key_env)?;
        Self::new(config.kibana_url.clone(), api_key, config.timeout_secs)
    }

    /// Fetch raw detection alert hits
    pub async fn search_signals(&self, query: &AlertQuery) -> Result<Vec<Value>> {
        query.validate()?;

        let response = self
            .client
            .post(format!("{}{}", self.kibana_url, SIGNALS_SEARCH_PATH))
            .header("kbn-xsrf", "kibana")
            .header("Authorization", format!("ApiKey {}", self.api_key))
            .json(&build_search_body(query, Vec::new()))
            .send()
            .await?;

        let body = read_json(SOURCE_NAME, response).await?;
        let hits = extract_hits(body);

        debug!(backend = SOURCE_NAME, hits = hits.len(), "Fetched Kibana alert hits");
        Ok(hits)
    }

    /// Fetch and normalize detection alerts
    pub async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<SiemAlert>> {
        let received_at = Utc::now();
        let alerts: Vec<SiemAlert> = self
            .search_signals(query)
            .await?
            .into_iter()
            .map(|hit| normalize_hit(hit, SOURCE_NAME, received_at))
            .collect();

        info!(
            backend = SOURCE_NAME,
            count = alerts.len(),
            start = %query.start_time,
            end = %query.end_time,
            "Listed Elastic alerts"
        );

        Ok(alerts)
    }
}

/// List Elastic Security detection alerts in the query window
pub async fn list_elastic_alerts(
    config: &ElasticConfig,
    query: &AlertQuery,
) -> Result<Vec<SiemAlert>> {
    ElasticClient::from_config(config)?.list_alerts(query).await
}

/// Build an Elasticsearch query DSL body for the window, newest first
pub(crate) fn build_search_body(query: &AlertQuery, extra_filters: Vec<Value>) -> Value {
    let mut filters = vec![json!({
        "range": {
            "@timestamp": {
                "gte": query.start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
                "lte": query.end_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            }
        }
    })];
    filters.extend(extra_filters);

    let mut bool_query = json!({ "filter": filters });
    if let Some(filter) = &query.filter {
        bool_query["must"] = json!([{ "query_string": { "query": filter } }]);
    }

    json!({
        "size": query.limit,
        "sort": [{ "@timestamp": { "order": "desc" } }],
        "query": { "bool": bool_query },
    })
}

/// Take `hits.hits` out of a search response
pub(crate) fn extract_hits(mut body: Value) -> Vec<Value> {
    match body.pointer_mut("/hits/hits").map(Value::take) {
        Some(Value::Array(hits)) => hits,
        _ => Vec::new(),
    }
}

/// Normalize a search hit, accepting 8.x `kibana.alert.*` and legacy `signal.*` fields
pub(crate) fn normalize_hit(
    hit: Value,
    source_name: &str,
    received_at: DateTime<Utc>,
) -> SiemAlert {
    let doc = hit.get("_source").unwrap_or(&hit);

    let external_id = first_string(&hit, &["_id"])
        .or_else(|| first_string(doc, &["kibana.alert.uuid", "signal.id"]))
        .unwrap_or_default();

    let title = first_string(
        doc,
        &["kibana.alert.rule.name", "signal.rule.name", "kibana.alert.reason", "message"],
    )
    .unwrap_or_else(|| UNTITLED.to_string());

    let severity = first_string(doc, &["kibana.alert.severity", "signal.rule.severity"])
        .map(|s| AlertSeverity::from_vendor(&s))
        .or_else(|| {
            first_number(doc, &["kibana.alert.risk_score", "signal.rule.risk_score"])
                .map(AlertSeverity::from_risk_score)
        })
        .unwrap_or(AlertSeverity::Info);

    let mut alert = SiemAlert::new(
        external_id,
        source_name.to_string(),
        title,
        severity,
        Value::Null,
    );
    alert.received_at = received_at;
    alert.timestamp = parse_timestamp(lookup(doc, "@timestamp")).unwrap_or(received_at);
    alert.status = first_string(doc, &["kibana.alert.workflow_status", "signal.status"]);
    alert.rule_id = first_string(
        doc,
        &["kibana.alert.rule.uuid", "kibana.alert.rule.rule_id", "signal.rule.id"],
    );
    alert.tags = string_list(
        lookup(doc, "kibana.alert.rule.tags").or_else(|| lookup(doc, "signal.rule.tags")),
    );

    if let Some(index) = first_string(&hit, &["_index"]) {
        alert.labels.insert("index".to_string(), index);
    }
    for (label, path) in [("host", "host.name"), ("user", "user.name")] {
        if let Some(value) = first_string(doc, &[path]) {
            alert.labels.insert(label.to_string(), value);
        }
    }

    alert.raw = hit;
    alert
}

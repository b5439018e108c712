use super::http::{build_client, read_json};
use super::normalize::{first_string, parse_timestamp, string_list, UNTITLED};
use crate::config::{read_secret, DatadogConfig};
use crate::error::{AppError, Result};
use crate::models::{AlertQuery, AlertSeverity, SiemAlert};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use validator::Validate;

pub const SOURCE_NAME: &str = "datadog";

/// Security Monitoring signals search endpoint
pub const SIGNALS_SEARCH_PATH: &str = "/api/v2/security_monitoring/signals/search";

/// Datadog Security Monitoring client
#[derive(Clone)]
pub struct DatadogClient {
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) app_key: String,
    pub(crate) client: Client,
}

#[derive(Debug, Serialize)]
struct SignalSearchRequest {
    filter: SignalFilter,
    page: SignalPage,
    sort: &'static str,
}

#[derive(Debug, Serialize)]
struct SignalFilter {
    from: String,
    to: String,
    query: String,
}

#[derive(Debug, Serialize)]
struct SignalPage {
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignalSearchResponse {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    meta: Option<SignalMeta>,
}

#[derive(Debug, Deserialize)]
struct SignalMeta {
    #[serde(default)]
    page: Option<SignalMetaPage>,
}

#[derive(Debug, Deserialize)]
struct SignalMetaPage {
    #[serde(default)]
    after: Option<String>,
}

impl DatadogClient {
    /// Create a new Datadog client
    pub fn new(
        base_url: impl Into<String>,
        api_key: String,
        app_key: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        if api_key.is_empty() || app_key.is_empty() {
            return Err(AppError::Configuration(
                "Datadog API and application keys cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            app_key,
            client: build_client(timeout_secs)?,
        })
    }

    /// Create a client from configuration, reading keys from the environment
    pub fn from_config(config: &DatadogConfig) -> Result<Self> {
        let api_key = read_secret(&config.api_key_env)?;
        let app_key = read_secret(&config.app_key_env)?;
        Self::new(config.base_url(), api_key, app_key, config.timeout_secs)
    }

    /// Fetch raw security signals, following cursors until `limit` is reached
    pub async fn search_signals(&self, query: &AlertQuery) -> Result<Vec<Value>> {
        query.validate()?;

        let mut signals = Vec::new();
        let mut cursor = None;

        loop {
            let request = SignalSearchRequest {
                filter: SignalFilter {
                    from: format_time(query.start_time),
                    to: format_time(query.end_time),
                    query: query.filter.clone().unwrap_or_else(|| "*".to_string()),
                },
                page: SignalPage {
                    limit: query.limit - signals.len(),
                    cursor: cursor.take(),
                },
                sort: "timestamp",
            };

            let page = self.send_search(&request).await?;
            let page_len = page.data.len();
            signals.extend(page.data);

            debug!(
                backend = SOURCE_NAME,
                page_len = page_len,
                total = signals.len(),
                "Fetched Datadog signal page"
            );

            match page.meta.and_then(|m| m.page).and_then(|p| p.after) {
                Some(after) if page_len > 0 && signals.len() < query.limit => cursor = Some(after),
                _ => break,
            }
        }

        signals.truncate(query.limit);
        Ok(signals)
    }

    /// Fetch and normalize security signals
    pub async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<SiemAlert>> {
        let received_at = Utc::now();
        let alerts: Vec<SiemAlert> = self
            .search_signals(query)
            .await?
            .into_iter()
            .map(|signal| normalize_signal(signal, received_at))
            .collect();

        info!(
            backend = SOURCE_NAME,
            count = alerts.len(),
            start = %query.start_time,
            end = %query.end_time,
            "Listed Datadog alerts"
        );

        Ok(alerts)
    }

    async fn send_search(&self, request: &SignalSearchRequest) -> Result<SignalSearchResponse> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, SIGNALS_SEARCH_PATH))
            .header("DD-API-KEY", &self.api_key)
            .header("DD-APPLICATION-KEY", &self.app_key)
            .json(request)
            .send()
            .await?;

        let body = read_json(SOURCE_NAME, response).await?;
        Ok(serde_json::from_value(body)?)
    }
}

/// List Datadog security signals in the query window
pub async fn list_datadog_alerts(
    config: &DatadogConfig,
    query: &AlertQuery,
) -> Result<Vec<SiemAlert>> {
    DatadogClient::from_config(config)?.list_alerts(query).await
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize a signal from the search response
fn normalize_signal(signal: Value, received_at: DateTime<Utc>) -> SiemAlert {
    let external_id = first_string(&signal, &["id"]).unwrap_or_default();

    let title = first_string(
        &signal,
        &[
            "attributes.attributes.title",
            "attributes.attributes.workflow.rule.name",
        ],
    )
    .or_else(|| {
        first_string(&signal, &["attributes.message"])
            .and_then(|message| message.lines().next().map(|line| line.trim().to_string()))
            .filter(|line| !line.is_empty())
    })
    .unwrap_or_else(|| UNTITLED.to_string());

    let severity = first_string(&signal, &["attributes.attributes.status"])
        .map(|s| AlertSeverity::from_vendor(&s))
        .unwrap_or(AlertSeverity::Info);

    let mut alert = SiemAlert::new(
        external_id,
        SOURCE_NAME.to_string(),
        title,
        severity,
        Value::Null,
    );
    alert.received_at = received_at;
    alert.timestamp =
        parse_timestamp(signal.pointer("/attributes/timestamp")).unwrap_or(received_at);
    alert.status = first_string(&signal, &["attributes.attributes.workflow.triage.state"]);
    alert.rule_id = first_string(&signal, &["attributes.attributes.workflow.rule.id"]);
    alert.tags = string_list(signal.pointer("/attributes/tags"));
    if let Some(rule_name) = first_string(&signal, &["attributes.attributes.workflow.rule.name"]) {
        alert.labels.insert("rule_name".to_string(), rule_name);
    }
    alert.raw = signal;
    alert
}

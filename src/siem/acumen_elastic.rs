//! Acumen tenant variant of the Elastic integration.
//!
//! Acumen runs a managed Elasticsearch cluster without Kibana API access, so alerts
//! are read straight from the security alerts index using basic auth and narrowed
//! to the configured workflow statuses.

use super::elastic::{build_search_body, extract_hits, normalize_hit};
use super::http::{build_client, read_json};
use crate::config::{read_secret, AcumenElasticConfig};
use crate::error::{AppError, Result};
use crate::models::{AlertQuery, SiemAlert};
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};
use validator::Validate;

pub const SOURCE_NAME: &str = "acumen_elastic";

/// Acumen Elasticsearch alerts client
#[derive(Clone)]
pub struct AcumenElasticClient {
    pub(crate) search_url: String,
    pub(crate) tenant: Option<String>,
    pub(crate) statuses: Vec<String>,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) client: Client,
}

impl AcumenElasticClient {
    /// Create a new client with explicit credentials
    pub fn new(config: &AcumenElasticConfig, username: String, password: String) -> Result<Self> {
        if username.is_empty() {
            return Err(AppError::Configuration(
                "Acumen Elasticsearch username cannot be empty".to_string(),
            ));
        }
        if config.index.trim().is_empty() {
            return Err(AppError::Configuration(
                "Acumen alerts index cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            search_url: format!(
                "{}/{}/_search",
                config.elasticsearch_url.trim_end_matches('/'),
                config.index.trim()
            ),
            tenant: config.tenant.clone(),
            statuses: config.statuses.clone(),
            username,
            password,
            client: build_client(config.timeout_secs)?,
        })
    }

    /// Create a client from configuration, reading credentials from the environment
    pub fn from_config(config: &AcumenElasticConfig) -> Result<Self> {
        let username = read_secret(&config.username_env)?;
        let password = read_secret(&config.password_env)?;
        Self::new(config, username, password)
    }

    /// Fetch raw alert hits from the alerts index
    pub async fn search_alerts(&self, query: &AlertQuery) -> Result<Vec<Value>> {
        query.validate()?;

        let response = self
            .client
            .post(&self.search_url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&build_search_body(query, self.status_filters()))
            .send()
            .await?;

        let body = read_json(SOURCE_NAME, response).await?;
        let hits = extract_hits(body);

        debug!(
            backend = SOURCE_NAME,
            tenant = ?self.tenant,
            hits = hits.len(),
            "Fetched Acumen alert hits"
        );
        Ok(hits)
    }

    /// Fetch and normalize alerts, labelled with the tenant
    pub async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<SiemAlert>> {
        let received_at = Utc::now();
        let alerts: Vec<SiemAlert> = self
            .search_alerts(query)
            .await?
            .into_iter()
            .map(|hit| {
                let mut alert = normalize_hit(hit, SOURCE_NAME, received_at);
                if let Some(tenant) = &self.tenant {
                    alert.labels.insert("tenant".to_string(), tenant.clone());
                }
                alert
            })
            .collect();

        info!(
            backend = SOURCE_NAME,
            tenant = ?self.tenant,
            count = alerts.len(),
            "Listed Acumen Elastic alerts"
        );

        Ok(alerts)
    }

    fn status_filters(&self) -> Vec<Value> {
        if self.statuses.is_empty() {
            return Vec::new();
        }
        vec![json!({ "terms": { "kibana.alert.workflow_status": self.statuses } })]
    }
}

/// List alerts for the Acumen tenant in the query window
pub async fn acumen_list_elastic_alerts(
    config: &AcumenElasticConfig,
    query: &AlertQuery,
) -> Result<Vec<SiemAlert>> {
    AcumenElasticClient::from_config(config)?
        .list_alerts(query)
        .await
}

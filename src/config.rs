use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiemConfig {
    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Datadog Security Monitoring
    #[serde(default)]
    pub datadog: Option<DatadogConfig>,

    /// Kibana detection engine
    #[serde(default)]
    pub elastic: Option<ElasticConfig>,

    /// Acumen managed Elasticsearch
    #[serde(default)]
    pub acumen_elastic: Option<AcumenElasticConfig>,
}

impl SiemConfig {
    /// Load configuration from the embedded defaults, an optional file and the environment.
    ///
    /// An explicit `path` must exist. Without one, `SIEM_CONFIG_PATH` (or `config/siem.toml`)
    /// is read when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_source = match path {
            Some(path) => config::File::from(path).required(true),
            None => {
                let config_path = std::env::var("SIEM_CONFIG_PATH")
                    .unwrap_or_else(|_| "config/siem.toml".to_string());
                config::File::with_name(&config_path).required(false)
            }
        };

        let config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(file_source)
            // Override with environment variables (e.g. SIEM_DATADOG__SITE)
            .add_source(
                config::Environment::with_prefix("SIEM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatadogConfig {
    /// Datadog site, e.g. `datadoghq.com` or `datadoghq.eu`
    #[serde(default = "default_datadog_site")]
    pub site: String,

    /// Explicit API base URL, overrides `site`
    #[serde(default)]
    pub api_url: Option<String>,

    /// API key (from env var)
    #[serde(default = "default_datadog_api_key_env")]
    pub api_key_env: String,

    /// Application key (from env var)
    #[serde(default = "default_datadog_app_key_env")]
    pub app_key_env: String,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl DatadogConfig {
    /// Base URL requests are sent to
    pub fn base_url(&self) -> String {
        match &self.api_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://api.{}", self.site),
        }
    }
}

impl Default for DatadogConfig {
    fn default() -> Self {
        Self {
            site: default_datadog_site(),
            api_url: None,
            api_key_env: default_datadog_api_key_env(),
            app_key_env: default_datadog_app_key_env(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticConfig {
    /// Kibana base URL
    pub kibana_url: String,

    /// API key (from env var)
    #[serde(default = "default_elastic_api_key_env")]
    pub api_key_env: String,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcumenElasticConfig {
    /// Elasticsearch base URL
    pub elasticsearch_url: String,

    /// Alerts index or alias
    #[serde(default = "default_acumen_index")]
    pub index: String,

    /// Tenant name attached to every alert as a label
    #[serde(default)]
    pub tenant: Option<String>,

    /// Workflow statuses to keep; empty keeps all
    #[serde(default = "default_acumen_statuses")]
    pub statuses: Vec<String>,

    /// Username (from env var)
    #[serde(default = "default_acumen_username_env")]
    pub username_env: String,

    /// Password (from env var)
    #[serde(default = "default_acumen_password_env")]
    pub password_env: String,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Read a secret from the environment variable named by a `*_env` setting
pub fn read_secret(env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Configuration(format!(
            "Environment variable {} is not set",
            env_var
        ))),
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_datadog_site() -> String {
    "datadoghq.com".to_string()
}

fn default_datadog_api_key_env() -> String {
    "DD_API_KEY".to_string()
}

fn default_datadog_app_key_env() -> String {
    "DD_APP_KEY".to_string()
}

fn default_elastic_api_key_env() -> String {
    "ELASTIC_API_KEY".to_string()
}

fn default_acumen_index() -> String {
    ".alerts-security.alerts-default".to_string()
}

fn default_acumen_statuses() -> Vec<String> {
    vec!["open".to_string()]
}

fn default_acumen_username_env() -> String {
    "ACUMEN_ELASTIC_USERNAME".to_string()
}

fn default_acumen_password_env() -> String {
    "ACUMEN_ELASTIC_PASSWORD".to_string()
}

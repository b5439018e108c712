//! Backend selection and a common interface over the SIEM clients

use crate::config::SiemConfig;
use crate::error::{AppError, Result};
use crate::models::{AlertQuery, SiemAlert};
use crate::siem::acumen_elastic::AcumenElasticClient;
use crate::siem::datadog::DatadogClient;
use crate::siem::elastic::ElasticClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Supported SIEM backends
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum SiemBackend {
    #[strum(serialize = "datadog")]
    Datadog,
    #[strum(serialize = "elastic")]
    Elastic,
    #[strum(to_string = "acumen_elastic", serialize = "acumen-elastic")]
    AcumenElastic,
}

impl SiemBackend {
    /// Name of the listing function exported for this backend
    pub fn list_function(&self) -> &'static str {
        match self {
            SiemBackend::Datadog => "list_datadog_alerts",
            SiemBackend::Elastic => "list_elastic_alerts",
            SiemBackend::AcumenElastic => "acumen_list_elastic_alerts",
        }
    }
}

/// A configured SIEM backend that can list alerts
#[async_trait]
pub trait AlertSource: Send + Sync {
    /// Backend this source talks to
    fn backend(&self) -> SiemBackend;

    /// Vendor records in the window, unmodified
    async fn search_raw(&self, query: &AlertQuery) -> Result<Vec<serde_json::Value>>;

    /// Normalized alerts in the window
    async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<SiemAlert>>;
}

#[async_trait]
impl AlertSource for DatadogClient {
    fn backend(&self) -> SiemBackend {
        SiemBackend::Datadog
    }

    async fn search_raw(&self, query: &AlertQuery) -> Result<Vec<serde_json::Value>> {
        self.search_signals(query).await
    }

    async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<SiemAlert>> {
        DatadogClient::list_alerts(self, query).await
    }
}

#[async_trait]
impl AlertSource for ElasticClient {
    fn backend(&self) -> SiemBackend {
        SiemBackend::Elastic
    }

    async fn search_raw(&self, query: &AlertQuery) -> Result<Vec<serde_json::Value>> {
        self.search_signals(query).await
    }

    async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<SiemAlert>> {
        ElasticClient::list_alerts(self, query).await
    }
}

#[async_trait]
impl AlertSource for AcumenElasticClient {
    fn backend(&self) -> SiemBackend {
        SiemBackend::AcumenElastic
    }

    async fn search_raw(&self, query: &AlertQuery) -> Result<Vec<serde_json::Value>> {
        self.search_alerts(query).await
    }

    async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<SiemAlert>> {
        AcumenElasticClient::list_alerts(self, query).await
    }
}

/// Build the client for a backend from its configuration section
pub fn build_source(backend: SiemBackend, config: &SiemConfig) -> Result<Box<dyn AlertSource>> {
    let not_configured =
        || AppError::Configuration(format!("Backend {} is not configured", backend));

    let source: Box<dyn AlertSource> = match backend {
        SiemBackend::Datadog => {
            let section = config.datadog.as_ref().ok_or_else(not_configured)?;
            Box::new(DatadogClient::from_config(section)?)
        }
        SiemBackend::Elastic => {
            let section = config.elastic.as_ref().ok_or_else(not_configured)?;
            Box::new(ElasticClient::from_config(section)?)
        }
        SiemBackend::AcumenElastic => {
            let section = config.acumen_elastic.as_ref().ok_or_else(not_configured)?;
            Box::new(AcumenElasticClient::from_config(section)?)
        }
    };

    Ok(source)
}

use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Upper bound on alerts returned by a single listing call
pub const MAX_ALERT_LIMIT: usize = 1000;

/// Alert severity as reported by the SIEM
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// Parse a vendor severity string, unknown values map to `Info`
    pub fn from_vendor(value: &str) -> Self {
        value.trim().parse().unwrap_or(AlertSeverity::Info)
    }

    /// Map an Elastic risk score (0-100) to a severity
    pub fn from_risk_score(score: f64) -> Self {
        if score >= 90.0 {
            AlertSeverity::Critical
        } else if score >= 70.0 {
            AlertSeverity::High
        } else if score >= 40.0 {
            AlertSeverity::Medium
        } else if score >= 20.0 {
            AlertSeverity::Low
        } else {
            AlertSeverity::Info
        }
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self, AlertSeverity::High | AlertSeverity::Critical)
    }
}

/// Alert normalized from a SIEM backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiemAlert {
    /// Unique alert identifier
    pub id: Uuid,

    /// External alert ID (from source system)
    pub external_id: String,

    /// Backend the alert was read from (e.g., "datadog", "elastic")
    pub source: String,

    /// Timestamp when alert was generated
    pub timestamp: DateTime<Utc>,

    /// Timestamp when alert was received
    pub received_at: DateTime<Utc>,

    /// Alert title
    pub title: String,

    /// Alert severity
    pub severity: AlertSeverity,

    /// Triage/workflow state reported by the backend
    pub status: Option<String>,

    /// Detection rule identifier
    pub rule_id: Option<String>,

    /// Tags
    pub tags: Vec<String>,

    /// Labels (additional metadata)
    pub labels: HashMap<String, String>,

    /// Untouched vendor record
    pub raw: serde_json::Value,
}

impl SiemAlert {
    /// Create a new alert
    pub fn new(
        external_id: String,
        source: String,
        title: String,
        severity: AlertSeverity,
        raw: serde_json::Value,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            external_id,
            source,
            timestamp: now,
            received_at: now,
            title,
            severity,
            status: None,
            rule_id: None,
            tags: Vec::new(),
            labels: HashMap::new(),
            raw,
        }
    }

    /// Generate fingerprint for deduplication
    pub fn generate_fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update(self.title.as_bytes());
        if let Some(rule_id) = &self.rule_id {
            hasher.update(rule_id.as_bytes());
        }

        let mut tags: Vec<&String> = self.tags.iter().collect();
        tags.sort();
        for tag in tags {
            hasher.update(tag.as_bytes());
        }

        format!("{:x}", hasher.finalize())
    }

    /// Check if alert is urgent
    pub fn is_urgent(&self) -> bool {
        self.severity.is_urgent()
    }
}

/// Time window and limits for an alert listing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_window"))]
pub struct AlertQuery {
    /// Window start (inclusive)
    pub start_time: DateTime<Utc>,

    /// Window end (inclusive)
    pub end_time: DateTime<Utc>,

    /// Maximum number of alerts to return
    #[validate(range(min = 1, max = MAX_ALERT_LIMIT))]
    pub limit: usize,

    /// Backend-native query string
    pub filter: Option<String>,
}

impl AlertQuery {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time,
            limit: 100,
            filter: None,
        }
    }

    /// Window ending now
    pub fn last(window: Duration) -> crate::error::Result<Self> {
        let end_time = Utc::now();
        let start_time = end_time.checked_sub_signed(window).ok_or_else(|| {
            AppError::Validation(format!("lookback window {} is out of range", window))
        })?;
        Ok(Self::new(start_time, end_time))
    }

    /// Window of `minutes` ending now
    pub fn last_minutes(minutes: i64) -> crate::error::Result<Self> {
        let window = Duration::try_minutes(minutes).ok_or_else(|| {
            AppError::Validation(format!("lookback of {} minutes is out of range", minutes))
        })?;
        Self::last(window)
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

fn validate_window(query: &AlertQuery) -> Result<(), ValidationError> {
    if query.start_time >= query.end_time {
        let mut err = ValidationError::new("time_window");
        err.message = Some("start_time must be before end_time".into());
        return Err(err);
    }
    Ok(())
}

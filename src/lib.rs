//! Alert listing integrations for Datadog and Elastic security platforms.

pub mod config;
pub mod error;
pub mod models;
pub mod siem;
pub mod source;

pub use error::{AppError, Result};
pub use siem::{acumen_list_elastic_alerts, list_datadog_alerts, list_elastic_alerts};

//! SIEM integrations.
//!
//! Each backend module queries one SIEM for alerts in a time window and
//! normalizes them into [`SiemAlert`](crate::models::SiemAlert) records.

pub mod acumen_elastic;
pub mod datadog;
pub mod elastic;

mod http;
mod normalize;

pub use acumen_elastic::acumen_list_elastic_alerts;
pub use datadog::list_datadog_alerts;
pub use elastic::list_elastic_alerts;

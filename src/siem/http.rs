use crate::error::{AppError, Result};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::warn;

const ERROR_BODY_LIMIT: usize = 512;

/// Build the HTTP client shared by a backend client
pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Check the response status and decode the JSON body
pub(crate) async fn read_json(backend: &str, response: Response) -> Result<serde_json::Value> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(
            backend = backend,
            status = status.as_u16(),
            "SIEM API request failed"
        );
        return Err(status_error(backend, status, &body));
    }

    Ok(response.json().await?)
}

fn status_error(backend: &str, status: StatusCode, body: &str) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED => {
            AppError::Authentication(format!("{} rejected the credentials", backend))
        }
        StatusCode::FORBIDDEN => {
            AppError::Authorization(format!("{} denied access to the alerts API", backend))
        }
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimit,
        _ => {
            let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            AppError::integration(backend, format!("HTTP {}: {}", status.as_u16(), excerpt))
        }
    }
}

// External service clients. Every call here is time-boxed and folds failures
// into `IntegrationError`; callers log and continue, core mutations never
// depend on these succeeding.
pub mod accounting;
pub mod channels;
pub mod document;
pub mod ocr;

use crate::config::Config;

/// Errors raised at the boundary to an external service. Always caught and
/// logged by the caller, never propagated out of a workflow operation.
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service not configured: {0}")]
    NotConfigured(String),

    #[error("unsupported accounting service: {0}")]
    UnsupportedService(String),
}

/// Shared client constructor; the timeout covers connect + full response.
pub fn http_client() -> Result<reqwest::Client, IntegrationError> {
    Ok(reqwest::Client::builder()
        .timeout(Config::get().integration_timeout)
        .build()?)
}

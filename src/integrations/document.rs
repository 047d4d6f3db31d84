// Document generator client: assembles nothing itself, just ships the data
// the caller collected and hands back an opaque byte stream for storage.
use bytes::Bytes;
use serde_json::{json, Value};

use crate::config::Config;
use crate::integrations::{http_client, IntegrationError};

pub struct GeneratedDocument {
    pub content: Bytes,
    pub mime_type: String,
}

impl GeneratedDocument {
    /// File extension derived from the returned MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "application/pdf" => "pdf",
            "text/html" => "html",
            "text/csv" => "csv",
            _ => "bin",
        }
    }
}

pub async fn generate(
    kind: &str,
    data: &Value,
    format: &str,
) -> Result<GeneratedDocument, IntegrationError> {
    let Some(url) = Config::get().document_service_url.clone() else {
        return Err(IntegrationError::NotConfigured("document generator".to_string()));
    };

    let response = http_client()?
        .post(&url)
        .json(&json!({
            "type": kind,
            "data": data,
            "format": format,
        }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IntegrationError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/pdf")
        .to_string();

    Ok(GeneratedDocument {
        content: response.bytes().await?,
        mime_type,
    })
}

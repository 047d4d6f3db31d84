// Email / push delivery channels. Both are best-effort: the in-app
// notification row is the source of truth, a channel failure is logged by the
// caller and never fails the notification itself.
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::integrations::{http_client, IntegrationError};

pub async fn send_email(
    to: &str,
    subject: &str,
    html_body: &str,
    text_body: &str,
) -> Result<(), IntegrationError> {
    let Some(url) = Config::get().email_service_url.clone() else {
        debug!("email channel not configured, skipping delivery to {to}");
        return Ok(());
    };

    let response = http_client()?
        .post(&url)
        .json(&json!({
            "to": to,
            "subject": subject,
            "html": html_body,
            "text": text_body,
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
    Ok(())
}

pub async fn send_push(
    user_id: i32,
    title: &str,
    body: &str,
    data: Option<&Value>,
) -> Result<(), IntegrationError> {
    let Some(url) = Config::get().push_service_url.clone() else {
        debug!("push channel not configured, skipping delivery to user {user_id}");
        return Ok(());
    };

    let response = http_client()?
        .post(&url)
        .json(&json!({
            "user_id": user_id,
            "title": title,
            "body": body,
            "data": data,
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
    Ok(())
}

use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::warn;

use crate::db::models::application::Application;
use crate::db::models::approval::ApprovalAction;
use crate::db::models::notification::{Notification, NotificationCategory};
use crate::integrations::channels;

/// Result type for notification operations
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in notification operations
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to serialize notification data: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Notification builder for creating in-app notifications with optional
/// email/push fan-out. The in-app row is the source of truth; channel
/// delivery is best-effort and never fails the send.
pub struct NotificationBuilder {
    recipient_id: i32,
    category: NotificationCategory,
    title: String,
    message: String,
    data: Option<Value>,
    email: bool,
    push: bool,
}

impl NotificationBuilder {
    pub fn new(
        recipient_id: i32,
        category: NotificationCategory,
        title: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id,
            category,
            title: title.into(),
            message: String::new(),
            data: None,
            email: false,
            push: false,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Also deliver over the email channel.
    pub fn with_email(mut self) -> Self {
        self.email = true;
        self
    }

    /// Also deliver over the push channel.
    pub fn with_push(mut self) -> Self {
        self.push = true;
        self
    }

    /// Persist the notification row, then fan out to requested channels.
    pub async fn send(self, pool: &PgPool) -> NotificationResult<Notification> {
        let notification: Notification = sqlx::query_as(
            r#"
            INSERT INTO notifications (recipient_id, category, title, message, data)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, recipient_id, category, title, message, data, read, read_at, created_at
            "#,
        )
        .bind(self.recipient_id)
        .bind(self.category)
        .bind(&self.title)
        .bind(&self.message)
        .bind(&self.data)
        .fetch_one(pool)
        .await?;

        if self.email {
            match recipient_email(pool, self.recipient_id).await {
                Ok(Some(email)) => {
                    let html = format!("<p>{}</p>", self.message);
                    if let Err(e) =
                        channels::send_email(&email, &self.title, &html, &self.message).await
                    {
                        warn!("email delivery failed for notification {}: {e}", notification.id);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("email lookup failed for user {}: {e}", self.recipient_id),
            }
        }

        if self.push {
            if let Err(e) = channels::send_push(
                self.recipient_id,
                &self.title,
                &self.message,
                self.data.as_ref(),
            )
            .await
            {
                warn!("push delivery failed for notification {}: {e}", notification.id);
            }
        }

        Ok(notification)
    }
}

async fn recipient_email(pool: &PgPool, user_id: i32) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Title and message shown to the submitter for a workflow decision.
pub fn decision_copy(
    action: &ApprovalAction,
    application_title: &str,
    comment: Option<&str>,
) -> (String, String) {
    match action {
        ApprovalAction::Approved => (
            format!("Approved: {application_title}"),
            format!("Your application '{application_title}' has been approved."),
        ),
        ApprovalAction::Rejected => (
            format!("Rejected: {application_title}"),
            format!(
                "Your application '{application_title}' has been rejected. Reason: {}",
                comment.unwrap_or("(none given)")
            ),
        ),
        ApprovalAction::Returned => (
            format!("Returned: {application_title}"),
            format!(
                "Your application '{application_title}' was returned for revision. Reason: {}",
                comment.unwrap_or("(none given)")
            ),
        ),
    }
}

/// Notify the submitter about a workflow decision. Exactly one in-app row per
/// decision; email + push fan-out on top.
pub async fn notify_decision(
    pool: &PgPool,
    application: &Application,
    action: &ApprovalAction,
    comment: Option<&str>,
) -> NotificationResult<Notification> {
    let (title, message) = decision_copy(action, &application.title, comment);
    NotificationBuilder::new(application.owner_id, NotificationCategory::Approval, title)
        .message(message)
        .data(json!({
            "application_id": application.id,
            "action": action.as_str(),
        }))
        .with_email()
        .with_push()
        .send(pool)
        .await
}

/// Notify every approver of the owning organization that an application is
/// waiting for a decision.
pub async fn notify_submitted(
    pool: &PgPool,
    application: &Application,
    submitter_name: &str,
) -> NotificationResult<()> {
    let Some(organization_id) = application.organization_id else {
        return Ok(());
    };

    let approver_ids: Vec<(i32,)> = sqlx::query_as(
        r#"
        SELECT user_id FROM organization_members
        WHERE organization_id = $1 AND role IN ('approver', 'admin') AND user_id <> $2
        "#,
    )
    .bind(organization_id)
    .bind(application.owner_id)
    .fetch_all(pool)
    .await?;

    for (approver_id,) in approver_ids {
        NotificationBuilder::new(
            approver_id,
            NotificationCategory::Approval,
            format!("Approval requested: {}", application.title),
        )
        .message(format!(
            "{submitter_name} submitted '{}' for approval.",
            application.title
        ))
        .data(json!({ "application_id": application.id }))
        .with_push()
        .send(pool)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_copy_mentions_reason_on_reject_and_return() {
        let (title, message) =
            decision_copy(&ApprovalAction::Rejected, "June trip", Some("over budget"));
        assert!(title.starts_with("Rejected"));
        assert!(message.contains("over budget"));

        let (title, message) =
            decision_copy(&ApprovalAction::Returned, "June trip", Some("missing receipt"));
        assert!(title.starts_with("Returned"));
        assert!(message.contains("missing receipt"));
    }

    #[test]
    fn decision_copy_for_approval_has_no_reason() {
        let (title, message) = decision_copy(&ApprovalAction::Approved, "June trip", None);
        assert!(title.starts_with("Approved"));
        assert!(message.contains("approved"));
        assert!(!message.contains("Reason"));
    }
}

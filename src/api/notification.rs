use crate::db::queries::notification::{
    delete_notification, list_notifications, mark_all_read, mark_read, notification_counts,
};
use axum::{
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;

pub fn notification_routes() -> Router<PgPool> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/count", get(notification_counts))
        .route("/notifications/read-all", post(mark_all_read))
        .route(
            "/notifications/{id}",
            axum::routing::delete(delete_notification),
        )
        .route("/notifications/{id}/read", patch(mark_read))
}

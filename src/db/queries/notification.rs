use axum::{
    extract::{Extension, Path as AxumPath, Query, State},
    http::StatusCode,
};
use serde_json::json;
use sqlx::{PgPool, QueryBuilder};

use crate::api::auth::Claims;
use crate::db::models::notification::{
    Notification, NotificationCountResponse, NotificationFilter,
};
use crate::utils::api_response::ApiResponse;

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, category, title, message, data, read, read_at, created_at";

/// List the caller's notifications, newest first.
#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "Notifications",
    params(NotificationFilter),
    responses(
        (status = 200, description = "Notifications retrieved successfully", body = Vec<Notification>),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn list_notifications(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<NotificationFilter>,
) -> Result<ApiResponse<Vec<Notification>>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let mut builder = QueryBuilder::new(format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE recipient_id = "
    ));
    builder.push_bind(user_id);

    if filter.unread_only.unwrap_or(false) {
        builder.push(" AND read = false");
    }
    if let Some(category) = filter.category {
        builder.push(" AND category = ");
        builder.push_bind(category);
    }

    builder.push(" ORDER BY created_at DESC LIMIT ");
    builder.push_bind(filter.limit.unwrap_or(50) as i64);
    builder.push(" OFFSET ");
    builder.push_bind(filter.offset.unwrap_or(0) as i64);

    let notifications = builder
        .build_query_as::<Notification>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to retrieve notifications",
                Some(json!({ "error": e.to_string() })),
            )
        })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Notifications retrieved successfully",
        notifications,
    ))
}

/// Unread/total counters. This is the polling surface the UI uses instead of
/// a database change feed.
#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/notifications/count",
    tag = "Notifications",
    responses(
        (status = 200, description = "Notification counts retrieved successfully", body = NotificationCountResponse),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn notification_counts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<ApiResponse<NotificationCountResponse>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let (total, unread): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COUNT(*) FILTER (WHERE read = false)
          FROM notifications
         WHERE recipient_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to count notifications",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Notification counts retrieved successfully",
        NotificationCountResponse { total, unread },
    ))
}

/// Mark one notification read. Idempotent: `read_at` is set on the first
/// transition only, a second call leaves the row untouched.
#[axum::debug_handler]
#[utoipa::path(
    patch,
    path = "/notifications/{id}/read",
    tag = "Notifications",
    params(
        ("id" = i32, Path, description = "Notification ID"),
    ),
    responses(
        (status = 200, description = "Notification marked as read", body = Notification),
        (status = 404, description = "Notification not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn mark_read(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    AxumPath(notification_id): AxumPath<i32>,
) -> Result<ApiResponse<Notification>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let notification = sqlx::query_as::<_, Notification>(&format!(
        r#"
        UPDATE notifications
           SET read = true,
               read_at = COALESCE(read_at, NOW())
         WHERE id = $1 AND recipient_id = $2
        RETURNING {NOTIFICATION_COLUMNS}
        "#
    ))
    .bind(notification_id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to mark notification as read",
            Some(json!({ "error": e.to_string() })),
        )
    })?
    .ok_or_else(|| {
        ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Notification not found", None)
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Notification marked as read",
        notification,
    ))
}

/// Mark everything unread as read; returns how many rows flipped.
#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/notifications/read-all",
    tag = "Notifications",
    responses(
        (status = 200, description = "Notifications marked as read", body = u64),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn mark_all_read(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<ApiResponse<u64>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let result = sqlx::query(
        "UPDATE notifications SET read = true, read_at = NOW() \
         WHERE recipient_id = $1 AND read = false",
    )
    .bind(user_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to mark notifications as read",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Notifications marked as read",
        result.rows_affected(),
    ))
}

/// Recipients may delete their own notifications.
#[axum::debug_handler]
#[utoipa::path(
    delete,
    path = "/notifications/{id}",
    tag = "Notifications",
    params(
        ("id" = i32, Path, description = "Notification ID"),
    ),
    responses(
        (status = 200, description = "Notification deleted successfully"),
        (status = 404, description = "Notification not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn delete_notification(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    AxumPath(notification_id): AxumPath<i32>,
) -> Result<ApiResponse<()>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
        .bind(notification_id)
        .bind(user_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete notification",
                Some(json!({ "error": e.to_string() })),
            )
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiResponse::<()>::error(
            StatusCode::NOT_FOUND,
            "Notification not found",
            None,
        ));
    }

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Notification deleted successfully",
        (),
    ))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        list_notifications,
        notification_counts,
        mark_read,
        mark_all_read,
        delete_notification
    ),
    components(
        schemas(
            crate::db::models::notification::Notification,
            crate::db::models::notification::NotificationCategory,
            crate::db::models::notification::NotificationCountResponse
        )
    ),
    tags(
        (name = "Notifications", description = "In-app notification management")
    )
)]
pub struct NotificationDoc;

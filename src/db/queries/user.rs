use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use sqlx::PgPool;

use crate::api::auth::Claims;
use crate::db::models::user::{UpdateProfile, UserProfile};
use crate::utils::api_response::ApiResponse;

const USER_COLUMNS: &str = "id, username, email, role, account_locked, created_at";

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "Profile retrieved successfully", body = UserProfile),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<ApiResponse<UserProfile>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let profile = sqlx::query_as::<_, UserProfile>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(user_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load profile",
            Some(json!({ "error": e.to_string() })),
        )
    })?
    .ok_or_else(|| ApiResponse::<()>::error(StatusCode::NOT_FOUND, "User not found", None))?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Profile retrieved successfully",
        profile,
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    patch,
    path = "/users/me",
    tag = "Users",
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated successfully", body = UserProfile),
        (status = 400, description = "No fields provided for update"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfile>,
) -> Result<ApiResponse<UserProfile>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    if payload.email.is_none() {
        return Err(ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "No fields provided for update",
            None,
        ));
    }

    let profile = sqlx::query_as::<_, UserProfile>(&format!(
        "UPDATE users SET email = COALESCE($1, email) WHERE id = $2 RETURNING {USER_COLUMNS}"
    ))
    .bind(&payload.email)
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update profile",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Profile updated successfully",
        profile,
    ))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(get_me, update_me),
    components(
        schemas(
            crate::db::models::user::UserProfile,
            crate::db::models::user::UpdateProfile
        )
    ),
    tags(
        (name = "Users", description = "User profile endpoints")
    )
)]
pub struct UserDoc;

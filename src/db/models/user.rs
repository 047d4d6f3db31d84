// src/db/models/user.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Public view of a user account, password hash excluded.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow, ToSchema)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: String,
    pub account_locked: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfile {
    pub email: Option<String>,
}

// src/db/models/accounting.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "sync_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Success,
    Failed,
}

/// One attempt to push an approved application to an external accounting
/// service. Drives the manual/cron retry policy; never blocks an approval.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow, ToSchema)]
pub struct AccountingIntegrationLog {
    pub id: i32,
    pub application_id: i32,
    pub service: String,
    pub operation: String,
    pub request_payload: Option<Value>,
    pub response_payload: Option<Value>,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub last_retry_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// Per-organization accounting service credentials.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow, ToSchema)]
pub struct AccountingConfig {
    pub id: i32,
    pub organization_id: i32,
    pub service: String,
    pub base_url: String,
    pub access_token: String,
    pub company_id: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpsertAccountingConfig {
    pub service: String,
    pub base_url: String,
    pub access_token: String,
    pub company_id: Option<String>,
    pub enabled: Option<bool>,
}

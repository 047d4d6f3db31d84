// src/db/models/application.rs
use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::db::models::business_trip::UpsertBusinessTripDetail;
use crate::db::models::expense_item::NewExpenseItem;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "application_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    BusinessTrip,
    Expense,
}

/// Lifecycle states of an application.
///
/// `draft` and `returned` are editable and resubmittable; `pending` is the only
/// state a decision can be recorded from; `approved` and `rejected` are
/// terminal for the submission cycle. A rejected application is intentionally
/// not resubmittable, the submitter starts over with a new application.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "application_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Returned,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Returned => "returned",
        }
    }

    /// Owner may edit the application (and its children) in these states.
    pub fn is_editable(&self) -> bool {
        matches!(self, ApplicationStatus::Draft | ApplicationStatus::Returned)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, FromRow, ToSchema)]
pub struct Application {
    pub id: i32,
    pub owner_id: i32,
    pub organization_id: Option<i32>,
    pub application_type: ApplicationType,
    pub title: String,
    pub description: Option<String>,
    pub data: Option<Value>,
    #[schema(value_type = f64)]
    pub total_amount: BigDecimal,
    pub status: ApplicationStatus,
    pub submitted_at: Option<NaiveDateTime>,
    pub approved_at: Option<NaiveDateTime>,
    pub approved_by: Option<i32>,
    pub rejection_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NewApplication {
    pub organization_id: Option<i32>,
    pub application_type: ApplicationType,
    pub title: String,
    pub description: Option<String>,
    pub data: Option<Value>,
    /// Nested trip detail, only valid for `business_trip` applications.
    pub trip: Option<UpsertBusinessTripDetail>,
    /// Nested line items, only valid for `expense` applications.
    pub items: Option<Vec<NewExpenseItem>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateApplication {
    pub title: Option<String>,
    pub description: Option<String>,
    pub data: Option<Value>,
}

impl UpdateApplication {
    /// Checks if all fields are `None`, indicating no updates were provided.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.data.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize, Default, IntoParams, ToSchema)]
pub struct ApplicationFilter {
    pub status: Option<ApplicationStatus>,
    pub organization_id: Option<i32>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

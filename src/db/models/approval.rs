// src/db/models/approval.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::db::models::application::Application;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "approval_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approved,
    Rejected,
    Returned,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Approved => "approved",
            ApprovalAction::Rejected => "rejected",
            ApprovalAction::Returned => "returned",
        }
    }

    /// Reject and return decisions must carry a reason for the submitter.
    pub fn requires_comment(&self) -> bool {
        matches!(self, ApprovalAction::Rejected | ApprovalAction::Returned)
    }
}

/// One immutable workflow decision. Never updated or deleted; `step` is
/// monotonically increasing per application.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow, ToSchema)]
pub struct Approval {
    pub id: i32,
    pub application_id: i32,
    pub approver_id: i32,
    pub step: i32,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub decided_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DecisionRequest {
    pub action: ApprovalAction,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DecisionResponse {
    pub application: Application,
    pub approval: Approval,
}

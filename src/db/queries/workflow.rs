use axum::{
    extract::{Extension, Path as AxumPath, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, warn};

use crate::api::auth::Claims;
use crate::db::models::accounting::SyncStatus;
use crate::db::models::application::{Application, ApplicationStatus};
use crate::db::models::approval::{Approval, ApprovalAction, DecisionRequest, DecisionResponse};
use crate::middleware::auth::OrgPermissions;
use crate::utils::api_response::ApiResponse;
use crate::utils::notification;

use super::application::{can_view, fetch_application, APPLICATION_COLUMNS};

const APPROVAL_COLUMNS: &str =
    "id, application_id, approver_id, step, action, comment, decided_at";

/// Workflow failures surfaced to the caller. Integration failures never show
/// up here: accounting sync runs after the decision commits and only writes
/// its outcome to the integration log.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Application not found")]
    NotFound,

    #[error("Application is not awaiting a decision (current status: {0})")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error("Application was already decided by a concurrent request")]
    Conflict,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<WorkflowError> for ApiResponse<()> {
    fn from(err: WorkflowError) -> Self {
        let status = match &err {
            WorkflowError::NotFound => StatusCode::NOT_FOUND,
            WorkflowError::InvalidState(_) | WorkflowError::Conflict => StatusCode::CONFLICT,
            WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiResponse::error(status, err.to_string(), None)
    }
}

/// Reject and return decisions must explain themselves to the submitter.
pub fn validate_decision(
    action: &ApprovalAction,
    comment: Option<&str>,
) -> Result<(), WorkflowError> {
    if action.requires_comment() && comment.map(str::trim).unwrap_or("").is_empty() {
        return Err(WorkflowError::Validation(format!(
            "A comment is required when an application is {}",
            action.as_str()
        )));
    }
    Ok(())
}

/// `pending` is the only state a decision may be recorded from.
pub fn ensure_decidable(status: &ApplicationStatus) -> Result<(), WorkflowError> {
    if *status != ApplicationStatus::Pending {
        return Err(WorkflowError::InvalidState(status.as_str().to_string()));
    }
    Ok(())
}

/// Status an application lands in after the given decision.
pub fn decided_status(action: &ApprovalAction) -> ApplicationStatus {
    match action {
        ApprovalAction::Approved => ApplicationStatus::Approved,
        ApprovalAction::Rejected => ApplicationStatus::Rejected,
        ApprovalAction::Returned => ApplicationStatus::Returned,
    }
}

/// Record one workflow decision on a pending application.
///
/// The status transition is a compare-and-swap: the UPDATE is conditional on
/// `status = 'pending'`, and the losing side of a concurrent decision sees
/// zero rows and reports a conflict instead of double-applying. The approval
/// step number is derived inside the same transaction so it stays unique.
#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/applications/{id}/decision",
    tag = "Workflow",
    params(
        ("id" = i32, Path, description = "ID of the pending application"),
    ),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Decision recorded successfully", body = DecisionResponse),
        (status = 403, description = "Caller may not decide on this application"),
        (status = 404, description = "Application not found"),
        (status = 409, description = "Application is not pending, or a concurrent decision won"),
        (status = 422, description = "Missing comment on reject/return"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn decide_application(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(application_id): AxumPath<i32>,
    Json(payload): Json<DecisionRequest>,
) -> Result<ApiResponse<DecisionResponse>, ApiResponse<()>> {
    let approver_id = claims.user_id()?;

    let application = fetch_application(&pool, application_id)
        .await
        .map_err(|e| ApiResponse::from(WorkflowError::Database(e)))?
        .ok_or_else(|| ApiResponse::from(WorkflowError::NotFound))?;

    let may_decide = match application.organization_id {
        Some(organization_id) => permissions.can_decide(organization_id),
        None => permissions.is_admin(),
    };
    if !may_decide {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "You are not an approver for this application",
            None,
        ));
    }
    if application.owner_id == approver_id {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "You cannot decide on your own application",
            None,
        ));
    }

    validate_decision(&payload.action, payload.comment.as_deref())
        .map_err(ApiResponse::from)?;
    // Fast path; the conditional update below still guards against races.
    ensure_decidable(&application.status).map_err(ApiResponse::from)?;

    let comment = payload
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let mut tx = pool.begin().await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to start transaction",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    let set_clause = match payload.action {
        ApprovalAction::Approved => "status = 'approved', approved_at = NOW(), approved_by = $1",
        ApprovalAction::Rejected => "status = 'rejected', rejection_reason = $1",
        ApprovalAction::Returned => "status = 'returned', rejection_reason = $1",
    };
    let sql = format!(
        "UPDATE applications SET {set_clause}, updated_at = NOW() \
         WHERE id = $2 AND status = 'pending' RETURNING {APPLICATION_COLUMNS}"
    );
    let query = sqlx::query_as::<_, Application>(&sql);
    let query = match payload.action {
        ApprovalAction::Approved => query.bind(approver_id),
        _ => query.bind(&comment),
    };
    let updated = query
        .bind(application_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| ApiResponse::from(WorkflowError::Database(e)))?
        .ok_or_else(|| ApiResponse::from(WorkflowError::Conflict))?;

    let approval = sqlx::query_as::<_, Approval>(&format!(
        r#"
        INSERT INTO application_approvals (application_id, approver_id, step, action, comment)
        SELECT $1, $2, COALESCE(MAX(step), 0) + 1, $3, $4
          FROM application_approvals
         WHERE application_id = $1
        RETURNING {APPROVAL_COLUMNS}
        "#
    ))
    .bind(application_id)
    .bind(approver_id)
    .bind(payload.action)
    .bind(&comment)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ApiResponse::from(WorkflowError::Database(e)))?;

    // An approval opens an integration-log row inside the same transaction,
    // so even a crash before the sync runs leaves a retryable trail.
    let log_id: Option<i32> = if payload.action == ApprovalAction::Approved {
        let service: Option<String> = match updated.organization_id {
            Some(organization_id) => sqlx::query_scalar(
                "SELECT service FROM accounting_configs WHERE organization_id = $1 AND enabled",
            )
            .bind(organization_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| ApiResponse::from(WorkflowError::Database(e)))?,
            None => None,
        };
        let id: i32 = sqlx::query_scalar(
            "INSERT INTO accounting_integration_logs (application_id, service, operation) \
             VALUES ($1, $2, 'create') RETURNING id",
        )
        .bind(application_id)
        .bind(service.unwrap_or_else(|| "unconfigured".to_string()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| ApiResponse::from(WorkflowError::Database(e)))?;
        Some(id)
    } else {
        None
    };

    tx.commit().await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to commit transaction",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    // The decision is committed; everything below is side effects that must
    // not unwind it.
    if let Err(e) =
        notification::notify_decision(&pool, &updated, &payload.action, comment.as_deref()).await
    {
        error!(
            "failed to notify submitter of decision on application {}: {e}",
            updated.id
        );
    }

    if let Some(log_id) = log_id {
        let pool = pool.clone();
        let synced_application_id = updated.id;
        tokio::spawn(async move {
            let outcome =
                super::accounting::run_accounting_sync(&pool, synced_application_id, log_id).await;
            if outcome.status == SyncStatus::Failed {
                warn!(
                    "accounting sync failed for application {synced_application_id}: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        });
    }

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Decision recorded successfully",
        DecisionResponse {
            application: updated,
            approval,
        },
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/applications/{id}/approvals",
    tag = "Workflow",
    params(
        ("id" = i32, Path, description = "ID of the application"),
    ),
    responses(
        (status = 200, description = "Approval history retrieved successfully", body = Vec<Approval>),
        (status = 404, description = "Application not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn list_approvals(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(application_id): AxumPath<i32>,
) -> Result<ApiResponse<Vec<Approval>>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let application = fetch_application(&pool, application_id)
        .await
        .map_err(|e| ApiResponse::from(WorkflowError::Database(e)))?
        .filter(|app| can_view(app, user_id, &permissions))
        .ok_or_else(|| ApiResponse::from(WorkflowError::NotFound))?;

    let approvals = sqlx::query_as::<_, Approval>(&format!(
        "SELECT {APPROVAL_COLUMNS} FROM application_approvals WHERE application_id = $1 ORDER BY step"
    ))
    .bind(application.id)
    .fetch_all(&pool)
    .await
    .map_err(|e| ApiResponse::from(WorkflowError::Database(e)))?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Approval history retrieved successfully",
        approvals,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_and_return_require_a_comment() {
        assert!(matches!(
            validate_decision(&ApprovalAction::Rejected, None),
            Err(WorkflowError::Validation(_))
        ));
        assert!(matches!(
            validate_decision(&ApprovalAction::Returned, Some("   ")),
            Err(WorkflowError::Validation(_))
        ));
        assert!(validate_decision(&ApprovalAction::Returned, Some("missing receipt")).is_ok());
        assert!(validate_decision(&ApprovalAction::Approved, None).is_ok());
    }

    #[test]
    fn only_pending_applications_are_decidable() {
        assert!(ensure_decidable(&ApplicationStatus::Pending).is_ok());
        for status in [
            ApplicationStatus::Draft,
            ApplicationStatus::Approved,
            ApplicationStatus::Rejected,
            ApplicationStatus::Returned,
        ] {
            assert!(matches!(
                ensure_decidable(&status),
                Err(WorkflowError::InvalidState(_))
            ));
        }
    }

    #[test]
    fn decisions_map_onto_terminal_and_returnable_states() {
        assert_eq!(
            decided_status(&ApprovalAction::Approved),
            ApplicationStatus::Approved
        );
        assert_eq!(
            decided_status(&ApprovalAction::Rejected),
            ApplicationStatus::Rejected
        );
        assert_eq!(
            decided_status(&ApprovalAction::Returned),
            ApplicationStatus::Returned
        );
        // Of the three, only `returned` is editable (and thus resubmittable).
        assert!(decided_status(&ApprovalAction::Returned).is_editable());
        assert!(!decided_status(&ApprovalAction::Approved).is_editable());
        assert!(!decided_status(&ApprovalAction::Rejected).is_editable());
    }

    #[test]
    fn workflow_errors_map_to_http_statuses() {
        let conflict: ApiResponse<()> = WorkflowError::Conflict.into();
        assert_eq!(conflict.status_code, StatusCode::CONFLICT.as_u16());

        let invalid: ApiResponse<()> =
            WorkflowError::InvalidState("draft".to_string()).into();
        assert_eq!(invalid.status_code, StatusCode::CONFLICT.as_u16());

        let validation: ApiResponse<()> =
            WorkflowError::Validation("comment required".to_string()).into();
        assert_eq!(
            validation.status_code,
            StatusCode::UNPROCESSABLE_ENTITY.as_u16()
        );

        let missing: ApiResponse<()> = WorkflowError::NotFound.into();
        assert_eq!(missing.status_code, StatusCode::NOT_FOUND.as_u16());
    }
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(decide_application, list_approvals),
    components(
        schemas(
            crate::db::models::approval::Approval,
            crate::db::models::approval::ApprovalAction,
            crate::db::models::approval::DecisionRequest,
            crate::db::models::approval::DecisionResponse
        )
    ),
    tags(
        (name = "Workflow", description = "Approval workflow decisions")
    )
)]
pub struct WorkflowDoc;

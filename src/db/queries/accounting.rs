use axum::{
    extract::{Extension, Path as AxumPath, State},
    http::StatusCode,
};
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, warn};

use crate::api::auth::Claims;
use crate::db::models::accounting::{AccountingConfig, AccountingIntegrationLog, SyncStatus};
use crate::db::models::business_trip::BusinessTripDetail;
use crate::db::models::expense_item::ExpenseItem;
use crate::integrations::accounting::{build_payload, ConfiguredService, SyncOutcome};
use crate::middleware::auth::OrgPermissions;
use crate::utils::api_response::ApiResponse;

use super::application::fetch_application;

const LOG_COLUMNS: &str = "id, application_id, service, operation, request_payload, \
     response_payload, status, error_message, retry_count, last_retry_at, created_at";

fn failed_outcome(log_id: i32, error: impl Into<String>) -> SyncOutcome {
    SyncOutcome {
        log_id,
        status: SyncStatus::Failed,
        remote_id: None,
        error: Some(error.into()),
    }
}

async fn mark_failed(pool: &PgPool, log_id: i32, message: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE accounting_integration_logs SET status = 'failed', error_message = $1 WHERE id = $2",
    )
    .bind(message)
    .bind(log_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Push one approved application to the organization's accounting service and
/// record the attempt on the given integration-log row.
///
/// This never raises: every failure mode, configuration missing included, is
/// folded into the log row and the returned outcome. The approval that
/// triggered the sync is already committed and stays approved regardless.
pub async fn run_accounting_sync(pool: &PgPool, application_id: i32, log_id: i32) -> SyncOutcome {
    match try_sync(pool, application_id, log_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("accounting sync bookkeeping failed for application {application_id}: {e}");
            failed_outcome(log_id, e.to_string())
        }
    }
}

async fn try_sync(
    pool: &PgPool,
    application_id: i32,
    log_id: i32,
) -> Result<SyncOutcome, sqlx::Error> {
    let Some(application) = fetch_application(pool, application_id).await? else {
        let message = "application no longer exists";
        mark_failed(pool, log_id, message).await?;
        return Ok(failed_outcome(log_id, message));
    };

    let items: Vec<ExpenseItem> = sqlx::query_as(
        "SELECT id, application_id, category, expense_date, amount, description, receipt_path, \
         receipt_metadata, approved, created_at FROM expense_items WHERE application_id = $1 \
         ORDER BY expense_date, id",
    )
    .bind(application_id)
    .fetch_all(pool)
    .await?;

    let trip: Option<BusinessTripDetail> = sqlx::query_as(
        "SELECT id, application_id, destination, start_date, end_date, purpose, participants, \
         estimated_daily_allowance, estimated_transportation, estimated_accommodation, \
         actual_daily_allowance, actual_transportation, actual_accommodation, created_at, \
         updated_at FROM business_trip_details WHERE application_id = $1",
    )
    .bind(application_id)
    .fetch_optional(pool)
    .await?;

    let payload = build_payload(&application, &items, trip.as_ref());
    let request_json = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);
    sqlx::query("UPDATE accounting_integration_logs SET request_payload = $1 WHERE id = $2")
        .bind(&request_json)
        .bind(log_id)
        .execute(pool)
        .await?;

    let config: Option<AccountingConfig> = match application.organization_id {
        Some(organization_id) => sqlx::query_as(
            "SELECT id, organization_id, service, base_url, access_token, company_id, enabled \
             FROM accounting_configs WHERE organization_id = $1 AND enabled",
        )
        .bind(organization_id)
        .fetch_optional(pool)
        .await?,
        None => None,
    };

    let Some(config) = config else {
        let message = "no accounting service configured for this organization";
        warn!("skipping accounting sync for application {application_id}: {message}");
        mark_failed(pool, log_id, message).await?;
        return Ok(failed_outcome(log_id, message));
    };

    let service = match ConfiguredService::from_config(&config) {
        Ok(service) => service,
        Err(e) => {
            let message = e.to_string();
            mark_failed(pool, log_id, &message).await?;
            return Ok(failed_outcome(log_id, message));
        }
    };

    match service.create_entry(&payload).await {
        Ok(entry) => {
            sqlx::query(
                "UPDATE accounting_integration_logs \
                 SET status = 'success', response_payload = $1, error_message = NULL \
                 WHERE id = $2",
            )
            .bind(json!({ "id": entry.id, "status": entry.status }))
            .bind(log_id)
            .execute(pool)
            .await?;
            Ok(SyncOutcome {
                log_id,
                status: SyncStatus::Success,
                remote_id: Some(entry.id),
                error: None,
            })
        }
        Err(e) => {
            let message = e.to_string();
            mark_failed(pool, log_id, &message).await?;
            Ok(failed_outcome(log_id, message))
        }
    }
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/organizations/{id}/accounting/logs",
    tag = "Accounting",
    params(
        ("id" = i32, Path, description = "Organization ID"),
    ),
    responses(
        (status = 200, description = "Integration logs retrieved successfully", body = Vec<AccountingIntegrationLog>),
        (status = 403, description = "Not a member of the organization"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn list_integration_logs(
    State(pool): State<PgPool>,
    Extension(_claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(organization_id): AxumPath<i32>,
) -> Result<ApiResponse<Vec<AccountingIntegrationLog>>, ApiResponse<()>> {
    if !permissions.is_member(organization_id) {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "You are not a member of this organization",
            None,
        ));
    }

    let logs = sqlx::query_as::<_, AccountingIntegrationLog>(
        r#"
        SELECT l.id, l.application_id, l.service, l.operation, l.request_payload,
               l.response_payload, l.status, l.error_message, l.retry_count,
               l.last_retry_at, l.created_at
          FROM accounting_integration_logs l
          JOIN applications a ON a.id = l.application_id
         WHERE a.organization_id = $1
         ORDER BY l.created_at DESC
        "#,
    )
    .bind(organization_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to retrieve integration logs",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Integration logs retrieved successfully",
        logs,
    ))
}

/// Manual (or cron-driven) retry of a failed sync. Bumps the retry counter,
/// stamps the attempt, then re-runs the sync synchronously so the caller sees
/// the outcome.
#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/accounting/logs/{id}/retry",
    tag = "Accounting",
    params(
        ("id" = i32, Path, description = "Integration log ID"),
    ),
    responses(
        (status = 200, description = "Sync retried", body = SyncOutcome),
        (status = 403, description = "Caller may not retry syncs for this organization"),
        (status = 404, description = "Integration log not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn retry_sync(
    State(pool): State<PgPool>,
    Extension(_claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(log_id): AxumPath<i32>,
) -> Result<ApiResponse<SyncOutcome>, ApiResponse<()>> {
    let log = sqlx::query_as::<_, AccountingIntegrationLog>(&format!(
        "SELECT {LOG_COLUMNS} FROM accounting_integration_logs WHERE id = $1"
    ))
    .bind(log_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load integration log",
            Some(json!({ "error": e.to_string() })),
        )
    })?
    .ok_or_else(|| {
        ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Integration log not found", None)
    })?;

    let organization_id: Option<i32> =
        sqlx::query_scalar("SELECT organization_id FROM applications WHERE id = $1")
            .bind(log.application_id)
            .fetch_optional(&pool)
            .await
            .map_err(|e| {
                ApiResponse::<()>::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to load application",
                    Some(json!({ "error": e.to_string() })),
                )
            })?
            .flatten();

    let may_retry = match organization_id {
        Some(organization_id) => permissions.can_decide(organization_id),
        None => permissions.is_admin(),
    };
    if !may_retry {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "You may not retry accounting syncs for this organization",
            None,
        ));
    }

    sqlx::query(
        "UPDATE accounting_integration_logs \
         SET retry_count = retry_count + 1, last_retry_at = NOW(), status = 'pending' \
         WHERE id = $1",
    )
    .bind(log_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update integration log",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    let outcome = run_accounting_sync(&pool, log.application_id, log_id).await;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Sync retried",
        outcome,
    ))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(list_integration_logs, retry_sync),
    components(
        schemas(
            crate::db::models::accounting::AccountingIntegrationLog,
            crate::db::models::accounting::SyncStatus,
            crate::integrations::accounting::SyncOutcome
        )
    ),
    tags(
        (name = "Accounting", description = "Accounting sync integration logs and retries")
    )
)]
pub struct AccountingDoc;

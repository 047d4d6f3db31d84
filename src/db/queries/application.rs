use axum::{
    extract::{Extension, Path as AxumPath, Query, State},
    http::StatusCode,
};
use axum::Json;
use bigdecimal::{BigDecimal, Zero};
use serde_json::json;
use sqlx::{PgConnection, PgPool, QueryBuilder};
use tracing::error;

use crate::api::auth::Claims;
use crate::db::models::application::{
    Application, ApplicationFilter, ApplicationType, NewApplication, UpdateApplication,
};
use crate::middleware::auth::OrgPermissions;
use crate::utils::api_response::ApiResponse;
use crate::utils::notification;

pub const APPLICATION_COLUMNS: &str = "id, owner_id, organization_id, application_type, title, \
     description, data, total_amount, status, submitted_at, approved_at, approved_by, \
     rejection_reason, created_at, updated_at";

/// Load one live (not soft-deleted) application.
pub async fn fetch_application(
    pool: &PgPool,
    application_id: i32,
) -> Result<Option<Application>, sqlx::Error> {
    sqlx::query_as::<_, Application>(&format!(
        "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(application_id)
    .fetch_optional(pool)
    .await
}

/// Read access: the owner, a fellow organization member, or an admin.
pub fn can_view(application: &Application, user_id: i32, permissions: &OrgPermissions) -> bool {
    application.owner_id == user_id
        || permissions.is_admin()
        || application
            .organization_id
            .is_some_and(|org| permissions.is_member(org))
}

/// Sum of expense item amounts.
pub fn expense_total(amounts: &[BigDecimal]) -> BigDecimal {
    amounts
        .iter()
        .fold(BigDecimal::zero(), |acc, amount| acc + amount)
}

/// Sum of the trip estimate fields, missing values counting as zero.
pub fn trip_estimate_total(
    daily_allowance: Option<&BigDecimal>,
    transportation: Option<&BigDecimal>,
    accommodation: Option<&BigDecimal>,
) -> BigDecimal {
    [daily_allowance, transportation, accommodation]
        .into_iter()
        .flatten()
        .fold(BigDecimal::zero(), |acc, amount| acc + amount)
}

/// Recompute `total_amount` from the application's children and persist it.
/// Called at the end of every child mutation; the recomputation lives here,
/// in one visible place, rather than in database triggers.
pub async fn recalculate_total(
    conn: &mut PgConnection,
    application_id: i32,
) -> Result<BigDecimal, sqlx::Error> {
    let application_type: ApplicationType =
        sqlx::query_scalar("SELECT application_type FROM applications WHERE id = $1")
            .bind(application_id)
            .fetch_one(&mut *conn)
            .await?;

    let total = match application_type {
        ApplicationType::Expense => {
            let amounts: Vec<BigDecimal> =
                sqlx::query_scalar("SELECT amount FROM expense_items WHERE application_id = $1")
                    .bind(application_id)
                    .fetch_all(&mut *conn)
                    .await?;
            expense_total(&amounts)
        }
        ApplicationType::BusinessTrip => {
            let estimates: Option<(Option<BigDecimal>, Option<BigDecimal>, Option<BigDecimal>)> =
                sqlx::query_as(
                    "SELECT estimated_daily_allowance, estimated_transportation, \
                     estimated_accommodation FROM business_trip_details WHERE application_id = $1",
                )
                .bind(application_id)
                .fetch_optional(&mut *conn)
                .await?;
            match estimates {
                Some((allowance, transportation, accommodation)) => trip_estimate_total(
                    allowance.as_ref(),
                    transportation.as_ref(),
                    accommodation.as_ref(),
                ),
                None => BigDecimal::zero(),
            }
        }
    };

    sqlx::query("UPDATE applications SET total_amount = $1, updated_at = NOW() WHERE id = $2")
        .bind(&total)
        .bind(application_id)
        .execute(&mut *conn)
        .await?;

    Ok(total)
}

#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/applications",
    tag = "Applications",
    request_body = NewApplication,
    responses(
        (status = 201, description = "Application created successfully", body = Application),
        (status = 403, description = "Not a member of the target organization"),
        (status = 422, description = "Invalid payload"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_application(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    Json(payload): Json<NewApplication>,
) -> Result<ApiResponse<Application>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    if let Some(organization_id) = payload.organization_id {
        if !permissions.is_member(organization_id) {
            return Err(ApiResponse::<()>::error(
                StatusCode::FORBIDDEN,
                "You are not a member of this organization",
                None,
            ));
        }
    }

    match payload.application_type {
        ApplicationType::Expense if payload.trip.is_some() => {
            return Err(ApiResponse::<()>::error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Expense applications cannot carry a trip detail",
                None,
            ));
        }
        ApplicationType::BusinessTrip if payload.items.is_some() => {
            return Err(ApiResponse::<()>::error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Business trip applications cannot carry expense items",
                None,
            ));
        }
        _ => {}
    }

    if let Some(items) = &payload.items {
        for item in items {
            if item.amount <= BigDecimal::zero() {
                return Err(ApiResponse::<()>::error(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Expense item amounts must be positive",
                    None,
                ));
            }
        }
    }
    if let Some(trip) = &payload.trip {
        if let Err(message) = super::business_trip::validate_trip_detail(trip) {
            return Err(ApiResponse::<()>::error(
                StatusCode::UNPROCESSABLE_ENTITY,
                message,
                None,
            ));
        }
    }

    let mut tx = pool.begin().await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to start transaction",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    let application_id: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO applications (owner_id, organization_id, application_type, title, description, data)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(payload.organization_id)
    .bind(payload.application_type)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.data)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create application",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    if let Some(items) = &payload.items {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO expense_items (application_id, category, expense_date, amount, description)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(application_id)
            .bind(&item.category)
            .bind(item.expense_date)
            .bind(&item.amount)
            .bind(&item.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                ApiResponse::<()>::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to create expense item",
                    Some(json!({ "error": e.to_string() })),
                )
            })?;
        }
    }

    if let Some(trip) = &payload.trip {
        super::business_trip::insert_trip_detail(&mut tx, application_id, trip)
            .await
            .map_err(|e| {
                ApiResponse::<()>::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to create trip detail",
                    Some(json!({ "error": e.to_string() })),
                )
            })?;
    }

    recalculate_total(&mut tx, application_id).await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to compute application total",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    tx.commit().await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to commit transaction",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    let application = fetch_application(&pool, application_id)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load application",
                Some(json!({ "error": e.to_string() })),
            )
        })?
        .ok_or_else(|| {
            ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Application not found", None)
        })?;

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Application created successfully",
        application,
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/applications",
    tag = "Applications",
    params(ApplicationFilter),
    responses(
        (status = 200, description = "Applications retrieved successfully", body = Vec<Application>),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn list_applications(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    Query(filter): Query<ApplicationFilter>,
) -> Result<ApiResponse<Vec<Application>>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let mut builder = QueryBuilder::new(format!(
        "SELECT {APPLICATION_COLUMNS} FROM applications WHERE deleted_at IS NULL"
    ));

    match filter.organization_id {
        Some(organization_id) => {
            if !permissions.is_member(organization_id) {
                return Err(ApiResponse::<()>::error(
                    StatusCode::FORBIDDEN,
                    "You are not a member of this organization",
                    None,
                ));
            }
            builder.push(" AND organization_id = ");
            builder.push_bind(organization_id);
        }
        None => {
            builder.push(" AND owner_id = ");
            builder.push_bind(user_id);
        }
    }

    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY created_at DESC LIMIT ");
    builder.push_bind(filter.limit.unwrap_or(50) as i64);
    builder.push(" OFFSET ");
    builder.push_bind(filter.offset.unwrap_or(0) as i64);

    let applications = builder
        .build_query_as::<Application>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to retrieve applications",
                Some(json!({ "error": e.to_string() })),
            )
        })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Applications retrieved successfully",
        applications,
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/applications/{id}",
    tag = "Applications",
    params(
        ("id" = i32, Path, description = "ID of the application"),
    ),
    responses(
        (status = 200, description = "Application retrieved successfully", body = Application),
        (status = 404, description = "Application not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_application(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(application_id): AxumPath<i32>,
) -> Result<ApiResponse<Application>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let application = fetch_application(&pool, application_id)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load application",
                Some(json!({ "error": e.to_string() })),
            )
        })?
        .filter(|app| can_view(app, user_id, &permissions))
        .ok_or_else(|| {
            ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Application not found", None)
        })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Application retrieved successfully",
        application,
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    patch,
    path = "/applications/{id}",
    tag = "Applications",
    params(
        ("id" = i32, Path, description = "ID of the application to update"),
    ),
    request_body = UpdateApplication,
    responses(
        (status = 200, description = "Application updated successfully", body = Application),
        (status = 400, description = "No fields provided for update"),
        (status = 404, description = "Application not found"),
        (status = 409, description = "Application is not editable in its current state"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_application(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    AxumPath(application_id): AxumPath<i32>,
    Json(payload): Json<UpdateApplication>,
) -> Result<ApiResponse<Application>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    if payload.is_empty() {
        return Err(ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "No fields provided for update",
            None,
        ));
    }

    let application = fetch_application(&pool, application_id)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load application",
                Some(json!({ "error": e.to_string() })),
            )
        })?
        .ok_or_else(|| {
            ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Application not found", None)
        })?;

    if application.owner_id != user_id {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only the owner can edit an application",
            None,
        ));
    }
    if !application.status.is_editable() {
        return Err(ApiResponse::<()>::error(
            StatusCode::CONFLICT,
            format!(
                "Application cannot be edited while {}",
                application.status.as_str()
            ),
            None,
        ));
    }

    let updated = sqlx::query_as::<_, Application>(&format!(
        r#"
        UPDATE applications
           SET title = COALESCE($1, title),
               description = COALESCE($2, description),
               data = COALESCE($3, data),
               updated_at = NOW()
         WHERE id = $4
        RETURNING {APPLICATION_COLUMNS}
        "#
    ))
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.data)
    .bind(application_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update application",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Application updated successfully",
        updated,
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    delete,
    path = "/applications/{id}",
    tag = "Applications",
    params(
        ("id" = i32, Path, description = "ID of the application to delete"),
    ),
    responses(
        (status = 200, description = "Application deleted successfully"),
        (status = 404, description = "Application not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn delete_application(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(application_id): AxumPath<i32>,
) -> Result<ApiResponse<()>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let application = fetch_application(&pool, application_id)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load application",
                Some(json!({ "error": e.to_string() })),
            )
        })?
        .ok_or_else(|| {
            ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Application not found", None)
        })?;

    let org_admin = application
        .organization_id
        .is_some_and(|org| permissions.is_org_admin(org));
    if application.owner_id != user_id && !org_admin {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only the owner or an organization admin can delete an application",
            None,
        ));
    }

    // Approval history must stay referenceable, so anything that has been
    // decided on is only ever soft-deleted.
    let approval_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM application_approvals WHERE application_id = $1",
    )
    .bind(application_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to check approval history",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    let sql = if approval_count > 0 {
        "UPDATE applications SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1"
    } else {
        "DELETE FROM applications WHERE id = $1"
    };
    sqlx::query(sql)
        .bind(application_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete application",
                Some(json!({ "error": e.to_string() })),
            )
        })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Application deleted successfully",
        (),
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/applications/{id}/submit",
    tag = "Applications",
    params(
        ("id" = i32, Path, description = "ID of the application to submit"),
    ),
    responses(
        (status = 200, description = "Application submitted successfully", body = Application),
        (status = 404, description = "Application not found"),
        (status = 409, description = "Application is not in a submittable state"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn submit_application(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    AxumPath(application_id): AxumPath<i32>,
) -> Result<ApiResponse<Application>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let application = fetch_application(&pool, application_id)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load application",
                Some(json!({ "error": e.to_string() })),
            )
        })?
        .ok_or_else(|| {
            ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Application not found", None)
        })?;

    if application.owner_id != user_id {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only the owner can submit an application",
            None,
        ));
    }

    // Submittable from draft or returned only. A rejected application stays
    // rejected: the submitter starts over with a new application.
    let submitted = sqlx::query_as::<_, Application>(&format!(
        r#"
        UPDATE applications
           SET status = 'pending',
               submitted_at = NOW(),
               rejection_reason = NULL,
               updated_at = NOW()
         WHERE id = $1 AND status IN ('draft', 'returned')
        RETURNING {APPLICATION_COLUMNS}
        "#
    ))
    .bind(application_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to submit application",
            Some(json!({ "error": e.to_string() })),
        )
    })?
    .ok_or_else(|| {
        ApiResponse::<()>::error(
            StatusCode::CONFLICT,
            format!(
                "Application cannot be submitted while {}",
                application.status.as_str()
            ),
            None,
        )
    })?;

    if let Err(e) = notification::notify_submitted(&pool, &submitted, &claims.username).await {
        error!(
            "failed to notify approvers for application {}: {e}",
            submitted.id
        );
    }

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Application submitted successfully",
        submitted,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::application::ApplicationStatus;

    fn dec(value: i64) -> BigDecimal {
        BigDecimal::from(value)
    }

    #[test]
    fn expense_total_sums_line_items() {
        // Scenario: two items of 3000 and 4500 total 7500.
        assert_eq!(expense_total(&[dec(3000), dec(4500)]), dec(7500));
        assert_eq!(expense_total(&[]), BigDecimal::zero());
    }

    #[test]
    fn trip_total_defaults_missing_fields_to_zero() {
        assert_eq!(
            trip_estimate_total(Some(&dec(15000)), Some(&dec(22500)), Some(&dec(15000))),
            dec(52500)
        );
        assert_eq!(trip_estimate_total(Some(&dec(15000)), None, None), dec(15000));
        assert_eq!(trip_estimate_total(None, None, None), BigDecimal::zero());
    }

    #[test]
    fn only_draft_and_returned_are_editable() {
        assert!(ApplicationStatus::Draft.is_editable());
        assert!(ApplicationStatus::Returned.is_editable());
        assert!(!ApplicationStatus::Pending.is_editable());
        assert!(!ApplicationStatus::Approved.is_editable());
        assert!(!ApplicationStatus::Rejected.is_editable());
    }
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        create_application,
        list_applications,
        get_application,
        update_application,
        delete_application,
        submit_application
    ),
    components(
        schemas(
            crate::db::models::application::Application,
            crate::db::models::application::NewApplication,
            crate::db::models::application::UpdateApplication,
            crate::db::models::application::ApplicationStatus,
            crate::db::models::application::ApplicationType
        )
    ),
    tags(
        (name = "Applications", description = "Expense and business trip application management")
    )
)]
pub struct ApplicationDoc;

use axum::{
    extract::{Extension, Path as AxumPath, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use sqlx::PgPool;

use crate::api::auth::Claims;
use crate::db::models::accounting::{AccountingConfig, UpsertAccountingConfig};
use crate::db::models::organization::{
    NewOrganization, NewOrganizationMember, Organization, OrganizationMember,
    OrganizationResponse,
};
use crate::middleware::auth::{OrgPermissions, PermissionCache};
use crate::utils::api_response::ApiResponse;

const MEMBER_ROLES: [&str; 3] = ["member", "approver", "admin"];

/// Create a new organization. The creator becomes its first admin.
#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/organizations",
    tag = "Organizations",
    request_body = NewOrganization,
    responses(
        (status = 201, description = "Organization created successfully", body = Organization),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_organization(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permission_cache): Extension<PermissionCache>,
    Json(payload): Json<NewOrganization>,
) -> Result<ApiResponse<Organization>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to start transaction",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    let organization = sqlx::query_as::<_, Organization>(
        "INSERT INTO organizations (name) VALUES ($1) RETURNING id, name, created_at",
    )
    .bind(&payload.name)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create organization",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    sqlx::query(
        "INSERT INTO organization_members (user_id, organization_id, role) VALUES ($1, $2, 'admin')",
    )
    .bind(user_id)
    .bind(organization.id)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to add creator as admin",
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

    // The creator's cached permissions no longer reflect reality.
    permission_cache.invalidate(&user_id);

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Organization created successfully",
        organization,
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/organizations/{id}",
    tag = "Organizations",
    params(
        ("id" = i32, Path, description = "Organization ID"),
    ),
    responses(
        (status = 200, description = "Organization retrieved successfully", body = OrganizationResponse),
        (status = 404, description = "Organization not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_organization(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(organization_id): AxumPath<i32>,
) -> Result<ApiResponse<OrganizationResponse>, ApiResponse<()>> {
    let _ = claims.user_id()?;
    if !permissions.is_member(organization_id) {
        return Err(ApiResponse::<()>::error(
            StatusCode::NOT_FOUND,
            "Organization not found",
            None,
        ));
    }

    let organization = sqlx::query_as::<_, Organization>(
        "SELECT id, name, created_at FROM organizations WHERE id = $1",
    )
    .bind(organization_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load organization",
            Some(json!({ "error": e.to_string() })),
        )
    })?
    .ok_or_else(|| {
        ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Organization not found", None)
    })?;

    let members = sqlx::query_as::<_, OrganizationMember>(
        r#"
        SELECT om.user_id, om.organization_id, om.role, u.username
          FROM organization_members om
          JOIN users u ON u.id = om.user_id
         WHERE om.organization_id = $1
         ORDER BY u.username
        "#,
    )
    .bind(organization_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load organization members",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Organization retrieved successfully",
        OrganizationResponse {
            organization,
            members,
        },
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/organizations/{id}/members",
    tag = "Organizations",
    params(
        ("id" = i32, Path, description = "Organization ID"),
    ),
    request_body = NewOrganizationMember,
    responses(
        (status = 201, description = "Member added successfully"),
        (status = 403, description = "Caller is not an organization admin"),
        (status = 422, description = "Unknown role"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn add_member(
    State(pool): State<PgPool>,
    Extension(_claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    Extension(permission_cache): Extension<PermissionCache>,
    AxumPath(organization_id): AxumPath<i32>,
    Json(payload): Json<NewOrganizationMember>,
) -> Result<ApiResponse<()>, ApiResponse<()>> {
    if !permissions.is_org_admin(organization_id) {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only organization admins can manage members",
            None,
        ));
    }

    let role = payload.role.as_deref().unwrap_or("member");
    if !MEMBER_ROLES.contains(&role) {
        return Err(ApiResponse::<()>::error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Unknown role '{role}'"),
            None,
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO organization_members (user_id, organization_id, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, organization_id) DO UPDATE SET role = EXCLUDED.role
        "#,
    )
    .bind(payload.user_id)
    .bind(organization_id)
    .bind(role)
    .execute(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to add member",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    permission_cache.invalidate(&payload.user_id);

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Member added successfully",
        (),
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    delete,
    path = "/organizations/{id}/members/{user_id}",
    tag = "Organizations",
    params(
        ("id" = i32, Path, description = "Organization ID"),
        ("user_id" = i32, Path, description = "User to remove"),
    ),
    responses(
        (status = 200, description = "Member removed successfully"),
        (status = 403, description = "Caller is not an organization admin"),
        (status = 404, description = "Member not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn remove_member(
    State(pool): State<PgPool>,
    Extension(_claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    Extension(permission_cache): Extension<PermissionCache>,
    AxumPath((organization_id, user_id)): AxumPath<(i32, i32)>,
) -> Result<ApiResponse<()>, ApiResponse<()>> {
    if !permissions.is_org_admin(organization_id) {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only organization admins can manage members",
            None,
        ));
    }

    let result = sqlx::query(
        "DELETE FROM organization_members WHERE organization_id = $1 AND user_id = $2",
    )
    .bind(organization_id)
    .bind(user_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to remove member",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    if result.rows_affected() == 0 {
        return Err(ApiResponse::<()>::error(
            StatusCode::NOT_FOUND,
            "Member not found",
            None,
        ));
    }

    permission_cache.invalidate(&user_id);

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Member removed successfully",
        (),
    ))
}

/// Configure (or replace) the organization's accounting service.
#[axum::debug_handler]
#[utoipa::path(
    put,
    path = "/organizations/{id}/accounting",
    tag = "Organizations",
    params(
        ("id" = i32, Path, description = "Organization ID"),
    ),
    request_body = UpsertAccountingConfig,
    responses(
        (status = 200, description = "Accounting config saved successfully", body = AccountingConfig),
        (status = 403, description = "Caller is not an organization admin"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn upsert_accounting_config(
    State(pool): State<PgPool>,
    Extension(_claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(organization_id): AxumPath<i32>,
    Json(payload): Json<UpsertAccountingConfig>,
) -> Result<ApiResponse<AccountingConfig>, ApiResponse<()>> {
    if !permissions.is_org_admin(organization_id) {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only organization admins can configure accounting",
            None,
        ));
    }

    let config = sqlx::query_as::<_, AccountingConfig>(
        r#"
        INSERT INTO accounting_configs (organization_id, service, base_url, access_token, company_id, enabled)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (organization_id) DO UPDATE SET
            service = EXCLUDED.service,
            base_url = EXCLUDED.base_url,
            access_token = EXCLUDED.access_token,
            company_id = EXCLUDED.company_id,
            enabled = EXCLUDED.enabled
        RETURNING id, organization_id, service, base_url, access_token, company_id, enabled
        "#,
    )
    .bind(organization_id)
    .bind(&payload.service)
    .bind(&payload.base_url)
    .bind(&payload.access_token)
    .bind(&payload.company_id)
    .bind(payload.enabled.unwrap_or(true))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save accounting config",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Accounting config saved successfully",
        config,
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/organizations/{id}/accounting",
    tag = "Organizations",
    params(
        ("id" = i32, Path, description = "Organization ID"),
    ),
    responses(
        (status = 200, description = "Accounting config retrieved successfully", body = AccountingConfig),
        (status = 403, description = "Caller is not an organization admin"),
        (status = 404, description = "No accounting service configured"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_accounting_config(
    State(pool): State<PgPool>,
    Extension(_claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(organization_id): AxumPath<i32>,
) -> Result<ApiResponse<AccountingConfig>, ApiResponse<()>> {
    if !permissions.is_org_admin(organization_id) {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only organization admins can view accounting config",
            None,
        ));
    }

    let config = sqlx::query_as::<_, AccountingConfig>(
        "SELECT id, organization_id, service, base_url, access_token, company_id, enabled \
         FROM accounting_configs WHERE organization_id = $1",
    )
    .bind(organization_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load accounting config",
            Some(json!({ "error": e.to_string() })),
        )
    })?
    .ok_or_else(|| {
        ApiResponse::<()>::error(
            StatusCode::NOT_FOUND,
            "No accounting service configured",
            None,
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Accounting config retrieved successfully",
        config,
    ))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        create_organization,
        get_organization,
        add_member,
        remove_member,
        upsert_accounting_config,
        get_accounting_config
    ),
    components(
        schemas(
            crate::db::models::organization::Organization,
            crate::db::models::organization::NewOrganization,
            crate::db::models::organization::OrganizationMember,
            crate::db::models::organization::NewOrganizationMember,
            crate::db::models::organization::OrganizationResponse,
            crate::db::models::accounting::AccountingConfig,
            crate::db::models::accounting::UpsertAccountingConfig
        )
    ),
    tags(
        (name = "Organizations", description = "Organization and membership management")
    )
)]
pub struct OrganizationDoc;

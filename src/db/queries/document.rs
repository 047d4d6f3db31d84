use axum::{
    extract::{Extension, Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tokio::fs;
use tokio_util::io::ReaderStream;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::auth::Claims;
use crate::config::Config;
use crate::db::models::business_trip::BusinessTripDetail;
use crate::db::models::expense_item::ExpenseItem;
use crate::integrations::{document, IntegrationError};
use crate::middleware::auth::OrgPermissions;
use crate::utils::api_response::ApiResponse;

use super::application::{can_view, fetch_application};

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateDocumentRequest {
    /// Document kind understood by the generator; defaults to a report for
    /// the application's type.
    pub kind: Option<String>,
    /// Output format, defaults to `pdf`.
    pub format: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GeneratedDocumentResponse {
    pub document_path: String,
    pub mime_type: String,
}

/// Assemble the application (children and organization included) and hand it
/// to the external generator; the returned bytes land in the documents bucket.
#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/applications/{id}/document",
    tag = "Documents",
    params(
        ("id" = i32, Path, description = "ID of the application"),
    ),
    request_body = GenerateDocumentRequest,
    responses(
        (status = 200, description = "Document generated successfully", body = GeneratedDocumentResponse),
        (status = 404, description = "Application not found"),
        (status = 502, description = "Document generator failed"),
        (status = 503, description = "Document generator not configured"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn generate_document(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(application_id): AxumPath<i32>,
    Json(payload): Json<GenerateDocumentRequest>,
) -> Result<ApiResponse<GeneratedDocumentResponse>, ApiResponse<()>> {
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

    let items: Vec<ExpenseItem> = sqlx::query_as(
        "SELECT id, application_id, category, expense_date, amount, description, receipt_path, \
         receipt_metadata, approved, created_at FROM expense_items WHERE application_id = $1 \
         ORDER BY expense_date, id",
    )
    .bind(application_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load expense items",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    let trip: Option<BusinessTripDetail> = sqlx::query_as(
        "SELECT id, application_id, destination, start_date, end_date, purpose, participants, \
         estimated_daily_allowance, estimated_transportation, estimated_accommodation, \
         actual_daily_allowance, actual_transportation, actual_accommodation, created_at, \
         updated_at FROM business_trip_details WHERE application_id = $1",
    )
    .bind(application_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load trip detail",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    let organization_name: Option<String> = match application.organization_id {
        Some(organization_id) => {
            sqlx::query_scalar("SELECT name FROM organizations WHERE id = $1")
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
        }
        None => None,
    };

    let kind = payload.kind.unwrap_or_else(|| match trip {
        Some(_) => "business_trip_report".to_string(),
        None => "expense_report".to_string(),
    });
    let format = payload.format.unwrap_or_else(|| "pdf".to_string());

    let data = json!({
        "application": application,
        "items": items,
        "trip": trip,
        "organization": organization_name,
    });

    let generated = document::generate(&kind, &data, &format)
        .await
        .map_err(|e| match e {
            IntegrationError::NotConfigured(_) => ApiResponse::<()>::error(
                StatusCode::SERVICE_UNAVAILABLE,
                "Document generator not configured",
                None,
            ),
            other => ApiResponse::<()>::error(
                StatusCode::BAD_GATEWAY,
                "Document generator failed",
                Some(json!({ "error": other.to_string() })),
            ),
        })?;

    let key = format!("{}/{}.{}", user_id, Uuid::new_v4(), generated.extension());
    let full_path = Config::get().document_storage_path.join(&key);
    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create document directory",
                Some(json!({ "error": e.to_string() })),
            )
        })?;
    }
    fs::write(&full_path, &generated.content).await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to write document",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Document generated successfully",
        GeneratedDocumentResponse {
            document_path: key,
            mime_type: generated.mime_type,
        },
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/documents/{path}",
    tag = "Documents",
    params(
        ("path" = String, Path, description = "Document key returned at generation time"),
    ),
    responses(
        (status = 200, description = "Document retrieved successfully"),
        (status = 404, description = "Document not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn fetch_document(
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(path): AxumPath<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.user_id().map_err(|_| StatusCode::BAD_REQUEST)?;

    // Keys are `{user_id}/{uuid}.{ext}`; owners read their own, admins read
    // anything. No traversal out of the bucket.
    if path.contains("..") {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !permissions.is_admin() && !path.starts_with(&format!("{user_id}/")) {
        return Err(StatusCode::NOT_FOUND);
    }

    let full_path = Config::get().document_storage_path.join(&path);
    if fs::metadata(&full_path).await.is_err() {
        return Err(StatusCode::NOT_FOUND);
    }

    let content_type = match full_path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => "application/pdf",
        Some("html") => "text/html",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    };

    let file = fs::File::open(&full_path)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let stream = ReaderStream::new(file);
    axum::response::Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", content_type)
        .body(axum::body::Body::from_stream(stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(generate_document, fetch_document),
    components(schemas(GenerateDocumentRequest, GeneratedDocumentResponse)),
    tags(
        (name = "Documents", description = "Generated report documents")
    )
)]
pub struct DocumentDoc;

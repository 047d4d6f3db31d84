use axum::{
    body::Bytes,
    extract::{Extension, Multipart, Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::api::auth::Claims;
use crate::config::Config;
use crate::db::models::application::Application;
use crate::db::models::expense_item::{
    ExpenseItem, NewExpenseItem, ReceiptUploadResponse, UpdateExpenseItem,
};
use crate::integrations::{ocr, IntegrationError};
use crate::middleware::auth::OrgPermissions;
use crate::utils::api_response::ApiResponse;

use super::application::{can_view, fetch_application, recalculate_total};

const ITEM_COLUMNS: &str = "id, application_id, category, expense_date, amount, description, \
     receipt_path, receipt_metadata, approved, created_at";

async fn fetch_item(
    pool: &PgPool,
    application_id: i32,
    item_id: i32,
) -> Result<Option<ExpenseItem>, sqlx::Error> {
    sqlx::query_as::<_, ExpenseItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM expense_items WHERE id = $1 AND application_id = $2"
    ))
    .bind(item_id)
    .bind(application_id)
    .fetch_optional(pool)
    .await
}

/// Owner-and-editable guard shared by all item mutations.
async fn editable_application(
    pool: &PgPool,
    application_id: i32,
    user_id: i32,
) -> Result<Application, ApiResponse<()>> {
    let application = fetch_application(pool, application_id)
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
    Ok(application)
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/applications/{id}/items",
    tag = "Expense Items",
    params(
        ("id" = i32, Path, description = "ID of the expense application"),
    ),
    responses(
        (status = 200, description = "Expense items retrieved successfully", body = Vec<ExpenseItem>),
        (status = 404, description = "Application not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn list_expense_items(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(application_id): AxumPath<i32>,
) -> Result<ApiResponse<Vec<ExpenseItem>>, ApiResponse<()>> {
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

    let items = sqlx::query_as::<_, ExpenseItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM expense_items WHERE application_id = $1 ORDER BY expense_date, id"
    ))
    .bind(application.id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to retrieve expense items",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Expense items retrieved successfully",
        items,
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/applications/{id}/items",
    tag = "Expense Items",
    params(
        ("id" = i32, Path, description = "ID of the expense application"),
    ),
    request_body = NewExpenseItem,
    responses(
        (status = 201, description = "Expense item created successfully", body = ExpenseItem),
        (status = 404, description = "Application not found"),
        (status = 409, description = "Application is not editable in its current state"),
        (status = 422, description = "Invalid expense item"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn add_expense_item(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    AxumPath(application_id): AxumPath<i32>,
    Json(payload): Json<NewExpenseItem>,
) -> Result<ApiResponse<ExpenseItem>, ApiResponse<()>> {
    let user_id = claims.user_id()?;
    let application = editable_application(&pool, application_id, user_id).await?;

    if application.application_type != crate::db::models::application::ApplicationType::Expense {
        return Err(ApiResponse::<()>::error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Only expense applications carry expense items",
            None,
        ));
    }
    if payload.amount <= BigDecimal::zero() {
        return Err(ApiResponse::<()>::error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Expense item amounts must be positive",
            None,
        ));
    }

    let mut tx = pool.begin().await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to start transaction",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    let item = sqlx::query_as::<_, ExpenseItem>(&format!(
        r#"
        INSERT INTO expense_items (application_id, category, expense_date, amount, description)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {ITEM_COLUMNS}
        "#
    ))
    .bind(application_id)
    .bind(&payload.category)
    .bind(payload.expense_date)
    .bind(&payload.amount)
    .bind(&payload.description)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create expense item",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    recalculate_total(&mut tx, application_id).await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to recompute application total",
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

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Expense item created successfully",
        item,
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    patch,
    path = "/applications/{id}/items/{item_id}",
    tag = "Expense Items",
    params(
        ("id" = i32, Path, description = "ID of the expense application"),
        ("item_id" = i32, Path, description = "ID of the expense item"),
    ),
    request_body = UpdateExpenseItem,
    responses(
        (status = 200, description = "Expense item updated successfully", body = ExpenseItem),
        (status = 400, description = "No fields provided for update"),
        (status = 404, description = "Expense item not found"),
        (status = 422, description = "Invalid expense item"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_expense_item(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    AxumPath((application_id, item_id)): AxumPath<(i32, i32)>,
    Json(payload): Json<UpdateExpenseItem>,
) -> Result<ApiResponse<ExpenseItem>, ApiResponse<()>> {
    let user_id = claims.user_id()?;
    editable_application(&pool, application_id, user_id).await?;

    if payload.is_empty() {
        return Err(ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "No fields provided for update",
            None,
        ));
    }
    if let Some(amount) = &payload.amount {
        if amount <= &BigDecimal::zero() {
            return Err(ApiResponse::<()>::error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Expense item amounts must be positive",
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

    let item = sqlx::query_as::<_, ExpenseItem>(&format!(
        r#"
        UPDATE expense_items
           SET category = COALESCE($1, category),
               expense_date = COALESCE($2, expense_date),
               amount = COALESCE($3, amount),
               description = COALESCE($4, description),
               approved = COALESCE($5, approved)
         WHERE id = $6 AND application_id = $7
        RETURNING {ITEM_COLUMNS}
        "#
    ))
    .bind(&payload.category)
    .bind(payload.expense_date)
    .bind(&payload.amount)
    .bind(&payload.description)
    .bind(payload.approved)
    .bind(item_id)
    .bind(application_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update expense item",
            Some(json!({ "error": e.to_string() })),
        )
    })?
    .ok_or_else(|| {
        ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Expense item not found", None)
    })?;

    recalculate_total(&mut tx, application_id).await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to recompute application total",
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

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Expense item updated successfully",
        item,
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    delete,
    path = "/applications/{id}/items/{item_id}",
    tag = "Expense Items",
    params(
        ("id" = i32, Path, description = "ID of the expense application"),
        ("item_id" = i32, Path, description = "ID of the expense item"),
    ),
    responses(
        (status = 200, description = "Expense item deleted successfully"),
        (status = 404, description = "Expense item not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn delete_expense_item(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    AxumPath((application_id, item_id)): AxumPath<(i32, i32)>,
) -> Result<ApiResponse<()>, ApiResponse<()>> {
    let user_id = claims.user_id()?;
    editable_application(&pool, application_id, user_id).await?;

    let mut tx = pool.begin().await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to start transaction",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    let result = sqlx::query("DELETE FROM expense_items WHERE id = $1 AND application_id = $2")
        .bind(item_id)
        .bind(application_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete expense item",
                Some(json!({ "error": e.to_string() })),
            )
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiResponse::<()>::error(
            StatusCode::NOT_FOUND,
            "Expense item not found",
            None,
        ));
    }

    recalculate_total(&mut tx, application_id).await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to recompute application total",
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

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Expense item deleted successfully",
        (),
    ))
}

/// Receipts are stored under `{user_id}/{timestamp}.{ext}` in the receipts
/// bucket; the row keeps the relative key only.
fn receipt_key(user_id: i32, filename: &str) -> String {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    format!("{}/{}.{}", user_id, Utc::now().timestamp_millis(), ext)
}

fn receipt_content_type(path: &str) -> &'static str {
    match std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/applications/{id}/items/{item_id}/receipt",
    tag = "Expense Items",
    params(
        ("id" = i32, Path, description = "ID of the expense application"),
        ("item_id" = i32, Path, description = "ID of the expense item"),
    ),
    responses(
        (status = 200, description = "Receipt uploaded successfully", body = ReceiptUploadResponse),
        (status = 400, description = "No receipt file uploaded"),
        (status = 404, description = "Expense item not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn upload_receipt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    AxumPath((application_id, item_id)): AxumPath<(i32, i32)>,
    mut multipart: Multipart,
) -> Result<ApiResponse<ReceiptUploadResponse>, ApiResponse<()>> {
    let user_id = claims.user_id()?;
    editable_application(&pool, application_id, user_id).await?;

    let item = fetch_item(&pool, application_id, item_id)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load expense item",
                Some(json!({ "error": e.to_string() })),
            )
        })?
        .ok_or_else(|| {
            ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Expense item not found", None)
        })?;

    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Failed to process multipart data",
            Some(json!({ "error": e.to_string() })),
        )
    })? {
        if let Some(filename) = field.file_name().map(|s| s.to_string()) {
            let data = field.bytes().await.map_err(|e| {
                ApiResponse::<()>::error(
                    StatusCode::BAD_REQUEST,
                    "Failed to read receipt data",
                    Some(json!({ "error": e.to_string() })),
                )
            })?;
            upload = Some((filename, data));
            break;
        }
    }

    let Some((filename, data)) = upload else {
        return Err(ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "No receipt file uploaded",
            None,
        ));
    };

    let key = receipt_key(user_id, &filename);
    let full_path = Config::get().receipt_storage_path.join(&key);
    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create receipt directory",
                Some(json!({ "error": e.to_string() })),
            )
        })?;
    }
    fs::write(&full_path, &data).await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to write receipt file",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    // OCR is prefill assistance only: any failure is logged and the upload
    // still succeeds.
    let extraction = match ocr::extract_receipt(&data).await {
        Ok(extraction) => serde_json::to_value(extraction).ok(),
        Err(IntegrationError::NotConfigured(_)) => {
            debug!("OCR service not configured, skipping receipt extraction");
            None
        }
        Err(e) => {
            warn!("receipt OCR failed for item {}: {e}", item.id);
            None
        }
    };

    sqlx::query(
        "UPDATE expense_items SET receipt_path = $1, receipt_metadata = COALESCE($2, receipt_metadata) WHERE id = $3",
    )
    .bind(&key)
    .bind(&extraction)
    .bind(item_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update expense item with receipt",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Receipt uploaded successfully",
        ReceiptUploadResponse {
            receipt_path: key,
            ocr: extraction,
        },
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/applications/{id}/items/{item_id}/receipt",
    tag = "Expense Items",
    params(
        ("id" = i32, Path, description = "ID of the expense application"),
        ("item_id" = i32, Path, description = "ID of the expense item"),
    ),
    responses(
        (status = 200, description = "Receipt retrieved successfully"),
        (status = 404, description = "Receipt not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_receipt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath((application_id, item_id)): AxumPath<(i32, i32)>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.user_id().map_err(|_| StatusCode::BAD_REQUEST)?;

    let application = fetch_application(&pool, application_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .filter(|app| can_view(app, user_id, &permissions))
        .ok_or(StatusCode::NOT_FOUND)?;

    let item = fetch_item(&pool, application.id, item_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let Some(key) = item.receipt_path else {
        return Err(StatusCode::NOT_FOUND);
    };
    let full_path = Config::get().receipt_storage_path.join(&key);
    if fs::metadata(&full_path).await.is_err() {
        return Err(StatusCode::NOT_FOUND);
    }

    let file = fs::File::open(&full_path)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let stream = ReaderStream::new(file);
    axum::response::Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", receipt_content_type(&key))
        .body(axum::body::Body::from_stream(stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_key_is_scoped_to_the_user() {
        let key = receipt_key(7, "lunch.JPG");
        assert!(key.starts_with("7/"));
        assert!(key.ends_with(".JPG"));
    }

    #[test]
    fn receipt_key_defaults_extension() {
        let key = receipt_key(7, "receipt");
        assert!(key.ends_with(".bin"));
    }

    #[test]
    fn content_type_by_extension() {
        assert_eq!(receipt_content_type("7/1.png"), "image/png");
        assert_eq!(receipt_content_type("7/1.jpeg"), "image/jpeg");
        assert_eq!(receipt_content_type("7/1.pdf"), "application/pdf");
        assert_eq!(receipt_content_type("7/1.xyz"), "application/octet-stream");
    }
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        list_expense_items,
        add_expense_item,
        update_expense_item,
        delete_expense_item,
        upload_receipt,
        get_receipt
    ),
    components(
        schemas(
            crate::db::models::expense_item::ExpenseItem,
            crate::db::models::expense_item::NewExpenseItem,
            crate::db::models::expense_item::UpdateExpenseItem,
            crate::db::models::expense_item::ReceiptUploadResponse
        )
    ),
    tags(
        (name = "Expense Items", description = "Expense line items and receipts")
    )
)]
pub struct ExpenseItemDoc;

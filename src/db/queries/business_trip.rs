use axum::{
    extract::{Extension, Path as AxumPath, State},
    http::StatusCode,
    Json,
};
use bigdecimal::{BigDecimal, Zero};
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::api::auth::Claims;
use crate::db::models::business_trip::{BusinessTripDetail, UpsertBusinessTripDetail};
use crate::middleware::auth::OrgPermissions;
use crate::utils::api_response::ApiResponse;

use super::application::{can_view, fetch_application, recalculate_total};

const TRIP_COLUMNS: &str = "id, application_id, destination, start_date, end_date, purpose, \
     participants, estimated_daily_allowance, estimated_transportation, estimated_accommodation, \
     actual_daily_allowance, actual_transportation, actual_accommodation, created_at, updated_at";

/// Field-level validation shared by create-with-children and upsert.
pub fn validate_trip_detail(trip: &UpsertBusinessTripDetail) -> Result<(), String> {
    if trip.start_date > trip.end_date {
        return Err("Trip end date must not precede its start date".to_string());
    }
    let amounts = [
        ("estimated_daily_allowance", &trip.estimated_daily_allowance),
        ("estimated_transportation", &trip.estimated_transportation),
        ("estimated_accommodation", &trip.estimated_accommodation),
        ("actual_daily_allowance", &trip.actual_daily_allowance),
        ("actual_transportation", &trip.actual_transportation),
        ("actual_accommodation", &trip.actual_accommodation),
    ];
    for (field, amount) in amounts {
        if let Some(value) = amount {
            if value < &BigDecimal::zero() {
                return Err(format!("{field} must not be negative"));
            }
        }
    }
    Ok(())
}

/// Insert or replace the single trip detail row for an application.
pub async fn insert_trip_detail(
    tx: &mut Transaction<'_, Postgres>,
    application_id: i32,
    trip: &UpsertBusinessTripDetail,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO business_trip_details (
            application_id, destination, start_date, end_date, purpose, participants,
            estimated_daily_allowance, estimated_transportation, estimated_accommodation,
            actual_daily_allowance, actual_transportation, actual_accommodation
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (application_id) DO UPDATE SET
            destination = EXCLUDED.destination,
            start_date = EXCLUDED.start_date,
            end_date = EXCLUDED.end_date,
            purpose = EXCLUDED.purpose,
            participants = EXCLUDED.participants,
            estimated_daily_allowance = EXCLUDED.estimated_daily_allowance,
            estimated_transportation = EXCLUDED.estimated_transportation,
            estimated_accommodation = EXCLUDED.estimated_accommodation,
            actual_daily_allowance = EXCLUDED.actual_daily_allowance,
            actual_transportation = EXCLUDED.actual_transportation,
            actual_accommodation = EXCLUDED.actual_accommodation,
            updated_at = NOW()
        "#,
    )
    .bind(application_id)
    .bind(&trip.destination)
    .bind(trip.start_date)
    .bind(trip.end_date)
    .bind(&trip.purpose)
    .bind(&trip.participants)
    .bind(&trip.estimated_daily_allowance)
    .bind(&trip.estimated_transportation)
    .bind(&trip.estimated_accommodation)
    .bind(&trip.actual_daily_allowance)
    .bind(&trip.actual_transportation)
    .bind(&trip.actual_accommodation)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[axum::debug_handler]
#[utoipa::path(
    put,
    path = "/applications/{id}/trip",
    tag = "Applications",
    params(
        ("id" = i32, Path, description = "ID of the business trip application"),
    ),
    request_body = UpsertBusinessTripDetail,
    responses(
        (status = 200, description = "Trip detail saved successfully", body = BusinessTripDetail),
        (status = 404, description = "Application not found"),
        (status = 409, description = "Application is not editable in its current state"),
        (status = 422, description = "Invalid trip detail"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn upsert_trip_detail(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    AxumPath(application_id): AxumPath<i32>,
    Json(payload): Json<UpsertBusinessTripDetail>,
) -> Result<ApiResponse<BusinessTripDetail>, ApiResponse<()>> {
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
            "Only the owner can edit an application",
            None,
        ));
    }
    if application.application_type != crate::db::models::application::ApplicationType::BusinessTrip
    {
        return Err(ApiResponse::<()>::error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Only business trip applications carry a trip detail",
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
    if let Err(message) = validate_trip_detail(&payload) {
        return Err(ApiResponse::<()>::error(
            StatusCode::UNPROCESSABLE_ENTITY,
            message,
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

    insert_trip_detail(&mut tx, application_id, &payload)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to save trip detail",
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

    let detail = sqlx::query_as::<_, BusinessTripDetail>(&format!(
        "SELECT {TRIP_COLUMNS} FROM business_trip_details WHERE application_id = $1"
    ))
    .bind(application_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load trip detail",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Trip detail saved successfully",
        detail,
    ))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/applications/{id}/trip",
    tag = "Applications",
    params(
        ("id" = i32, Path, description = "ID of the business trip application"),
    ),
    responses(
        (status = 200, description = "Trip detail retrieved successfully", body = BusinessTripDetail),
        (status = 404, description = "Application or trip detail not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_trip_detail(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<OrgPermissions>,
    AxumPath(application_id): AxumPath<i32>,
) -> Result<ApiResponse<BusinessTripDetail>, ApiResponse<()>> {
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

    let detail = sqlx::query_as::<_, BusinessTripDetail>(&format!(
        "SELECT {TRIP_COLUMNS} FROM business_trip_details WHERE application_id = $1"
    ))
    .bind(application.id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load trip detail",
            Some(json!({ "error": e.to_string() })),
        )
    })?
    .ok_or_else(|| {
        ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Trip detail not found", None)
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Trip detail retrieved successfully",
        detail,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn trip(start: (i32, u32, u32), end: (i32, u32, u32)) -> UpsertBusinessTripDetail {
        UpsertBusinessTripDetail {
            destination: Some("Nagoya".to_string()),
            start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            purpose: "Trade show".to_string(),
            participants: None,
            estimated_daily_allowance: Some(BigDecimal::from(15000)),
            estimated_transportation: None,
            estimated_accommodation: None,
            actual_daily_allowance: None,
            actual_transportation: None,
            actual_accommodation: None,
        }
    }

    #[test]
    fn end_before_start_is_rejected() {
        let detail = trip((2024, 6, 12), (2024, 6, 10));
        assert!(validate_trip_detail(&detail).is_err());
    }

    #[test]
    fn single_day_trip_is_valid() {
        let detail = trip((2024, 6, 10), (2024, 6, 10));
        assert!(validate_trip_detail(&detail).is_ok());
    }

    #[test]
    fn negative_estimate_is_rejected() {
        let mut detail = trip((2024, 6, 10), (2024, 6, 12));
        detail.estimated_transportation = Some(BigDecimal::from(-100));
        let err = validate_trip_detail(&detail).unwrap_err();
        assert!(err.contains("estimated_transportation"));
    }
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(upsert_trip_detail, get_trip_detail),
    components(
        schemas(
            crate::db::models::business_trip::BusinessTripDetail,
            crate::db::models::business_trip::UpsertBusinessTripDetail
        )
    ),
    tags(
        (name = "Applications", description = "Business trip details")
    )
)]
pub struct BusinessTripDoc;

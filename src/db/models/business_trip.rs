// src/db/models/business_trip.rs
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, FromRow, ToSchema)]
pub struct BusinessTripDetail {
    pub id: i32,
    pub application_id: i32,
    pub destination: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub purpose: String,
    pub participants: Option<String>,
    #[schema(value_type = f64)]
    pub estimated_daily_allowance: Option<BigDecimal>,
    #[schema(value_type = f64)]
    pub estimated_transportation: Option<BigDecimal>,
    #[schema(value_type = f64)]
    pub estimated_accommodation: Option<BigDecimal>,
    #[schema(value_type = f64)]
    pub actual_daily_allowance: Option<BigDecimal>,
    #[schema(value_type = f64)]
    pub actual_transportation: Option<BigDecimal>,
    #[schema(value_type = f64)]
    pub actual_accommodation: Option<BigDecimal>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// One detail row per application, written with an upsert.
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct UpsertBusinessTripDetail {
    pub destination: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub purpose: String,
    pub participants: Option<String>,
    #[schema(value_type = f64)]
    pub estimated_daily_allowance: Option<BigDecimal>,
    #[schema(value_type = f64)]
    pub estimated_transportation: Option<BigDecimal>,
    #[schema(value_type = f64)]
    pub estimated_accommodation: Option<BigDecimal>,
    #[schema(value_type = f64)]
    pub actual_daily_allowance: Option<BigDecimal>,
    #[schema(value_type = f64)]
    pub actual_transportation: Option<BigDecimal>,
    #[schema(value_type = f64)]
    pub actual_accommodation: Option<BigDecimal>,
}

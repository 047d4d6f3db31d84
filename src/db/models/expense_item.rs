// src/db/models/expense_item.rs
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, FromRow, ToSchema)]
pub struct ExpenseItem {
    pub id: i32,
    pub application_id: i32,
    pub category: Option<String>,
    pub expense_date: NaiveDate,
    #[schema(value_type = f64)]
    pub amount: BigDecimal,
    pub description: Option<String>,
    pub receipt_path: Option<String>,
    pub receipt_metadata: Option<Value>,
    pub approved: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct NewExpenseItem {
    pub category: Option<String>,
    pub expense_date: NaiveDate,
    #[schema(value_type = f64)]
    pub amount: BigDecimal,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateExpenseItem {
    pub category: Option<String>,
    pub expense_date: Option<NaiveDate>,
    #[schema(value_type = f64)]
    pub amount: Option<BigDecimal>,
    pub description: Option<String>,
    pub approved: Option<bool>,
}

impl UpdateExpenseItem {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.expense_date.is_none()
            && self.amount.is_none()
            && self.description.is_none()
            && self.approved.is_none()
    }
}

/// Receipt upload result: the stored object path plus whatever the OCR
/// service managed to read out of the image.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReceiptUploadResponse {
    pub receipt_path: String,
    pub ocr: Option<Value>,
}

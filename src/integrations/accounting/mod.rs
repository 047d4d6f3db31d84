// Accounting sync: translates an approved application into a transaction
// payload for the organization's configured accounting service.
pub mod freee;

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::accounting::{AccountingConfig, SyncStatus};
use crate::db::models::application::Application;
use crate::db::models::business_trip::BusinessTripDetail;
use crate::db::models::expense_item::ExpenseItem;
use crate::integrations::IntegrationError;

use self::freee::FreeeClient;

/// One line of the transaction pushed to the accounting service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionLine {
    pub description: String,
    pub amount: BigDecimal,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionPayload {
    /// Application id, used as the external reference.
    pub reference: i32,
    pub title: String,
    pub issue_date: NaiveDate,
    pub lines: Vec<TransactionLine>,
}

/// Remote entry handle returned by `create_entry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryResult {
    pub id: String,
    pub status: String,
}

/// Result surfaced to the caller of a sync attempt. Never an error: the
/// caller decides whether to show a warning.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncOutcome {
    pub log_id: i32,
    pub status: SyncStatus,
    pub remote_id: Option<String>,
    pub error: Option<String>,
}

/// Services are swappable strategies keyed by the organization's config row.
pub enum ConfiguredService {
    Freee(FreeeClient),
}

impl ConfiguredService {
    pub fn from_config(config: &AccountingConfig) -> Result<Self, IntegrationError> {
        match config.service.as_str() {
            "freee" => Ok(ConfiguredService::Freee(FreeeClient::new(config)?)),
            other => Err(IntegrationError::UnsupportedService(other.to_string())),
        }
    }

    pub async fn create_entry(
        &self,
        payload: &TransactionPayload,
    ) -> Result<EntryResult, IntegrationError> {
        match self {
            ConfiguredService::Freee(client) => client.create_entry(payload).await,
        }
    }
}

/// Expense applications become one line per item.
pub fn expense_lines(items: &[ExpenseItem]) -> Vec<TransactionLine> {
    items
        .iter()
        .map(|item| TransactionLine {
            description: item
                .description
                .clone()
                .unwrap_or_else(|| format!("Expense item {}", item.id)),
            amount: item.amount.clone(),
            category: item.category.clone(),
        })
        .collect()
}

/// Business trips become one line per non-zero estimate field.
pub fn trip_lines(detail: &BusinessTripDetail) -> Vec<TransactionLine> {
    let fields = [
        ("Daily allowance", &detail.estimated_daily_allowance),
        ("Transportation", &detail.estimated_transportation),
        ("Accommodation", &detail.estimated_accommodation),
    ];
    fields
        .iter()
        .filter_map(|(label, amount)| match amount {
            Some(value) if !value.is_zero() => Some(TransactionLine {
                description: label.to_string(),
                amount: value.clone(),
                category: None,
            }),
            _ => None,
        })
        .collect()
}

pub fn build_payload(
    application: &Application,
    items: &[ExpenseItem],
    trip: Option<&BusinessTripDetail>,
) -> TransactionPayload {
    let lines = match trip {
        Some(detail) => trip_lines(detail),
        None => expense_lines(items),
    };
    let issue_date = application
        .approved_at
        .map(|ts| ts.date())
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    TransactionPayload {
        reference: application.id,
        title: application.title.clone(),
        issue_date,
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn item(id: i32, amount: i64, description: Option<&str>) -> ExpenseItem {
        ExpenseItem {
            id,
            application_id: 1,
            category: Some("travel".to_string()),
            expense_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            amount: BigDecimal::from(amount),
            description: description.map(str::to_string),
            receipt_path: None,
            receipt_metadata: None,
            approved: false,
            created_at: NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    fn detail(
        allowance: Option<i64>,
        transportation: Option<i64>,
        accommodation: Option<i64>,
    ) -> BusinessTripDetail {
        let ts = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        BusinessTripDetail {
            id: 1,
            application_id: 1,
            destination: Some("Osaka".to_string()),
            start_date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 12).unwrap(),
            purpose: "Customer visit".to_string(),
            participants: None,
            estimated_daily_allowance: allowance.map(BigDecimal::from),
            estimated_transportation: transportation.map(BigDecimal::from),
            estimated_accommodation: accommodation.map(BigDecimal::from),
            actual_daily_allowance: None,
            actual_transportation: None,
            actual_accommodation: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn expense_lines_one_per_item() {
        let lines = expense_lines(&[item(1, 3000, Some("Taxi")), item(2, 4500, None)]);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].description, "Taxi");
        assert_eq!(lines[0].amount, BigDecimal::from(3000));
        assert_eq!(lines[1].description, "Expense item 2");
    }

    #[test]
    fn trip_lines_skip_missing_and_zero_estimates() {
        let lines = trip_lines(&detail(Some(15000), None, Some(0)));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].description, "Daily allowance");
        assert_eq!(lines[0].amount, BigDecimal::from(15000));
    }

    #[test]
    fn trip_lines_full_estimate_set() {
        let lines = trip_lines(&detail(Some(15000), Some(22500), Some(15000)));
        assert_eq!(lines.len(), 3);
        let total = lines
            .iter()
            .fold(BigDecimal::from(0), |acc, line| acc + &line.amount);
        assert_eq!(total, BigDecimal::from(52500));
    }
}

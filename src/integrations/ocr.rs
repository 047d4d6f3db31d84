// Receipt OCR client. The image is shipped base64-encoded to the configured
// extraction endpoint; output is only ever used to pre-fill expense item
// fields, so parsing is tolerant of missing keys.
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;

use crate::config::Config;
use crate::integrations::{http_client, IntegrationError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptLine {
    pub description: String,
    pub amount: Option<BigDecimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptExtraction {
    pub store_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Option<BigDecimal>,
    pub line_items: Vec<ReceiptLine>,
    pub confidence: Option<f64>,
}

pub async fn extract_receipt(image: &[u8]) -> Result<ReceiptExtraction, IntegrationError> {
    let Some(url) = Config::get().ocr_service_url.clone() else {
        return Err(IntegrationError::NotConfigured("OCR".to_string()));
    };

    let response = http_client()?
        .post(&url)
        .json(&json!({ "image": BASE64.encode(image) }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IntegrationError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let value: Value = response.json().await?;
    Ok(parse_extraction(&value))
}

fn parse_extraction(value: &Value) -> ReceiptExtraction {
    let line_items = value
        .get("lineItems")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let description = item.get("description")?.as_str()?.to_string();
                    Some(ReceiptLine {
                        description,
                        amount: parse_amount(item.get("amount")),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ReceiptExtraction {
        store_name: value
            .get("storeName")
            .and_then(Value::as_str)
            .map(str::to_string),
        date: value
            .get("date")
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
        amount: parse_amount(value.get("amount")),
        line_items,
        confidence: value.get("confidence").and_then(Value::as_f64),
    }
}

fn parse_amount(value: Option<&Value>) -> Option<BigDecimal> {
    match value? {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        Value::String(s) => BigDecimal::from_str(s).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_parses_full_response() {
        let value = serde_json::json!({
            "storeName": "JR East",
            "date": "2024-06-10",
            "amount": 3000,
            "lineItems": [
                { "description": "Shinkansen ticket", "amount": "2800.00" },
                { "description": "Seat reservation" }
            ],
            "confidence": 0.92
        });

        let parsed = parse_extraction(&value);
        assert_eq!(parsed.store_name.as_deref(), Some("JR East"));
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2024, 6, 10));
        assert_eq!(parsed.amount, Some(BigDecimal::from(3000)));
        assert_eq!(parsed.line_items.len(), 2);
        assert_eq!(parsed.line_items[1].amount, None);
        assert_eq!(parsed.confidence, Some(0.92));
    }

    #[test]
    fn extraction_tolerates_empty_response() {
        let parsed = parse_extraction(&serde_json::json!({}));
        assert_eq!(parsed.store_name, None);
        assert_eq!(parsed.date, None);
        assert_eq!(parsed.amount, None);
        assert!(parsed.line_items.is_empty());
    }
}

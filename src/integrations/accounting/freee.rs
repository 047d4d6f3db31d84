// freee-style deals API adapter. Payloads follow the public JSON shape:
// POST {base_url}/api/1/deals with a bearer token.
use serde_json::{json, Value};

use crate::db::models::accounting::AccountingConfig;
use crate::integrations::{http_client, IntegrationError};

use super::{EntryResult, TransactionPayload};

pub struct FreeeClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    company_id: Option<String>,
}

impl FreeeClient {
    pub fn new(config: &AccountingConfig) -> Result<Self, IntegrationError> {
        Ok(Self {
            http: http_client()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            company_id: config.company_id.clone(),
        })
    }

    pub async fn create_entry(
        &self,
        payload: &TransactionPayload,
    ) -> Result<EntryResult, IntegrationError> {
        let body = build_deal_body(payload, self.company_id.as_deref());

        let response = self
            .http
            .post(format!("{}/api/1/deals", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
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
        Ok(parse_deal_response(&value))
    }
}

fn build_deal_body(payload: &TransactionPayload, company_id: Option<&str>) -> Value {
    let details: Vec<Value> = payload
        .lines
        .iter()
        .map(|line| {
            json!({
                "amount": line.amount.to_string(),
                "description": line.description,
                "account_item": line.category,
            })
        })
        .collect();

    json!({
        "company_id": company_id,
        "issue_date": payload.issue_date.format("%Y-%m-%d").to_string(),
        "type": "expense",
        "ref_number": payload.reference.to_string(),
        "memo": payload.title,
        "details": details,
    })
}

fn parse_deal_response(value: &Value) -> EntryResult {
    let deal = value.get("deal").unwrap_or(value);
    EntryResult {
        id: deal
            .get("id")
            .map(|id| id.to_string().trim_matches('"').to_string())
            .unwrap_or_default(),
        status: deal
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("settled")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::accounting::TransactionLine;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    #[test]
    fn deal_body_carries_all_lines() {
        let payload = TransactionPayload {
            reference: 42,
            title: "June trip".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            lines: vec![
                TransactionLine {
                    description: "Transportation".to_string(),
                    amount: BigDecimal::from(22500),
                    category: None,
                },
                TransactionLine {
                    description: "Accommodation".to_string(),
                    amount: BigDecimal::from(15000),
                    category: Some("lodging".to_string()),
                },
            ],
        };

        let body = build_deal_body(&payload, Some("123"));
        assert_eq!(body["issue_date"], "2024-06-15");
        assert_eq!(body["ref_number"], "42");
        assert_eq!(body["details"].as_array().unwrap().len(), 2);
        assert_eq!(body["details"][1]["account_item"], "lodging");
    }

    #[test]
    fn deal_response_parses_nested_and_flat_shapes() {
        let nested = serde_json::json!({ "deal": { "id": 991, "status": "unsettled" } });
        let parsed = parse_deal_response(&nested);
        assert_eq!(parsed.id, "991");
        assert_eq!(parsed.status, "unsettled");

        let flat = serde_json::json!({ "id": "abc" });
        let parsed = parse_deal_response(&flat);
        assert_eq!(parsed.id, "abc");
        assert_eq!(parsed.status, "settled");
    }
}

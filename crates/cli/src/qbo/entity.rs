// QBO Deposit JSON ⇄ Record

use serde_json::{json, Value};

use tallysync_recon::{Category, Origin, Record};

/// Escape a literal for a QBO query string.
pub fn qbo_escape(s: &str) -> String {
    s.replace('\'', "''")
}

pub fn extract_amount(val: &Value) -> Result<f64, String> {
    let amount = if let Some(s) = val.as_str() {
        s.trim()
            .parse::<f64>()
            .map_err(|_| format!("invalid amount '{s}'"))?
    } else if let Some(n) = val.as_f64() {
        n
    } else {
        return Err(format!("expected number or string, got {val:?}"));
    };
    if amount.is_finite() {
        Ok(amount)
    } else {
        Err(format!("non-finite amount {amount}"))
    }
}

/// Deposit → Record, from the destination's point of view.
///
/// The reference is the deposit's `PrivateNote` (where sync writes the
/// spreadsheet ID) or `deposit:<Id>` when the deposit was entered by hand.
/// Customer, category and memo come from the first line. `fallback` fills
/// names the API omitted from a create response.
pub fn deposit_to_record(entity: &Value, fallback: Option<&Record>) -> Result<Record, String> {
    let id = entity["Id"].as_str().unwrap_or("");

    let amount = extract_amount(&entity["TotalAmt"]).map_err(|e| format!("deposit {id} bad TotalAmt: {e}"))?;

    let reference = entity["PrivateNote"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("deposit:{id}"));

    let line = entity["Line"]
        .as_array()
        .and_then(|lines| lines.first())
        .unwrap_or(&Value::Null);
    let detail = &line["DepositLineDetail"];

    let category_name = detail["AccountRef"]["name"]
        .as_str()
        .map(str::to_string)
        .or_else(|| fallback.map(|r| r.category.as_str().to_string()))
        .unwrap_or_default();
    let category = Category::new(&category_name)
        .map_err(|_| format!("deposit {id} has no income account on its first line"))?;

    let customer = detail["Entity"]["name"]
        .as_str()
        .map(str::to_string)
        .or_else(|| fallback.map(|r| r.customer.clone()))
        .unwrap_or_default();

    let mut record = Record::new(reference, category, amount, Origin::Right).with_customer(customer);
    if let Some(memo) = line["Description"].as_str() {
        record = record.with_memo(memo);
    }
    Ok(record)
}

/// Ids a deposit create needs, resolved from names beforehand.
#[derive(Debug, Clone, PartialEq)]
pub struct DepositRefs {
    pub bank_account_id: String,
    pub income_account_id: String,
    pub customer_id: Option<String>,
}

/// Record → Deposit create body. The record reference goes into
/// `PrivateNote` so a later fetch maps back to the same key.
pub fn record_to_deposit(record: &Record, refs: &DepositRefs) -> Value {
    let mut detail = json!({
        "AccountRef": {
            "value": refs.income_account_id,
            "name": record.category.as_str(),
        }
    });
    if let Some(customer_id) = &refs.customer_id {
        detail["Entity"] = json!({
            "value": customer_id,
            "name": record.customer,
            "type": "Customer",
        });
    }

    let mut line = json!({
        "Amount": record.amount,
        "DetailType": "DepositLineDetail",
        "DepositLineDetail": detail,
    });
    if let Some(memo) = &record.memo {
        line["Description"] = json!(memo);
    }

    json!({
        "DepositToAccountRef": { "value": refs.bank_account_id },
        "PrivateNote": record.reference,
        "Line": [line],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::new("1001", Category::new("Rent").unwrap(), 250.5, Origin::Left)
            .with_customer("Acme")
            .with_memo("January")
    }

    #[test]
    fn test_qbo_escape() {
        assert_eq!(qbo_escape("Owner's Draw"), "Owner''s Draw");
        assert_eq!(qbo_escape("plain"), "plain");
    }

    #[test]
    fn test_extract_amount() {
        assert_eq!(extract_amount(&json!(12.5)), Ok(12.5));
        assert_eq!(extract_amount(&json!("99.10")), Ok(99.1));
        assert!(extract_amount(&json!("abc")).is_err());
        assert!(extract_amount(&Value::Null).is_err());
    }

    #[test]
    fn test_parse_deposit() {
        let entity = json!({
            "Id": "101",
            "TotalAmt": 250.5,
            "PrivateNote": "1001",
            "DepositToAccountRef": { "value": "35" },
            "Line": [{
                "Amount": 250.5,
                "Description": "January",
                "DepositLineDetail": {
                    "AccountRef": { "value": "80", "name": "Rent" },
                    "Entity": { "value": "7", "name": "Acme", "type": "Customer" }
                }
            }]
        });
        let r = deposit_to_record(&entity, None).unwrap();
        assert_eq!(r.reference, "1001");
        assert_eq!(r.customer, "Acme");
        assert_eq!(r.category.as_str(), "Rent");
        assert_eq!(r.amount, 250.5);
        assert_eq!(r.memo.as_deref(), Some("January"));
        assert_eq!(r.origin, Origin::Right);
    }

    #[test]
    fn test_parse_deposit_without_note_uses_id() {
        let entity = json!({
            "Id": "55",
            "TotalAmt": "10.00",
            "Line": [{ "DepositLineDetail": { "AccountRef": { "name": "Interest" } } }]
        });
        let r = deposit_to_record(&entity, None).unwrap();
        assert_eq!(r.reference, "deposit:55");
        assert_eq!(r.customer, "");
        assert_eq!(r.memo, None);
    }

    #[test]
    fn test_parse_deposit_without_category_fails() {
        let entity = json!({ "Id": "9", "TotalAmt": 1.0, "Line": [] });
        let err = deposit_to_record(&entity, None).unwrap_err();
        assert!(err.contains("deposit 9"), "{err}");
    }

    #[test]
    fn test_fallback_fills_missing_names() {
        let entity = json!({
            "Id": "200",
            "TotalAmt": 250.5,
            "PrivateNote": "1001",
            "Line": [{ "DepositLineDetail": { "AccountRef": { "value": "80" } } }]
        });
        let r = deposit_to_record(&entity, Some(&record())).unwrap();
        assert_eq!(r.category.as_str(), "Rent");
        assert_eq!(r.customer, "Acme");
    }

    #[test]
    fn test_record_to_deposit() {
        let refs = DepositRefs {
            bank_account_id: "35".into(),
            income_account_id: "80".into(),
            customer_id: Some("7".into()),
        };
        let body = record_to_deposit(&record(), &refs);
        assert_eq!(body["DepositToAccountRef"]["value"], "35");
        assert_eq!(body["PrivateNote"], "1001");
        assert_eq!(body["Line"][0]["Amount"], 250.5);
        assert_eq!(body["Line"][0]["Description"], "January");
        assert_eq!(body["Line"][0]["DepositLineDetail"]["AccountRef"]["value"], "80");
        assert_eq!(body["Line"][0]["DepositLineDetail"]["Entity"]["value"], "7");
        assert!(body["TotalAmt"].is_null(), "QBO computes the total");
    }

    #[test]
    fn test_record_without_customer_has_no_entity() {
        let refs = DepositRefs {
            bank_account_id: "35".into(),
            income_account_id: "80".into(),
            customer_id: None,
        };
        let body = record_to_deposit(&record().with_customer(""), &refs);
        assert!(body["Line"][0]["DepositLineDetail"]["Entity"].is_null());
    }
}

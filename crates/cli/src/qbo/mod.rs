//! QuickBooks Online as the accounting-system side of a sync.
//!
//! Records live as Deposits into one bank account. Reads page through all
//! deposits and keep the ones booked to that account; writes go through
//! the batch endpoint with one `create` per record, so a bad item fails on
//! its own while the rest are stored.

mod client;
mod credentials;
mod entity;
mod session;

use std::path::Path;
#[cfg(test)]
use std::time::Duration;

use serde_json::{json, Value};

use tallysync_recon::{AccountSink, Record, SinkError};

use client::ApiClient;
use credentials::Auth;
#[cfg(test)]
use credentials::QboCredentials;
use entity::{deposit_to_record, record_to_deposit, DepositRefs};
use session::{Endpoints, Lookup, Session};

const QBO_API_BASE: &str = "https://quickbooks.api.intuit.com";
const QBO_SANDBOX_BASE: &str = "https://sandbox-quickbooks.api.intuit.com";
const QBO_TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";

/// QBO accepts at most 30 operations per batch request.
const MAX_BATCH_ITEMS: usize = 30;

pub struct QboSink {
    account: String,
    api: ApiClient,
    auth: Auth,
    endpoints: Endpoints,
}

impl QboSink {
    /// Load credentials from `credentials` and target production or sandbox.
    pub fn connect(
        account: impl Into<String>,
        credentials: &Path,
        sandbox: bool,
    ) -> Result<Self, SinkError> {
        let base = if sandbox { QBO_SANDBOX_BASE } else { QBO_API_BASE };
        Ok(Self {
            account: account.into(),
            api: ApiClient::new()?,
            auth: Auth::load(credentials)?,
            endpoints: Endpoints {
                base_url: base.to_string(),
                token_url: QBO_TOKEN_URL.to_string(),
            },
        })
    }

    /// Point API and token calls at `base_url` (a mock server in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        self.endpoints = Endpoints {
            token_url: format!("{base_url}/oauth2/v1/tokens/bearer"),
            base_url,
        };
        self
    }

    #[cfg(test)]
    fn from_credentials(account: &str, creds: QboCredentials, base_url: &str) -> Self {
        Self {
            account: account.to_string(),
            api: ApiClient::new().unwrap().with_backoff(Duration::ZERO),
            auth: Auth { creds, path: None },
            endpoints: Endpoints {
                base_url: base_url.to_string(),
                token_url: format!("{base_url}/oauth2/v1/tokens/bearer"),
            },
        }
    }

    fn open(&mut self) -> Result<Session<'_>, SinkError> {
        Session::open(&self.api, &mut self.auth, &self.endpoints)
    }
}

/// Prepare one batch item, resolving the names it refers to.
fn build_item(
    session: &mut Session<'_>,
    bank_account_id: &str,
    record: &Record,
) -> Result<Value, SinkError> {
    let income_account_id = session.resolve(Lookup::IncomeAccount, record.category.as_str())?;
    let customer_id = if record.customer.trim().is_empty() {
        None
    } else {
        Some(session.resolve(Lookup::Customer, &record.customer)?)
    };
    let refs = DepositRefs {
        bank_account_id: bank_account_id.to_string(),
        income_account_id,
        customer_id,
    };
    Ok(record_to_deposit(record, &refs))
}

impl AccountSink for QboSink {
    fn account(&self) -> &str {
        &self.account
    }

    fn fetch_all(&mut self) -> Result<Vec<Record>, SinkError> {
        let account = self.account.clone();
        let mut session = self.open()?;
        let account_id = session.resolve(Lookup::BankAccount, &account)?;

        // DepositToAccountRef is not queryable, filter client-side
        let deposits = session.query_entities("Deposit")?;
        let total = deposits.len();

        let mut records = Vec::new();
        for deposit in deposits
            .iter()
            .filter(|d| d["DepositToAccountRef"]["value"].as_str() == Some(account_id.as_str()))
        {
            match deposit_to_record(deposit, None) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("skipping deposit: {e}"),
            }
        }

        log::info!(
            "fetched {} deposit(s) into '{}' ({} in company)",
            records.len(),
            account,
            total
        );
        Ok(records)
    }

    fn add_batch(&mut self, records: &[Record]) -> Result<Vec<Record>, SinkError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let account = self.account.clone();
        let mut session = self.open()?;
        let bank_account_id = session.resolve(Lookup::BankAccount, &account)?;

        // bId → requested record, for mapping responses back
        let mut pending: Vec<(String, &Record, Value)> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            match build_item(&mut session, &bank_account_id, record) {
                Ok(deposit) => pending.push((i.to_string(), record, deposit)),
                Err(SinkError::UnknownAccount(msg)) => {
                    log::warn!("record '{}' not added: {}", record.reference, msg)
                }
                Err(e) => return Err(e),
            }
        }

        let mut confirmed = Vec::new();
        for chunk in pending.chunks(MAX_BATCH_ITEMS) {
            let items: Vec<Value> = chunk
                .iter()
                .map(|(bid, _, deposit)| {
                    json!({ "bId": bid, "operation": "create", "Deposit": deposit })
                })
                .collect();

            let body = match session.post_batch(&items) {
                Ok(body) => body,
                Err(e) if confirmed.is_empty() => return Err(e),
                Err(e) => {
                    log::warn!(
                        "batch request failed after {} confirmed addition(s): {}",
                        confirmed.len(),
                        e
                    );
                    break;
                }
            };

            let responses = body["BatchItemResponse"]
                .as_array()
                .cloned()
                .unwrap_or_default();
            for response in &responses {
                let bid = response["bId"].as_str().unwrap_or("");
                let Some((_, requested, _)) = chunk.iter().find(|(b, _, _)| b == bid) else {
                    log::warn!("ignoring batch response with unknown bId '{bid}'");
                    continue;
                };

                if !response["Fault"].is_null() {
                    let msg = client::extract_qbo_error(response, 200);
                    log::warn!("record '{}' rejected by QBO: {}", requested.reference, msg);
                    continue;
                }

                match deposit_to_record(&response["Deposit"], Some(*requested)) {
                    Ok(stored) => confirmed.push(stored),
                    Err(e) => log::warn!(
                        "record '{}' stored but unreadable: {}",
                        requested.reference,
                        e
                    ),
                }
            }
        }

        log::info!(
            "QBO confirmed {} of {} deposit(s)",
            confirmed.len(),
            records.len()
        );
        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tallysync_recon::{Category, Origin};

    fn creds(token: &str) -> QboCredentials {
        QboCredentials {
            client_id: "cid".into(),
            client_secret: "csec".into(),
            access_token: token.into(),
            refresh_token: "old_refresh".into(),
            realm_id: "realm_123".into(),
            access_token_expires_at: None,
            refresh_token_expires_at: None,
        }
    }

    fn record(reference: &str, customer: &str, category: &str, amount: f64) -> Record {
        Record::new(reference, Category::new(category).unwrap(), amount, Origin::Left)
            .with_customer(customer)
    }

    fn mock_account(server: &MockServer, fragment: &str, entity: &str, rows: Value) {
        let mut found = serde_json::Map::new();
        found.insert(entity.to_string(), rows);
        let body = json!({ "QueryResponse": found });
        server.mock(|when, then| {
            when.method(GET)
                .path("/v3/company/realm_123/query")
                .query_param_includes("query", fragment);
            then.status(200).json_body(body.clone());
        });
    }

    fn mock_checking(server: &MockServer) {
        mock_account(
            server,
            "AccountType = 'Bank'",
            "Account",
            json!([{ "Id": "35", "Name": "Checking", "AccountType": "Bank" }]),
        );
    }

    #[test]
    fn test_fetch_filters_by_bank_account() {
        let server = MockServer::start();
        mock_checking(&server);
        server.mock(|when, then| {
            when.method(GET)
                .path("/v3/company/realm_123/query")
                .query_param_includes("query", "FROM Deposit");
            then.status(200).json_body(json!({
                "QueryResponse": { "Deposit": [
                    {
                        "Id": "1", "TotalAmt": 100.0, "PrivateNote": "1001",
                        "DepositToAccountRef": { "value": "35" },
                        "Line": [{ "DepositLineDetail": {
                            "AccountRef": { "name": "Rent" },
                            "Entity": { "name": "Acme" }
                        } }]
                    },
                    {
                        "Id": "2", "TotalAmt": 5.0, "PrivateNote": "other",
                        "DepositToAccountRef": { "value": "99" },
                        "Line": [{ "DepositLineDetail": { "AccountRef": { "name": "Rent" } } }]
                    },
                    {
                        "Id": "3", "TotalAmt": 7.0,
                        "DepositToAccountRef": { "value": "35" },
                        "Line": []
                    }
                ] }
            }));
        });

        let mut sink = QboSink::from_credentials("Checking", creds("tok"), &server.base_url());
        let records = sink.fetch_all().unwrap();
        assert_eq!(records.len(), 1, "foreign account and malformed deposit dropped");
        assert_eq!(records[0].reference, "1001");
        assert_eq!(records[0].customer, "Acme");
        assert_eq!(records[0].origin, Origin::Right);
    }

    #[test]
    fn test_unknown_bank_account() {
        let server = MockServer::start();
        mock_account(&server, "AccountType = 'Bank'", "Account", json!([]));

        let mut sink = QboSink::from_credentials("Savings", creds("tok"), &server.base_url());
        let err = sink.fetch_all().unwrap_err();
        assert!(matches!(err, SinkError::UnknownAccount(ref m) if m.contains("'Savings'")));
    }

    #[test]
    fn test_bank_account_without_id_is_protocol_error() {
        let server = MockServer::start();
        mock_account(
            &server,
            "AccountType = 'Bank'",
            "Account",
            json!([{ "Name": "Checking" }]),
        );
        let deposits = server.mock(|when, then| {
            when.method(GET).query_param_includes("query", "FROM Deposit");
            then.status(200).json_body(json!({ "QueryResponse": {} }));
        });

        let mut sink = QboSink::from_credentials("Checking", creds("tok"), &server.base_url());
        let err = sink.fetch_all().unwrap_err();
        assert_eq!(
            err,
            SinkError::Protocol("QBO returned bank account 'Checking' without an Id".into())
        );
        deposits.assert_hits(0);
    }

    #[test]
    fn test_ambiguous_bank_account_lists_candidates() {
        let server = MockServer::start();
        mock_account(
            &server,
            "AccountType = 'Bank'",
            "Account",
            json!([
                { "Id": "35", "Name": "Checking", "FullyQualifiedName": "Business:Checking" },
                { "Id": "36", "Name": "Checking", "FullyQualifiedName": "Personal:Checking" }
            ]),
        );

        let mut sink = QboSink::from_credentials("Checking", creds("tok"), &server.base_url());
        let err = sink.fetch_all().unwrap_err().to_string();
        assert!(err.contains("Business:Checking (ID 35)"), "{err}");
        assert!(err.contains("Personal:Checking (ID 36)"), "{err}");
    }

    #[test]
    fn test_pagination_stops_on_short_page() {
        let server = MockServer::start();
        mock_checking(&server);
        let page = server.mock(|when, then| {
            when.method(GET)
                .path("/v3/company/realm_123/query")
                .query_param_includes("query", "FROM Deposit");
            then.status(200).json_body(json!({ "QueryResponse": {} }));
        });

        let mut sink = QboSink::from_credentials("Checking", creds("tok"), &server.base_url());
        assert!(sink.fetch_all().unwrap().is_empty());
        page.assert_hits(1);
    }

    #[test]
    fn test_token_refresh_on_401() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path_includes("/query")
                .header("Authorization", "Bearer old_token");
            then.status(401).json_body(json!({
                "Fault": { "Error": [{ "Message": "Unauthorized", "Detail": "Token expired" }] }
            }));
        });
        let refresh = server.mock(|when, then| {
            when.method(POST).path("/oauth2/v1/tokens/bearer");
            then.status(200).json_body(json!({
                "access_token": "new_token",
                "refresh_token": "new_refresh",
                "expires_in": 3600
            }));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path_includes("/query")
                .header("Authorization", "Bearer new_token")
                .query_param_includes("query", "AccountType = 'Bank'");
            then.status(200).json_body(json!({
                "QueryResponse": { "Account": [{ "Id": "35", "Name": "Checking" }] }
            }));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path_includes("/query")
                .header("Authorization", "Bearer new_token")
                .query_param_includes("query", "FROM Deposit");
            then.status(200).json_body(json!({ "QueryResponse": { "Deposit": [] } }));
        });

        let mut sink = QboSink::from_credentials("Checking", creds("old_token"), &server.base_url());
        sink.fetch_all().unwrap();
        refresh.assert_hits(1);
        assert_eq!(sink.auth.creds.access_token, "new_token");
    }

    #[test]
    fn test_expired_token_refreshed_before_first_call() {
        let server = MockServer::start();
        let refresh = server.mock(|when, then| {
            when.method(POST).path("/oauth2/v1/tokens/bearer");
            then.status(200).json_body(json!({ "access_token": "fresh" }));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path_includes("/query")
                .header("Authorization", "Bearer fresh");
            then.status(200).json_body(json!({
                "QueryResponse": { "Account": [{ "Id": "35" }], "Deposit": [] }
            }));
        });

        let mut expired = creds("stale");
        expired.access_token_expires_at = Some("2020-01-01T00:00:00+00:00".into());
        let mut sink = QboSink::from_credentials("Checking", expired, &server.base_url());
        sink.fetch_all().unwrap();
        refresh.assert_hits(1);
    }

    #[test]
    fn test_add_batch_skips_faulted_items() {
        let server = MockServer::start();
        mock_checking(&server);
        mock_account(
            &server,
            "Name = 'Rent'",
            "Account",
            json!([{ "Id": "80", "Name": "Rent" }]),
        );
        mock_account(
            &server,
            "DisplayName = 'Acme'",
            "Customer",
            json!([{ "Id": "7", "DisplayName": "Acme" }]),
        );
        let batch = server.mock(|when, then| {
            when.method(POST)
                .path("/v3/company/realm_123/batch")
                .body_includes("\"PrivateNote\":\"1001\"")
                .body_includes("\"PrivateNote\":\"1002\"");
            then.status(200).json_body(json!({
                "BatchItemResponse": [
                    {
                        "bId": "0",
                        "Deposit": {
                            "Id": "500", "TotalAmt": 100.0, "PrivateNote": "1001",
                            "DepositToAccountRef": { "value": "35" },
                            "Line": [{ "DepositLineDetail": {
                                "AccountRef": { "value": "80", "name": "Rent" },
                                "Entity": { "value": "7", "name": "Acme" }
                            } }]
                        }
                    },
                    {
                        "bId": "1",
                        "Fault": { "type": "ValidationFault", "Error": [{ "Message": "Duplicate Document Number" }] }
                    }
                ]
            }));
        });

        let mut sink = QboSink::from_credentials("Checking", creds("tok"), &server.base_url());
        let stored = sink
            .add_batch(&[
                record("1001", "Acme", "Rent", 100.0),
                record("1002", "Acme", "Rent", 20.0),
            ])
            .unwrap();
        batch.assert_hits(1);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].reference, "1001");
        assert_eq!(stored[0].amount, 100.0);
    }

    #[test]
    fn test_add_batch_skips_unknown_category() {
        let server = MockServer::start();
        mock_checking(&server);
        mock_account(&server, "Name = 'Nope'", "Account", json!([]));
        let batch = server.mock(|when, then| {
            when.method(POST).path("/v3/company/realm_123/batch");
            then.status(200).json_body(json!({ "BatchItemResponse": [] }));
        });

        let mut sink = QboSink::from_credentials("Checking", creds("tok"), &server.base_url());
        let stored = sink.add_batch(&[record("1", "", "Nope", 1.0)]).unwrap();
        assert!(stored.is_empty());
        batch.assert_hits(1);
    }

    #[test]
    fn test_add_batch_transport_failure_is_error() {
        let server = MockServer::start();
        mock_checking(&server);
        mock_account(&server, "Name = 'Rent'", "Account", json!([{ "Id": "80" }]));
        let batch = server.mock(|when, then| {
            when.method(POST).path("/v3/company/realm_123/batch");
            then.status(503);
        });

        let mut sink = QboSink::from_credentials("Checking", creds("tok"), &server.base_url());
        let err = sink.add_batch(&[record("1", "", "Rent", 1.0)]).unwrap_err();
        assert!(matches!(err, SinkError::Upstream(_)));
        batch.assert_hits(1);
    }

    #[test]
    fn test_add_batch_chunks_large_input() {
        let server = MockServer::start();
        mock_checking(&server);
        mock_account(&server, "Name = 'Rent'", "Account", json!([{ "Id": "80" }]));
        let batch = server.mock(|when, then| {
            when.method(POST).path("/v3/company/realm_123/batch");
            then.status(200).json_body(json!({ "BatchItemResponse": [] }));
        });

        let records: Vec<Record> = (0..45)
            .map(|i| record(&format!("r{i}"), "", "Rent", 1.0))
            .collect();
        let mut sink = QboSink::from_credentials("Checking", creds("tok"), &server.base_url());
        sink.add_batch(&records).unwrap();
        batch.assert_hits(2);
    }
}

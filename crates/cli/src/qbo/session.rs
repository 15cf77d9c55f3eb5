// One scoped conversation with the QBO API

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Value};

use tallysync_recon::SinkError;

use super::client::ApiClient;
use super::credentials::Auth;
use super::entity::qbo_escape;

const QBO_QUERY_LIMIT: u32 = 1000;

/// Named entities a deposit refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum Lookup {
    BankAccount,
    IncomeAccount,
    Customer,
}

impl Lookup {
    fn entity(self) -> &'static str {
        match self {
            Self::BankAccount | Self::IncomeAccount => "Account",
            Self::Customer => "Customer",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::BankAccount => "bank account",
            Self::IncomeAccount => "account",
            Self::Customer => "customer",
        }
    }

    fn query(self, name: &str) -> String {
        let escaped = qbo_escape(name);
        match self {
            Self::BankAccount => format!(
                "SELECT Id, Name, FullyQualifiedName, AccountType FROM Account WHERE Name = '{escaped}' AND AccountType = 'Bank'"
            ),
            // sub-accounts are addressed as "Parent:Child"
            Self::IncomeAccount if name.contains(':') => format!(
                "SELECT Id, Name, FullyQualifiedName, AccountType FROM Account WHERE FullyQualifiedName = '{escaped}'"
            ),
            Self::IncomeAccount => format!(
                "SELECT Id, Name, FullyQualifiedName, AccountType FROM Account WHERE Name = '{escaped}'"
            ),
            Self::Customer => format!(
                "SELECT Id, DisplayName FROM Customer WHERE DisplayName = '{escaped}'"
            ),
        }
    }
}

/// Where the API and the token endpoint live.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Endpoints {
    pub base_url: String,
    pub token_url: String,
}

/// Opened at the start of each sink call and closed when dropped, on
/// success or error alike. Name lookups are cached for its lifetime only.
pub(super) struct Session<'a> {
    api: &'a ApiClient,
    auth: &'a mut Auth,
    endpoints: &'a Endpoints,
    refreshed: bool,
    requests: usize,
    ids: HashMap<(Lookup, String), Result<String, SinkError>>,
}

impl<'a> Session<'a> {
    /// Refreshes the access token up front when it is known to be expired.
    pub(super) fn open(
        api: &'a ApiClient,
        auth: &'a mut Auth,
        endpoints: &'a Endpoints,
    ) -> Result<Self, SinkError> {
        let mut refreshed = false;
        if auth.creds.access_token_expired(Utc::now()) {
            auth.refresh(&api.http, &endpoints.token_url)?;
            refreshed = true;
        }
        log::debug!("QBO session opened for realm {}", auth.creds.realm_id);
        Ok(Self {
            api,
            auth,
            endpoints,
            refreshed,
            requests: 0,
            ids: HashMap::new(),
        })
    }

    fn company_url(&self, endpoint: &str) -> String {
        format!(
            "{}/v3/company/{}/{}",
            self.endpoints.base_url, self.auth.creds.realm_id, endpoint
        )
    }

    /// Run `send` with the current token; on an auth failure refresh once
    /// and try again.
    fn with_token(
        &mut self,
        send: impl Fn(&ApiClient, &str) -> Result<Value, SinkError>,
    ) -> Result<Value, SinkError> {
        self.requests += 1;
        match send(self.api, &self.auth.creds.access_token) {
            Err(SinkError::Auth(msg)) if !self.refreshed => {
                log::debug!("QBO rejected token ({msg}), refreshing");
                self.auth.refresh(&self.api.http, &self.endpoints.token_url)?;
                self.refreshed = true;
                self.requests += 1;
                send(self.api, &self.auth.creds.access_token)
            }
            other => other,
        }
    }

    fn query(&mut self, query: &str) -> Result<Value, SinkError> {
        let url = self.company_url("query");
        self.with_token(|api, token| {
            api.request_with_retry(|http| {
                http.get(&url)
                    .bearer_auth(token)
                    .header("Accept", "application/json")
                    .query(&[("query", query)])
            })
        })
    }

    /// Page through `SELECT * FROM {entity_type}` until a short page.
    pub(super) fn query_entities(&mut self, entity_type: &str) -> Result<Vec<Value>, SinkError> {
        let mut all = Vec::new();
        let mut start_pos = 1u32;

        loop {
            let query = format!(
                "SELECT * FROM {entity_type} ORDERBY Id ASC STARTPOSITION {start_pos} MAXRESULTS {QBO_QUERY_LIMIT}"
            );
            let body = self.query(&query)?;

            let entities = body["QueryResponse"][entity_type]
                .as_array()
                .cloned()
                .unwrap_or_default();
            let count = entities.len() as u32;
            log::debug!("{entity_type} startPosition {start_pos}: {count} results");

            all.extend(entities);
            if count < QBO_QUERY_LIMIT {
                break;
            }
            start_pos += count;
        }

        Ok(all)
    }

    /// Name → QBO id. Both hits and misses are cached for the session.
    pub(super) fn resolve(&mut self, lookup: Lookup, name: &str) -> Result<String, SinkError> {
        let key = (lookup, name.to_string());
        if let Some(cached) = self.ids.get(&key) {
            return cached.clone();
        }
        let resolved = self.resolve_uncached(lookup, name);
        if let Err(SinkError::UnknownAccount(_)) | Ok(_) = &resolved {
            self.ids.insert(key, resolved.clone());
        }
        resolved
    }

    fn resolve_uncached(&mut self, lookup: Lookup, name: &str) -> Result<String, SinkError> {
        let body = self.query(&lookup.query(name))?;
        let found = body["QueryResponse"][lookup.entity()]
            .as_array()
            .cloned()
            .unwrap_or_default();

        match found.as_slice() {
            [] => Err(SinkError::UnknownAccount(format!(
                "no {} named '{}' found in QBO",
                lookup.label(),
                name
            ))),
            [one] => match one["Id"].as_str().filter(|id| !id.trim().is_empty()) {
                Some(id) => {
                    log::debug!("resolved {} '{}' → ID {}", lookup.label(), name, id);
                    Ok(id.to_string())
                }
                None => Err(SinkError::Protocol(format!(
                    "QBO returned {} '{}' without an Id",
                    lookup.label(),
                    name
                ))),
            },
            many => {
                let ids: Vec<String> = many
                    .iter()
                    .map(|a| {
                        let fqn = a["FullyQualifiedName"]
                            .as_str()
                            .or_else(|| a["Name"].as_str())
                            .or_else(|| a["DisplayName"].as_str())
                            .unwrap_or("?");
                        format!("{} (ID {})", fqn, a["Id"].as_str().unwrap_or("?"))
                    })
                    .collect();
                Err(SinkError::UnknownAccount(format!(
                    "multiple {}s named '{}': {}",
                    lookup.label(),
                    name,
                    ids.join(", ")
                )))
            }
        }
    }

    /// POST one batch request. Sent once: a resend after a timeout could
    /// duplicate deposits.
    pub(super) fn post_batch(&mut self, items: &[Value]) -> Result<Value, SinkError> {
        let url = self.company_url("batch");
        let body = json!({ "BatchItemRequest": items });
        self.with_token(|api, token| {
            api.send_once(
                api.http
                    .post(&url)
                    .bearer_auth(token)
                    .header("Accept", "application/json")
                    .json(&body),
            )
        })
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        log::debug!("QBO session closed after {} request(s)", self.requests);
    }
}

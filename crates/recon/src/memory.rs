//! In-memory destination.
//!
//! Behaves like a real accounting system for pipeline tests and offline runs:
//! it can reshape what it stores (cent rounding, memo truncation), fault single
//! items, store items without confirming them, and fail whole calls.

use std::collections::HashSet;

use crate::apply::AccountSink;
use crate::error::SinkError;
use crate::model::{Origin, Record};

#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    account: String,
    stored: Vec<Record>,
    round_cents: bool,
    memo_limit: Option<usize>,
    rejected: HashSet<String>,
    unconfirmed: HashSet<String>,
    batch_failure: Option<SinkError>,
    fetch_failure: Option<(usize, SinkError)>,
    add_calls: usize,
    fetch_calls: usize,
}

impl MemorySink {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            ..Self::default()
        }
    }

    /// Pre-existing destination state.
    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.stored = records.into_iter().map(|r| r.retagged(Origin::Right)).collect();
        self
    }

    /// Store amounts rounded to two decimals.
    pub fn rounding_to_cents(mut self) -> Self {
        self.round_cents = true;
        self
    }

    /// Store at most `limit` characters of each memo.
    pub fn truncating_memos(mut self, limit: usize) -> Self {
        self.memo_limit = Some(limit);
        self
    }

    /// Fault the item with this reference; the rest of the batch proceeds.
    pub fn rejecting(mut self, reference: impl Into<String>) -> Self {
        self.rejected.insert(reference.into());
        self
    }

    /// Store the item but leave it out of the confirmation.
    pub fn unconfirmed(mut self, reference: impl Into<String>) -> Self {
        self.unconfirmed.insert(reference.into());
        self
    }

    /// Fail every `add_batch` call without storing anything.
    pub fn failing_with(mut self, error: SinkError) -> Self {
        self.batch_failure = Some(error);
        self
    }

    /// Let `ok_calls` fetches succeed, then fail every later one.
    pub fn failing_fetch_after(mut self, ok_calls: usize, error: SinkError) -> Self {
        self.fetch_failure = Some((ok_calls, error));
        self
    }

    pub fn stored(&self) -> &[Record] {
        &self.stored
    }

    pub fn add_calls(&self) -> usize {
        self.add_calls
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls
    }

    fn as_stored(&self, record: &Record) -> Record {
        let mut out = record.retagged(Origin::Right);
        if self.round_cents {
            out.amount = (out.amount * 100.0).round() / 100.0;
        }
        if let (Some(limit), Some(memo)) = (self.memo_limit, out.memo.as_mut()) {
            if memo.chars().count() > limit {
                *memo = memo.chars().take(limit).collect();
            }
        }
        out
    }
}

impl AccountSink for MemorySink {
    fn account(&self) -> &str {
        &self.account
    }

    fn add_batch(&mut self, records: &[Record]) -> Result<Vec<Record>, SinkError> {
        self.add_calls += 1;
        if let Some(e) = &self.batch_failure {
            return Err(e.clone());
        }

        let mut confirmed = Vec::with_capacity(records.len());
        for record in records {
            if self.rejected.contains(&record.reference) {
                log::debug!("memory sink: rejecting '{}'", record.reference);
                continue;
            }
            let stored = self.as_stored(record);
            self.stored.push(stored.clone());
            if !self.unconfirmed.contains(&record.reference) {
                confirmed.push(stored);
            }
        }
        Ok(confirmed)
    }

    fn fetch_all(&mut self) -> Result<Vec<Record>, SinkError> {
        self.fetch_calls += 1;
        if let Some((ok_calls, e)) = &self.fetch_failure {
            if self.fetch_calls > *ok_calls {
                return Err(e.clone());
            }
        }
        Ok(self.stored.clone())
    }
}

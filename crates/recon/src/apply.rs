use crate::error::{SinkError, ValidationError};
use crate::model::{Origin, Record};

/// Destination the left-only delta is pushed into.
///
/// Implementations own their connection lifecycle: whatever session a call
/// opens must be closed before the call returns.
pub trait AccountSink {
    /// Destination identity used to scope reads and writes.
    fn account(&self) -> &str;

    /// Add every record in one continue-on-error batch.
    ///
    /// Returns the records the destination confirmed as stored, in the form
    /// it stored them. A per-item failure drops that item from the result;
    /// `Err` means the batch as a whole was not applied.
    fn add_batch(&mut self, records: &[Record]) -> Result<Vec<Record>, SinkError>;

    /// Current state of the destination. Idempotent.
    fn fetch_all(&mut self) -> Result<Vec<Record>, SinkError>;
}

/// What happened to one apply call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub requested: usize,
    /// Confirmed additions, tagged `Origin::Right`.
    pub confirmed: Vec<Record>,
    /// Set when the whole batch failed; `confirmed` is then empty.
    pub failure: Option<SinkError>,
}

impl ApplyOutcome {
    fn untouched() -> Self {
        Self {
            requested: 0,
            confirmed: Vec::new(),
            failure: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Requested but not confirmed.
    pub fn dropped(&self) -> usize {
        self.requested.saturating_sub(self.confirmed.len())
    }
}

/// Push left-only records into `sink`.
///
/// Every amount is validated before the batch is built; a single non-finite
/// amount rejects the whole batch and the sink is never called. An empty
/// input performs no sink interaction.
pub fn apply_left_only(
    records: &[Record],
    sink: &mut dyn AccountSink,
) -> Result<ApplyOutcome, ValidationError> {
    if records.is_empty() {
        return Ok(ApplyOutcome::untouched());
    }

    for record in records {
        if !record.amount.is_finite() {
            return Err(ValidationError::NonFiniteAmount {
                reference: record.reference.clone(),
                amount: record
                    .amount_text
                    .clone()
                    .unwrap_or_else(|| record.amount.to_string()),
            });
        }
    }

    log::info!("adding {} record(s) to {}", records.len(), sink.account());

    match sink.add_batch(records) {
        Ok(stored) => {
            let confirmed: Vec<Record> = stored
                .into_iter()
                .map(|r| r.retagged(Origin::Right))
                .collect();
            if confirmed.len() < records.len() {
                log::warn!(
                    "destination confirmed {} of {} record(s)",
                    confirmed.len(),
                    records.len()
                );
            }
            Ok(ApplyOutcome {
                requested: records.len(),
                confirmed,
                failure: None,
            })
        }
        Err(e) => {
            log::warn!("batch add to {} failed: {}", sink.account(), e);
            Ok(ApplyOutcome {
                requested: records.len(),
                confirmed: Vec::new(),
                failure: Some(e),
            })
        }
    }
}

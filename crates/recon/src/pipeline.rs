//! One reconciliation run from extraction to payload.

use std::collections::HashSet;

use crate::apply::{apply_left_only, AccountSink};
use crate::error::{SourceError, SyncError};
use crate::model::{ComparisonReport, MatchKey, Record};
use crate::reconcile::{reconcile_with, ReconOptions};
use crate::report::{build_report, ReportPayload};

/// Producer of left-side records.
pub trait RecordSource {
    fn extract(&self) -> Result<Vec<Record>, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncOptions {
    pub match_key: MatchKey,
    pub recon: ReconOptions,
    /// `false` compares and reports without writing to the destination.
    pub apply: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            match_key: MatchKey::default(),
            recon: ReconOptions::default(),
            apply: true,
        }
    }
}

/// Run with the configured match key. Always returns a payload.
pub fn run_sync(
    source: &dyn RecordSource,
    sink: &mut dyn AccountSink,
    options: &SyncOptions,
) -> ReportPayload {
    let key = options.match_key;
    run_sync_keyed(source, sink, options, |r: &Record| key.key_of(r))
}

/// Run with an arbitrary identity key; `options.match_key` is ignored.
pub fn run_sync_keyed<K>(
    source: &dyn RecordSource,
    sink: &mut dyn AccountSink,
    options: &SyncOptions,
    key: K,
) -> ReportPayload
where
    K: Fn(&Record) -> String,
{
    match try_sync(source, sink, options, &key) {
        Ok(payload) => payload,
        Err(e) => {
            log::error!("sync aborted: {e}");
            ReportPayload::failed(e.to_string())
                .with_account(sink.account())
                .with_dry_run(!options.apply)
        }
    }
}

fn try_sync(
    source: &dyn RecordSource,
    sink: &mut dyn AccountSink,
    options: &SyncOptions,
    key: &dyn Fn(&Record) -> String,
) -> Result<ReportPayload, SyncError> {
    let account = sink.account().to_string();
    let mut warnings = Vec::new();

    let left = source.extract()?;
    let right = sink.fetch_all()?;
    log::info!(
        "comparing {} spreadsheet record(s) against {} in {}",
        left.len(),
        right.len(),
        account
    );

    let pre = reconcile_with(&left, &right, key, &options.recon);
    log::debug!(
        "pre-sync: {} matched, {} left-only, {} right-only, {} conflicts",
        pre.match_count,
        pre.left_only.len(),
        pre.right_only.len(),
        pre.conflicts.len()
    );

    if !options.apply || pre.left_only.is_empty() {
        return Ok(build_report(&pre, &[])
            .with_account(account)
            .with_dry_run(!options.apply));
    }

    let outcome = apply_left_only(&pre.left_only_records(), sink)?;

    let post = if let Some(e) = &outcome.failure {
        warnings.push(format!("batch not applied, report reflects pre-sync state: {e}"));
        pre
    } else {
        if outcome.dropped() > 0 {
            warnings.push(format!(
                "destination confirmed {} of {} record(s)",
                outcome.confirmed.len(),
                outcome.requested
            ));
        }
        match sink.fetch_all() {
            Ok(refreshed) => reconcile_with(&left, &refreshed, key, &options.recon),
            Err(e) => {
                warnings.push(format!("post-sync verification skipped: {e}"));
                without_confirmed(pre, &outcome.confirmed, key)
            }
        }
    };

    Ok(build_report(&post, &outcome.confirmed)
        .with_account(account)
        .with_warnings(warnings))
}

/// Pre-sync comparison with the confirmed keys taken out of `left_only`.
fn without_confirmed(
    mut report: ComparisonReport,
    confirmed: &[Record],
    key: &dyn Fn(&Record) -> String,
) -> ComparisonReport {
    let done: HashSet<String> = confirmed.iter().map(key).collect();
    report.left_only.retain(|u| !done.contains(&u.key));
    report
}

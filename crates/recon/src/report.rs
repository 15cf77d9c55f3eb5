use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{ComparisonReport, Conflict, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub matched: usize,
    pub added: usize,
    /// Data and name mismatches only.
    pub conflicts: usize,
    pub missing_on_left: usize,
    pub missing_on_right: usize,
}

/// Final structured output of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPayload {
    pub status: ReportStatus,
    pub generated_at: DateTime<Utc>,
    pub account: Option<String>,
    pub dry_run: bool,
    pub added: Vec<Record>,
    /// Keyed mismatches followed by right-only keys labelled `missing_on_left`.
    pub conflicts: Vec<Conflict>,
    /// Left-only keys still absent after the sync, labelled `missing_on_right`.
    pub unsynced: Vec<Conflict>,
    pub match_count: usize,
    pub summary: ReportSummary,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl ReportPayload {
    /// Well-formed payload for a run that could not complete.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::failed_at(message, Utc::now())
    }

    pub fn failed_at(message: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            status: ReportStatus::Error,
            generated_at,
            account: None,
            dry_run: false,
            added: Vec::new(),
            conflicts: Vec::new(),
            unsynced: Vec::new(),
            match_count: 0,
            summary: ReportSummary::default(),
            warnings: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }

    /// One line for the terminal.
    pub fn summary_line(&self) -> String {
        match (&self.status, &self.error) {
            (ReportStatus::Error, Some(e)) => format!("sync failed: {e}"),
            _ => {
                let s = &self.summary;
                let mut line = format!(
                    "{} matched, {} added, {} conflicts, {} missing on left, {} missing on right",
                    s.matched, s.added, s.conflicts, s.missing_on_left, s.missing_on_right
                );
                if self.dry_run {
                    line.push_str(" (dry run)");
                }
                if !self.warnings.is_empty() {
                    line.push_str(&format!(", {} warning(s)", self.warnings.len()));
                }
                line
            }
        }
    }
}

pub fn build_report(comparison: &ComparisonReport, confirmed: &[Record]) -> ReportPayload {
    build_report_at(comparison, confirmed, Utc::now())
}

/// Assemble the payload from the post-sync comparison and the confirmed
/// additions. Never fails.
pub fn build_report_at(
    comparison: &ComparisonReport,
    confirmed: &[Record],
    generated_at: DateTime<Utc>,
) -> ReportPayload {
    let mismatches = comparison.conflicts.len();

    let mut conflicts = comparison.conflicts.clone();
    conflicts.extend(
        comparison
            .right_only
            .iter()
            .map(|u| Conflict::missing_on_left(u.key.clone(), &u.record)),
    );

    let unsynced: Vec<Conflict> = comparison
        .left_only
        .iter()
        .map(|u| Conflict::missing_on_right(u.key.clone(), &u.record))
        .collect();

    let summary = ReportSummary {
        matched: comparison.match_count,
        added: confirmed.len(),
        conflicts: mismatches,
        missing_on_left: comparison.right_only.len(),
        missing_on_right: unsynced.len(),
    };

    ReportPayload {
        status: ReportStatus::Success,
        generated_at,
        account: None,
        dry_run: false,
        added: confirmed.to_vec(),
        conflicts,
        unsynced,
        match_count: comparison.match_count,
        summary,
        warnings: Vec::new(),
        error: None,
    }
}

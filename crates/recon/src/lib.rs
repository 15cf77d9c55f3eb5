//! `tallysync-recon`: two-source reconciliation and sync engine.
//!
//! Compares spreadsheet records against an accounting system, pushes the
//! spreadsheet-only records through an [`AccountSink`], verifies the result by
//! reconciling again and renders a [`ReportPayload`].
//!
//! No spreadsheet parsing and no network IO live here.

pub mod apply;
pub mod config;
pub mod error;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod settings;

pub use apply::{apply_left_only, AccountSink, ApplyOutcome};
pub use config::SyncConfig;
pub use error::{ConfigError, SinkError, SourceError, SyncError, ValidationError};
pub use memory::MemorySink;
pub use model::{
    Category, ComparisonReport, Conflict, ConflictReason, MatchKey, Origin, Record,
    RecordSummary, Unmatched,
};
pub use pipeline::{run_sync, run_sync_keyed, RecordSource, SyncOptions};
pub use reconcile::{reconcile, reconcile_with, ReconOptions, AMOUNT_TOLERANCE};
pub use report::{build_report, ReportPayload, ReportStatus, ReportSummary};
pub use settings::Settings;

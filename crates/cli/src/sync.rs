// `run` and `validate` commands

use std::path::{Path, PathBuf};

use tallysync_io::{write_report, WorkbookSource};
use tallysync_recon::{
    run_sync, ReportPayload, Settings, SinkError, SyncConfig, SyncError,
};

use crate::exit_codes::{EXIT_CONFIG, EXIT_REPORT_WRITE};
use crate::qbo::QboSink;
use crate::{CliError, RunArgs};

/// Sync, then persist the report. Sync failures land in the report; only a
/// report that cannot be written is an error here.
pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let (config, config_error) = match &args.config {
        Some(path) => match SyncConfig::load(path) {
            Ok(config) => {
                log::info!("using config {}", path.display());
                (config, None)
            }
            Err(e) => (SyncConfig::default(), Some(e)),
        },
        None => (SyncConfig::default(), None),
    };

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.json));

    let payload = match config_error {
        Some(e) => {
            log::error!("{e}");
            ReportPayload::failed(SyncError::from(e).to_string()).with_dry_run(args.dry_run)
        }
        None => sync(&args, config),
    };

    let written = write_report(&payload, &output).map_err(|e| {
        CliError::new(EXIT_REPORT_WRITE, e.to_string())
            .with_hint("check that the output location is a writable directory path")
    })?;

    println!("report written to {}", written.display());
    println!("{}", payload.summary_line());
    Ok(())
}

fn sync(args: &RunArgs, mut config: SyncConfig) -> ReportPayload {
    if let Some(sheet) = &args.sheet {
        config.source.sheet = Some(sheet.clone());
    }
    if let Some(key) = args.key {
        config.matching.key = key;
    }

    let settings = match Settings::resolve(&args.destination) {
        Ok(settings) => settings,
        Err(e) => return fail(SyncError::from(e), None, args.dry_run),
    };
    let account = settings.account.as_str();

    let Some(credentials) = args.credentials.as_ref().or(settings.credentials.as_ref()) else {
        let e = SinkError::NotAuthenticated(
            "no QuickBooks credentials file (pass --credentials or set credentials in the settings file)"
                .into(),
        );
        return fail(SyncError::from(e), Some(account), args.dry_run);
    };

    let mut sink = match QboSink::connect(account, credentials, args.sandbox || settings.sandbox) {
        Ok(sink) => sink,
        Err(e) => return fail(SyncError::from(e), Some(account), args.dry_run),
    };
    if let Some(base) = &args.api_base {
        log::debug!("QBO API base overridden: {base}");
        sink = sink.with_base_url(base.as_str());
    }

    let source = WorkbookSource::from_config(&args.workbook, &config.source);
    run_sync(&source, &mut sink, &config.sync_options(!args.dry_run))
}

fn fail(e: SyncError, account: Option<&str>, dry_run: bool) -> ReportPayload {
    log::error!("{e}");
    let payload = ReportPayload::failed(e.to_string()).with_dry_run(dry_run);
    match account {
        Some(account) => payload.with_account(account),
        None => payload,
    }
}

pub fn cmd_validate(path: &Path) -> Result<(), CliError> {
    let config = SyncConfig::load(path).map_err(|e| {
        CliError::new(EXIT_CONFIG, format!("{}: {}", path.display(), e))
    })?;

    let columns = &config.source.columns;
    println!("{}: ok", path.display());
    if let Some(name) = &config.name {
        println!("  name:      {name}");
    }
    println!(
        "  sheet:     {}",
        config.source.sheet.as_deref().unwrap_or("(first sheet)")
    );
    println!(
        "  columns:   {} | {} | {} | {}{}",
        columns.reference,
        columns.customer,
        columns.category,
        columns.amount,
        columns
            .memo_column()
            .map(|m| format!(" | {m}"))
            .unwrap_or_default()
    );
    println!(
        "  matching:  key={} tolerance={}",
        config.matching.key, config.matching.tolerance
    );
    println!("  report:    {}", config.output.json);
    Ok(())
}

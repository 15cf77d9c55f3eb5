// tallysync - reconcile a spreadsheet against QuickBooks and add what's missing

mod exit_codes;
mod qbo;
mod sync;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tallysync_recon::MatchKey;

use exit_codes::EXIT_SUCCESS;

#[derive(Parser)]
#[command(name = "tallysync")]
#[command(about = "Reconcile spreadsheet records against an accounting system and sync the difference")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). TALLYSYNC_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the workbook with the destination account, add the records
    /// it is missing and write a JSON report
    #[command(after_help = "\
Examples:
  tallysync run company_data.xlsx Checking --credentials ~/.config/qbo.json
  tallysync run company_data.xlsx settings.json --config sync.toml -o out/report.json
  tallysync run export.csv Checking --key customer_category --dry-run

A failed sync still writes a report (status \"error\") and exits 0.")]
    Run(RunArgs),

    /// Check a sync config file without running anything
    Validate {
        /// Path to the TOML config
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Spreadsheet holding the records (.xlsx, .xls, .ods, .csv, .tsv)
    pub workbook: PathBuf,

    /// Destination account name, or a settings JSON file naming it
    pub destination: String,

    /// Report path [default: output.json from the config, else misc_income_report.json]
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Sync config (TOML): sheet, column headers, matching rules
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Worksheet to read (overrides the config)
    #[arg(long)]
    pub sheet: Option<String>,

    /// How records are paired: reference, category or customer_category
    #[arg(long)]
    pub key: Option<MatchKey>,

    /// QuickBooks OAuth credentials JSON (overrides the settings file)
    #[arg(long, env = "TALLYSYNC_QBO_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// Use the QuickBooks sandbox company
    #[arg(long)]
    pub sandbox: bool,

    /// Reconcile and report without adding anything
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, env = "TALLYSYNC_QBO_API_BASE", hide = true)]
    pub api_base: Option<String>,
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
            "\nreport:  v1",
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
            "\nreport:  v1",
        )
    }
}

/// Logs go to stderr; stdout carries only the run summary.
fn init_logging(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter =
        EnvFilter::try_from_env("TALLYSYNC_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    // also installs the log → tracing bridge for the library crates
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Run(args) => sync::cmd_run(args),
        Commands::Validate { config } => sync::cmd_validate(&config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

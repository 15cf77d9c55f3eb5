use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::MatchKey;
use crate::pipeline::SyncOptions;
use crate::reconcile::{ReconOptions, AMOUNT_TOLERANCE};

pub const DEFAULT_REPORT_FILE: &str = "misc_income_report.json";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Sync job description, usually read from a `sync.toml`.
/// Every table is optional; an empty document is a valid config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Worksheet name; first sheet when absent.
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub columns: ColumnMapping,
}

/// Header names of the spreadsheet columns that feed each record field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnMapping {
    #[serde(default = "default_reference")]
    pub reference: String,
    #[serde(default = "default_customer")]
    pub customer: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_amount")]
    pub amount: String,
    /// Optional column; missing from the sheet means no memos. `memo = ""`
    /// turns memo extraction off.
    #[serde(default = "default_memo")]
    pub memo: Option<String>,
}

fn default_reference() -> String {
    "Child ID".into()
}

fn default_customer() -> String {
    "Customer".into()
}

fn default_category() -> String {
    "Chart of Account".into()
}

fn default_amount() -> String {
    "Amount".into()
}

fn default_memo() -> Option<String> {
    Some("Memo".into())
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            reference: default_reference(),
            customer: default_customer(),
            category: default_category(),
            amount: default_amount(),
            memo: default_memo(),
        }
    }
}

impl ColumnMapping {
    /// Required columns as (field, header) pairs.
    pub fn required(&self) -> [(&'static str, &str); 4] {
        [
            ("reference", self.reference.as_str()),
            ("customer", self.customer.as_str()),
            ("category", self.category.as_str()),
            ("amount", self.amount.as_str()),
        ]
    }

    /// Memo header, or `None` when unset or blank.
    pub fn memo_column(&self) -> Option<&str> {
        self.memo.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Matching + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    #[serde(default)]
    pub key: MatchKey,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default)]
    pub compare_customer: bool,
    #[serde(default)]
    pub compare_memo: bool,
}

fn default_tolerance() -> f64 {
    AMOUNT_TOLERANCE
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            key: MatchKey::default(),
            tolerance: AMOUNT_TOLERANCE,
            compare_customer: false,
            compare_memo: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_json")]
    pub json: String,
}

fn default_json() -> String {
    DEFAULT_REPORT_FILE.into()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { json: default_json() }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl SyncConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tolerance = self.matching.tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::Validation(format!(
                "matching.tolerance must be a finite number >= 0, got {tolerance}"
            )));
        }

        let columns = &self.source.columns;
        let mut seen: Vec<&str> = Vec::new();
        for (field, header) in columns.required() {
            let header = header.trim();
            if header.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "source.columns.{field} must not be empty"
                )));
            }
            check_unmapped(&seen, field, header)?;
            seen.push(header);
        }
        if let Some(memo) = columns.memo_column() {
            check_unmapped(&seen, "memo", memo)?;
        }

        if let Some(sheet) = &self.source.sheet {
            if sheet.trim().is_empty() {
                return Err(ConfigError::Validation("source.sheet must not be empty".into()));
            }
        }

        if self.output.json.trim().is_empty() {
            return Err(ConfigError::Validation("output.json must not be empty".into()));
        }

        Ok(())
    }

    pub fn recon_options(&self) -> ReconOptions {
        ReconOptions {
            tolerance: self.matching.tolerance,
            compare_customer: self.matching.compare_customer,
            compare_memo: self.matching.compare_memo,
        }
    }

    pub fn sync_options(&self, apply: bool) -> SyncOptions {
        SyncOptions {
            match_key: self.matching.key,
            recon: self.recon_options(),
            apply,
        }
    }
}

/// Headers match case-insensitively, so a mapping may not reuse one.
fn check_unmapped(seen: &[&str], field: &str, header: &str) -> Result<(), ConfigError> {
    if seen.iter().any(|s| s.eq_ignore_ascii_case(header)) {
        return Err(ConfigError::Validation(format!(
            "source.columns.{field}: header '{header}' is mapped twice"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

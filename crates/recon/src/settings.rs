//! Destination identity, from a settings JSON document or a literal string.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Bank/deposit account name in the destination.
    pub account: String,
    /// Credentials file, resolved against the settings file's directory.
    pub credentials: Option<PathBuf>,
    pub sandbox: bool,
}

/// On-disk shape; both key spellings are accepted.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(default)]
    bank_account: Option<String>,
    #[serde(default, rename = "bankAccount")]
    bank_account_camel: Option<String>,
    #[serde(default)]
    credentials: Option<String>,
    #[serde(default, rename = "credentialsPath")]
    credentials_camel: Option<String>,
    #[serde(default)]
    sandbox: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Settings {
    pub fn literal(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            credentials: None,
            sandbox: false,
        }
    }

    pub fn from_json(input: &str, base_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let raw: RawSettings =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;

        // snake_case wins when both spellings are set
        let account = non_blank(raw.bank_account)
            .or_else(|| non_blank(raw.bank_account_camel))
            .ok_or_else(|| {
                ConfigError::Validation("settings have no bank_account / bankAccount".into())
            })?;

        let credentials = non_blank(raw.credentials)
            .or_else(|| non_blank(raw.credentials_camel))
            .map(|p| {
                let p = PathBuf::from(p);
                match base_dir {
                    Some(dir) if p.is_relative() => dir.join(p),
                    _ => p,
                }
            });

        Ok(Self {
            account,
            credentials,
            sandbox: raw.sandbox,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&text, path.parent())
    }

    /// Interpret a destination argument: an existing file or a `.json` path
    /// is loaded as settings, anything else is the account name itself.
    pub fn resolve(arg: &str) -> Result<Self, ConfigError> {
        let path = Path::new(arg);
        let looks_like_file = path.is_file()
            || path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if looks_like_file {
            log::debug!("loading settings from {}", path.display());
            return Self::load(path);
        }

        let account = arg.trim();
        if account.is_empty() {
            return Err(ConfigError::Validation("destination account is empty".into()));
        }
        Ok(Self::literal(account))
    }
}

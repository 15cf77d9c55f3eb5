use std::fmt;

/// The source adapter could not produce records.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Source file does not exist.
    NotFound(String),
    /// File exists but could not be opened or decoded.
    Unreadable { path: String, message: String },
    /// Requested worksheet is not in the workbook.
    MissingSheet { path: String, sheet: String },
    /// Header row lacks a mapped column.
    MissingColumn { column: String },
    /// A cell could not be turned into a record field.
    BadCell { row: usize, column: String, value: String },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "source not found: {path}"),
            Self::Unreadable { path, message } => {
                write!(f, "cannot read source {path}: {message}")
            }
            Self::MissingSheet { path, sheet } => {
                write!(f, "sheet '{sheet}' not found in {path}")
            }
            Self::MissingColumn { column } => write!(f, "missing column '{column}'"),
            Self::BadCell { row, column, value } => {
                write!(f, "row {row}, column '{column}': cannot parse '{value}'")
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// Communication with the destination failed.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkError {
    /// No usable credentials for the destination.
    NotAuthenticated(String),
    /// Destination rejected the credentials (401/403).
    Auth(String),
    /// Destination rejected the request as a whole (4xx).
    Rejected(String),
    /// Rate limited after retries.
    RateLimited(String),
    /// Network failure or 5xx after retries.
    Upstream(String),
    /// Response could not be understood.
    Protocol(String),
    /// Destination account identity could not be resolved.
    UnknownAccount(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated(msg) => write!(f, "not authenticated: {msg}"),
            Self::Auth(msg) => write!(f, "auth failed: {msg}"),
            Self::Rejected(msg) => write!(f, "request rejected: {msg}"),
            Self::RateLimited(msg) => write!(f, "rate limited: {msg}"),
            Self::Upstream(msg) => write!(f, "upstream error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::UnknownAccount(msg) => write!(f, "unknown account: {msg}"),
        }
    }
}

impl std::error::Error for SinkError {}

/// A record or field failed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Category label was empty after trimming.
    EmptyCategory,
    /// Amount is NaN or infinite; no batch is built.
    NonFiniteAmount { reference: String, amount: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCategory => write!(f, "category must not be empty"),
            Self::NonFiniteAmount { reference, amount } => write!(
                f,
                "record '{reference}': amount '{amount}' is not a finite number"
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Sync config or settings could not be loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// TOML / JSON parse or deserialization error.
    Parse(String),
    /// Parsed but semantically invalid.
    Validation(String),
    /// File read error.
    Io(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "config parse error: {msg}"),
            Self::Validation(msg) => write!(f, "config validation error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Anything that aborts a sync run. Rendered into the report's `error` field.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    Source(SourceError),
    Sink(SinkError),
    Validation(ValidationError),
    Config(ConfigError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => write!(f, "{e}"),
            Self::Sink(e) => write!(f, "destination {e}"),
            Self::Validation(e) => write!(f, "{e}"),
            Self::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(e) => Some(e),
            Self::Sink(e) => Some(e),
            Self::Validation(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<SourceError> for SyncError {
    fn from(e: SourceError) -> Self {
        Self::Source(e)
    }
}

impl From<SinkError> for SyncError {
    fn from(e: SinkError) -> Self {
        Self::Sink(e)
    }
}

impl From<ValidationError> for SyncError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<ConfigError> for SyncError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// JSON report persistence

use std::fmt;
use std::path::{Path, PathBuf};

use tallysync_recon::ReportPayload;

/// The report could not be persisted. Fatal for the run.
#[derive(Debug)]
pub struct ReportWriteError {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for ReportWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot write report {}: {}", self.path.display(), self.message)
    }
}

impl std::error::Error for ReportWriteError {}

/// Write `payload` as 2-space indented UTF-8 JSON, creating parent
/// directories. Returns the path written.
pub fn write_report(payload: &ReportPayload, path: &Path) -> Result<PathBuf, ReportWriteError> {
    let fail = |message: String| ReportWriteError {
        path: path.to_path_buf(),
        message,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }
    }

    let mut json = serde_json::to_string_pretty(payload).map_err(|e| fail(e.to_string()))?;
    json.push('\n');
    std::fs::write(path, json).map_err(|e| fail(e.to_string()))?;

    log::debug!("report written to {}", path.display());
    Ok(path.to_path_buf())
}

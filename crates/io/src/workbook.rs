// Spreadsheet rows → left-side records

use std::path::{Path, PathBuf};

use tallysync_recon::config::{ColumnMapping, SourceConfig};
use tallysync_recon::{Category, Origin, Record, RecordSource, SourceError};

use crate::grid::{read_grid, Cell, Grid};

/// Record source backed by one worksheet (or a csv/tsv file).
#[derive(Debug, Clone)]
pub struct WorkbookSource {
    path: PathBuf,
    sheet: Option<String>,
    columns: ColumnMapping,
}

impl WorkbookSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheet: None,
            columns: ColumnMapping::default(),
        }
    }

    pub fn from_config(path: impl Into<PathBuf>, config: &SourceConfig) -> Self {
        Self::new(path)
            .with_sheet(config.sheet.clone())
            .with_columns(config.columns.clone())
    }

    pub fn with_sheet(mut self, sheet: Option<String>) -> Self {
        self.sheet = sheet;
        self
    }

    pub fn with_columns(mut self, columns: ColumnMapping) -> Self {
        self.columns = columns;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for WorkbookSource {
    fn extract(&self) -> Result<Vec<Record>, SourceError> {
        let grid = read_grid(&self.path, self.sheet.as_deref())?;
        let records = records_from_grid(&grid, &self.columns)?;
        log::info!(
            "extracted {} record(s) from {} [{}]",
            records.len(),
            self.path.display(),
            grid.sheet
        );
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Header mapping
// ---------------------------------------------------------------------------

struct ColumnIndex {
    reference: usize,
    customer: usize,
    category: usize,
    amount: usize,
    memo: Option<usize>,
}

fn find_column(headers: &[String], name: &str) -> Option<usize> {
    let name = name.trim();
    headers
        .iter()
        .position(|h| h == name)
        .or_else(|| headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
}

fn index_columns(headers: &[String], columns: &ColumnMapping) -> Result<ColumnIndex, SourceError> {
    let required = |name: &str| {
        find_column(headers, name).ok_or_else(|| SourceError::MissingColumn {
            column: name.to_string(),
        })
    };

    let memo = match columns.memo_column() {
        Some(name) => {
            let found = find_column(headers, name);
            if found.is_none() {
                log::debug!("memo column '{name}' not present, memos left empty");
            }
            found
        }
        None => None,
    };

    Ok(ColumnIndex {
        reference: required(&columns.reference)?,
        customer: required(&columns.customer)?,
        category: required(&columns.category)?,
        amount: required(&columns.amount)?,
        memo,
    })
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Turn a grid into records. The first non-blank row is the header; blank
/// rows and rows without a reference are skipped.
pub fn records_from_grid(grid: &Grid, columns: &ColumnMapping) -> Result<Vec<Record>, SourceError> {
    let Some(header_at) = grid
        .rows
        .iter()
        .position(|row| row.iter().any(|c| !c.is_blank()))
    else {
        return Ok(Vec::new());
    };

    let headers: Vec<String> = grid.rows[header_at].iter().map(Cell::text).collect();
    let idx = index_columns(&headers, columns)?;

    let empty = Cell::Empty;
    let mut records = Vec::new();

    for (offset, row) in grid.rows.iter().enumerate().skip(header_at + 1) {
        if row.iter().all(Cell::is_blank) {
            continue;
        }
        let cell = |i: usize| row.get(i).unwrap_or(&empty);
        let row_no = grid.display_row(offset);

        let reference = cell(idx.reference).text();
        if reference.is_empty() {
            log::debug!("row {row_no}: no reference, skipped");
            continue;
        }

        let category_text = cell(idx.category).text();
        let category = Category::new(&category_text).map_err(|_| SourceError::BadCell {
            row: row_no,
            column: columns.category.clone(),
            value: category_text.clone(),
        })?;

        let mut record = match cell_amount(cell(idx.amount)) {
            Some(amount) => Record::new(reference, category, amount, Origin::Left),
            None => {
                let text = cell(idx.amount).text();
                log::warn!(
                    "row {row_no}, column '{}': cannot parse '{text}' as an amount",
                    columns.amount
                );
                Record::unparsed_amount(reference, category, text, Origin::Left)
            }
        }
        .with_customer(cell(idx.customer).text());
        if let Some(m) = idx.memo {
            record = record.with_memo(cell(m).text());
        }
        records.push(record);
    }

    Ok(records)
}

fn cell_amount(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Number(_) | Cell::Empty => None,
        Cell::Text(s) => parse_amount(s),
    }
}

/// Parse accounting-formatted text: `$1,234.50`, `(12.00)`, `-7`.
pub fn parse_amount(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    // (123.45) → -123.45
    let (negative, inner) = match trimmed.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned: String = inner
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    for (i, c) in cleaned.chars().enumerate() {
        match c {
            '0'..='9' | '.' => {}
            '-' | '+' if i == 0 && !negative => {}
            _ => return None,
        }
    }

    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}

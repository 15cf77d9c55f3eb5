use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Which collection a record was produced by. Never changes after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Spreadsheet export.
    Left,
    /// Accounting system.
    Right,
}

impl Origin {
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// Chart-of-account label. Trimmed and non-empty; compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(label: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = label.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyCategory);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One financial line item from either source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub reference: String,
    pub customer: String,
    pub category: Category,
    pub amount: f64,
    /// Source text of an amount cell that did not parse; `amount` is NaN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_text: Option<String>,
    pub memo: Option<String>,
    pub origin: Origin,
}

impl Record {
    pub fn new(
        reference: impl Into<String>,
        category: Category,
        amount: f64,
        origin: Origin,
    ) -> Self {
        Self {
            reference: reference.into(),
            customer: String::new(),
            category,
            amount,
            amount_text: None,
            memo: None,
            origin,
        }
    }

    /// Record whose amount cell held `text` that is not a number. It never
    /// matches and is refused by the applier.
    pub fn unparsed_amount(
        reference: impl Into<String>,
        category: Category,
        text: impl Into<String>,
        origin: Origin,
    ) -> Self {
        Self {
            amount_text: Some(text.into()),
            ..Self::new(reference, category, f64::NAN, origin)
        }
    }

    pub fn with_customer(mut self, customer: impl Into<String>) -> Self {
        self.customer = customer.into();
        self
    }

    /// Blank memos are stored as `None`.
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        let memo = memo.into();
        self.memo = if memo.trim().is_empty() { None } else { Some(memo) };
        self
    }

    /// Copy of this record attributed to `origin`.
    pub fn retagged(&self, origin: Origin) -> Self {
        Self { origin, ..self.clone() }
    }
}

// ---------------------------------------------------------------------------
// Match key
// ---------------------------------------------------------------------------

/// Which field(s) correlate a record across sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKey {
    /// The row reference (spreadsheet "Child ID").
    #[default]
    Reference,
    /// The chart-of-account label alone.
    Category,
    /// `customer|category`.
    CustomerCategory,
}

impl MatchKey {
    pub fn key_of(&self, record: &Record) -> String {
        match self {
            Self::Reference => record.reference.clone(),
            Self::Category => record.category.as_str().to_string(),
            Self::CustomerCategory => format!("{}|{}", record.customer, record.category),
        }
    }
}

impl std::str::FromStr for MatchKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reference" => Ok(Self::Reference),
            "category" => Ok(Self::Category),
            "customer_category" => Ok(Self::CustomerCategory),
            other => Err(format!(
                "unknown match key '{other}' (expected reference, category or customer_category)"
            )),
        }
    }
}

impl std::fmt::Display for MatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Category => write!(f, "category"),
            Self::CustomerCategory => write!(f, "customer_category"),
        }
    }
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    NameMismatch,
    DataMismatch,
    MissingOnLeft,
    MissingOnRight,
}

impl ConflictReason {
    /// The reason as seen from the other side.
    pub fn mirrored(self) -> Self {
        match self {
            Self::MissingOnLeft => Self::MissingOnRight,
            Self::MissingOnRight => Self::MissingOnLeft,
            other => other,
        }
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameMismatch => write!(f, "name_mismatch"),
            Self::DataMismatch => write!(f, "data_mismatch"),
            Self::MissingOnLeft => write!(f, "missing_on_left"),
            Self::MissingOnRight => write!(f, "missing_on_right"),
        }
    }
}

/// The compared fields of one side of a conflict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_text: Option<String>,
    pub category: Category,
    pub customer: String,
    pub memo: Option<String>,
}

impl From<&Record> for RecordSummary {
    fn from(r: &Record) -> Self {
        Self {
            amount: r.amount,
            amount_text: r.amount_text.clone(),
            category: r.category.clone(),
            customer: r.customer.clone(),
            memo: r.memo.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub key: String,
    pub left: Option<RecordSummary>,
    pub right: Option<RecordSummary>,
    pub reason: ConflictReason,
}

impl Conflict {
    pub fn mismatch(key: String, left: &Record, right: &Record, reason: ConflictReason) -> Self {
        Self {
            key,
            left: Some(left.into()),
            right: Some(right.into()),
            reason,
        }
    }

    /// Key present only in the accounting system.
    pub fn missing_on_left(key: String, right: &Record) -> Self {
        Self {
            key,
            left: None,
            right: Some(right.into()),
            reason: ConflictReason::MissingOnLeft,
        }
    }

    /// Key present only in the spreadsheet.
    pub fn missing_on_right(key: String, left: &Record) -> Self {
        Self {
            key,
            left: Some(left.into()),
            right: None,
            reason: ConflictReason::MissingOnRight,
        }
    }

    /// Same conflict with the sides exchanged.
    pub fn swapped(&self) -> Self {
        Self {
            key: self.key.clone(),
            left: self.right.clone(),
            right: self.left.clone(),
            reason: self.reason.mirrored(),
        }
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// A record whose key exists on one side only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unmatched {
    pub key: String,
    pub record: Record,
}

/// Result of one reconciliation run. Built fresh per call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub left_only: Vec<Unmatched>,
    pub right_only: Vec<Unmatched>,
    pub conflicts: Vec<Conflict>,
    pub match_count: usize,
}

impl ComparisonReport {
    /// Left-only records, in report order, ready for the sync applier.
    pub fn left_only_records(&self) -> Vec<Record> {
        self.left_only.iter().map(|u| u.record.clone()).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.left_only.is_empty() && self.right_only.is_empty() && self.conflicts.is_empty()
    }
}

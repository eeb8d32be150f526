//! Core data types for the ingestion pipeline.

use chrono::{DateTime, SecondsFormat, Utc};
use partwatch_ids::{PartId, ReportId};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A single decoded spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// String form of the cell, or `None` for empty cells.
    ///
    /// Integral numbers render without a fractional part so that a part
    /// number stored as a numeric cell reads the same as its text form.
    pub fn render(&self) -> Option<String> {
        match self {
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) => Some(render_number(*n)),
            Cell::Bool(b) => Some(b.to_string()),
            Cell::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

fn render_number(n: f64) -> String {
    const I64_BOUND: f64 = 9.0e18;
    if n.is_finite() && n.fract() == 0.0 && n.abs() < I64_BOUND {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

pub type Row = Vec<Cell>;

/// One sheet's rows. Row 0 is the header.
pub type SheetGrid = Vec<Row>;

/// Category assigned to a flagged row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Surface Body")]
    SurfaceBody,
    #[serde(rename = "Incorrect Naming")]
    IncorrectNaming,
    #[serde(rename = "Missing Extension")]
    MissingExtension,
    #[serde(rename = "Non-10-Digit")]
    NonTenDigit,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::SurfaceBody,
        Category::IncorrectNaming,
        Category::MissingExtension,
        Category::NonTenDigit,
    ];

    /// Label shared with the reporting UI and the hosted tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SurfaceBody => "Surface Body",
            Category::IncorrectNaming => "Incorrect Naming",
            Category::MissingExtension => "Missing Extension",
            Category::NonTenDigit => "Non-10-Digit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correction lifecycle of a flagged part. Only `Open` is produced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartStatus {
    Open,
    Corrected,
}

impl PartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartStatus::Open => "open",
            PartStatus::Corrected => "corrected",
        }
    }
}

/// A data row that matched one of the classification rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedRow {
    #[serde(rename = "id")]
    pub identifier: PartId,
    pub value: String,
    pub category: Category,
    pub report_id: ReportId,
    #[serde(serialize_with = "serialize_timestamp")]
    pub date_added: DateTime<Utc>,
    pub status: PartStatus,
    pub date_corrected: Option<DateTime<Utc>>,
}

/// Per-sheet counts produced during classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetStat {
    pub sheet_name: String,
    pub total_rows: u64,
    pub issue_rows: u64,
}

/// Summary of one processed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    pub file_name: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub upload_date: DateTime<Utc>,
    pub total_parts_analyzed: u64,
    pub sheet_stats: Vec<SheetStat>,
}

impl Report {
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheet_stats
            .iter()
            .map(|s| s.sheet_name.clone())
            .collect()
    }

    pub fn issue_rows(&self) -> u64 {
        self.sheet_stats.iter().map(|s| s.issue_rows).sum()
    }
}

/// RFC 3339 with microsecond precision and a `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}

//! Row classification.
//!
//! Each data row's first cell is the part value and its second cell is the
//! surface indicator. Rules are checked in a fixed order and the first match
//! decides the category; rows matching no rule are not flagged.

use crate::types::{Category, Cell, ClassifiedRow, PartStatus, Row, SheetGrid, SheetStat};
use chrono::{DateTime, Utc};
use partwatch_ids::{PartId, ReportId};

const SURFACE_MARKER: &str = "surface";
const PART_EXTENSIONS: [&str; 2] = [".sldprt", ".sldasm"];
const PART_NUMBER_DIGITS: usize = 10;

/// Apply the rule chain to one part value.
///
/// `indicator` is compared case-insensitively; pass `""` when the row has no
/// second cell.
pub fn categorize(part_value: &str, indicator: &str) -> Option<Category> {
    if indicator.to_lowercase().contains(SURFACE_MARKER) {
        Some(Category::SurfaceBody)
    } else if !part_value.is_ascii() {
        Some(Category::IncorrectNaming)
    } else if !has_part_extension(part_value) {
        Some(Category::MissingExtension)
    } else if !starts_with_part_number(part_value) {
        Some(Category::NonTenDigit)
    } else {
        None
    }
}

// Only reached for ASCII values, so byte slicing is safe.
fn has_part_extension(value: &str) -> bool {
    PART_EXTENSIONS.iter().any(|ext| {
        value.len() >= ext.len() && value[value.len() - ext.len()..].eq_ignore_ascii_case(ext)
    })
}

fn starts_with_part_number(value: &str) -> bool {
    value.len() >= PART_NUMBER_DIGITS
        && value.as_bytes()[..PART_NUMBER_DIGITS]
            .iter()
            .all(u8::is_ascii_digit)
}

/// Part value of a data row, or `None` when the row should be skipped.
fn part_value(row: &Row) -> Option<String> {
    let value = row.first().and_then(Cell::render)?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn indicator(row: &Row) -> String {
    row.get(1)
        .and_then(Cell::render)
        .map(|s| s.to_lowercase())
        .unwrap_or_default()
}

/// Classify every data row of one sheet.
///
/// Row 0 is the header. `total_rows` counts every row after it, including
/// rows skipped because their first cell is blank.
pub fn classify(
    grid: &SheetGrid,
    sheet_name: &str,
    report_id: &ReportId,
    date_added: DateTime<Utc>,
) -> (Vec<ClassifiedRow>, SheetStat) {
    let mut rows = Vec::new();

    for (index, row) in grid.iter().enumerate().skip(1) {
        let Some(value) = part_value(row) else {
            continue;
        };
        let Some(category) = categorize(&value, &indicator(row)) else {
            continue;
        };

        rows.push(ClassifiedRow {
            identifier: PartId::compose(report_id, sheet_name, index),
            value,
            category,
            report_id: report_id.clone(),
            date_added,
            status: PartStatus::Open,
            date_corrected: None,
        });
    }

    let stat = SheetStat {
        sheet_name: sheet_name.to_string(),
        total_rows: grid.len().saturating_sub(1) as u64,
        issue_rows: rows.len() as u64,
    };

    (rows, stat)
}

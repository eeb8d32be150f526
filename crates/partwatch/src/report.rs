//! Report assembly: one report per processed file.

use crate::classifier::classify;
use crate::types::{ClassifiedRow, Report, SheetGrid};
use chrono::{DateTime, Utc};
use partwatch_ids::{IdSource, UuidIdSource};
use std::sync::Arc;

pub struct ReportBuilder {
    ids: Arc<dyn IdSource>,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new(Arc::new(UuidIdSource))
    }
}

impl ReportBuilder {
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self { ids }
    }

    /// Classify all sheets and assemble the report, stamped with the current time.
    pub fn build<S: AsRef<str>>(
        &self,
        file_name: &str,
        sheets: &[(S, SheetGrid)],
    ) -> (Report, Vec<ClassifiedRow>) {
        self.build_at(file_name, sheets, Utc::now())
    }

    /// Like [`build`](Self::build) with an explicit capture time, shared by
    /// the report and every row.
    pub fn build_at<S: AsRef<str>>(
        &self,
        file_name: &str,
        sheets: &[(S, SheetGrid)],
        captured_at: DateTime<Utc>,
    ) -> (Report, Vec<ClassifiedRow>) {
        let report_id = self.ids.next_report_id();
        let mut parts = Vec::new();
        let mut sheet_stats = Vec::with_capacity(sheets.len());

        for (name, grid) in sheets {
            let (rows, stat) = classify(grid, name.as_ref(), &report_id, captured_at);
            parts.extend(rows);
            sheet_stats.push(stat);
        }

        let report = Report {
            id: report_id,
            file_name: file_name.to_string(),
            upload_date: captured_at,
            total_parts_analyzed: sheet_stats.iter().map(|s| s.total_rows).sum(),
            sheet_stats,
        };

        (report, parts)
    }
}

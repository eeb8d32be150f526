//! Hosted report store reached over PostgREST (Supabase).
//!
//! Rows go to `{base}/rest/v1/reports` and `{base}/rest/v1/part_numbers`
//! with snake_case columns. Duplicate primary keys are ignored server-side,
//! so retrying a report that was already stored is harmless.

use super::ReportStore;
use crate::error::PersistenceError;
use crate::types::{format_timestamp, ClassifiedRow, Report};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const REPORTS_TABLE: &str = "reports";
const PARTS_TABLE: &str = "part_numbers";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RestReportStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestReportStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn post_rows(&self, table: &str, rows: Value) -> Result<(), PersistenceError> {
        let resp = self
            .client
            .post(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&rows)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PersistenceError::Rejected {
                table: table.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        debug!(table, status = status.as_u16(), "Rows accepted");
        Ok(())
    }
}

fn report_row(report: &Report) -> Value {
    json!({
        "id": report.id.as_str(),
        "file_name": report.file_name,
        "upload_date": format_timestamp(&report.upload_date),
        "total_parts_analyzed": report.total_parts_analyzed,
        "sheet_stats": report.sheet_stats,
    })
}

fn part_row(part: &ClassifiedRow) -> Value {
    json!({
        "id": part.identifier.as_str(),
        "value": part.value,
        "category": part.category.as_str(),
        "report_id": part.report_id.as_str(),
        "date_added": format_timestamp(&part.date_added),
        "status": part.status.as_str(),
        "date_corrected": part.date_corrected.as_ref().map(format_timestamp),
    })
}

#[async_trait]
impl ReportStore for RestReportStore {
    async fn insert_report(
        &self,
        report: &Report,
        parts: &[ClassifiedRow],
    ) -> Result<(), PersistenceError> {
        self.post_rows(REPORTS_TABLE, json!([report_row(report)]))
            .await?;

        if !parts.is_empty() {
            let rows: Vec<Value> = parts.iter().map(part_row).collect();
            self.post_rows(PARTS_TABLE, Value::Array(rows)).await?;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}

//! Local SQLite report store.

use super::ReportStore;
use crate::error::PersistenceError;
use crate::types::{format_timestamp, Category, ClassifiedRow, Report, SheetStat};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::info;

/// A report as read back from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub id: String,
    pub file_name: String,
    pub upload_date: String,
    pub total_parts_analyzed: i64,
    pub sheet_stats: Vec<SheetStat>,
}

/// A part row as read back from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPart {
    pub id: String,
    pub value: String,
    pub category: Option<Category>,
    pub report_id: String,
    pub date_added: String,
    pub status: String,
    pub date_corrected: Option<String>,
}

#[derive(Clone)]
pub struct SqliteReportStore {
    pool: SqlitePool,
}

impl SqliteReportStore {
    /// Open or create the database at `path`, creating tables as needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        info!(path = %path.display(), "Report store opened");
        Ok(store)
    }

    /// In-memory database. The single connection is never recycled, since
    /// dropping it would discard the data.
    pub async fn open_in_memory() -> Result<Self, PersistenceError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        sqlx::query("PRAGMA foreign_keys=ON")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                upload_date TEXT NOT NULL,
                total_parts_analyzed INTEGER NOT NULL,
                sheet_stats TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS part_numbers (
                id TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                category TEXT NOT NULL,
                report_id TEXT NOT NULL REFERENCES reports(id),
                date_added TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                date_corrected TEXT
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_part_numbers_report ON part_numbers(report_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_report(&self, id: &str) -> Result<Option<StoredReport>, PersistenceError> {
        let row = sqlx::query(
            "SELECT id, file_name, upload_date, total_parts_analyzed, sheet_stats FROM reports WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let stats_json: String = row.get("sheet_stats");
                Ok(Some(StoredReport {
                    id: row.get("id"),
                    file_name: row.get("file_name"),
                    upload_date: row.get("upload_date"),
                    total_parts_analyzed: row.get("total_parts_analyzed"),
                    sheet_stats: serde_json::from_str(&stats_json)?,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn list_reports(&self) -> Result<Vec<StoredReport>, PersistenceError> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM reports ORDER BY upload_date, id")
            .fetch_all(&self.pool)
            .await?;

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(report) = self.get_report(&id).await? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    pub async fn list_parts_for_report(
        &self,
        report_id: &str,
    ) -> Result<Vec<StoredPart>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT id, value, category, report_id, date_added, status, date_corrected \
             FROM part_numbers WHERE report_id = ? ORDER BY rowid",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let category: String = row.get("category");
                StoredPart {
                    id: row.get("id"),
                    value: row.get("value"),
                    category: Category::parse(&category),
                    report_id: row.get("report_id"),
                    date_added: row.get("date_added"),
                    status: row.get("status"),
                    date_corrected: row.get("date_corrected"),
                }
            })
            .collect())
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn insert_report(
        &self,
        report: &Report,
        parts: &[ClassifiedRow],
    ) -> Result<(), PersistenceError> {
        let stats_json = serde_json::to_string(&report.sheet_stats)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO reports (id, file_name, upload_date, total_parts_analyzed, sheet_stats)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(report.id.as_str())
        .bind(&report.file_name)
        .bind(format_timestamp(&report.upload_date))
        .bind(report.total_parts_analyzed as i64)
        .bind(&stats_json)
        .execute(&mut *tx)
        .await?;

        for part in parts {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO part_numbers (id, value, category, report_id, date_added, status, date_corrected)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(part.identifier.as_str())
            .bind(&part.value)
            .bind(part.category.as_str())
            .bind(part.report_id.as_str())
            .bind(format_timestamp(&part.date_added))
            .bind(part.status.as_str())
            .bind(part.date_corrected.as_ref().map(format_timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

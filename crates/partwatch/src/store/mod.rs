//! Report persistence.
//!
//! The watch loop only needs "insert succeeds or fails". Two backends are
//! provided: a local SQLite file and a hosted PostgREST endpoint (Supabase).
//! Both tolerate re-delivery of the same report, since a file whose archival
//! fails is processed again on the next cycle.

mod rest;
mod sqlite;

pub use rest::RestReportStore;
pub use sqlite::SqliteReportStore;

use crate::error::PersistenceError;
use crate::types::{ClassifiedRow, Report};
use async_trait::async_trait;

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Store the report, then its part rows.
    async fn insert_report(
        &self,
        report: &Report,
        parts: &[ClassifiedRow],
    ) -> Result<(), PersistenceError>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

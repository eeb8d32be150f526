//! Partwatch - Spreadsheet Intake & Part-Number Audit
//!
//! Partwatch polls a drop folder for part-list workbooks, flags rows whose
//! part number breaks the naming rules, stores a report, and moves the file
//! into an archive folder.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Watcher    │     │  Decoder    │     │  Report     │     │  Store      │
//! │ (poll dir)  │────▶│ (calamine)  │────▶│  Builder    │────▶│ (SQLite /   │
//! │             │     │             │     │ (classify)  │     │  REST)      │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//!                     ┌─────────────┐     ┌─────────────┐            │
//!                     │  /ws        │◀────│  Archiver   │◀───────────┘
//!                     │ subscribers │     │ (_copyN)    │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Category**: the first rule a part number breaks (surface body,
//!   non-ASCII name, missing CAD extension, missing 10-digit prefix)
//! - **Report**: per-file summary with per-sheet row and issue counts
//! - **Cycle**: one pass over a fresh snapshot of the watched folder

pub mod archive;
pub mod classifier;
pub mod config;
pub mod decode;
pub mod error;
pub mod notify;
pub mod report;
pub mod server;
pub mod store;
pub mod types;
pub mod watcher;

// Re-exports for convenience
pub use archive::archive;
pub use classifier::{categorize, classify};
pub use config::{StoreConfig, WatchConfig};
pub use decode::{CalamineDecoder, Workbook, WorkbookDecoder};
pub use error::{ArchiveError, DecodeError, IngestError, PersistenceError, Result};
pub use notify::{AnalysisEvent, SubscriberRegistry};
pub use report::ReportBuilder;
pub use store::{ReportStore, RestReportStore, SqliteReportStore};
pub use types::{Category, Cell, ClassifiedRow, PartStatus, Report, SheetGrid, SheetStat};
pub use watcher::{CycleSummary, FailedStage, FileOutcome, Watcher};

//! The polling watch loop.
//!
//! A cycle snapshots the watched directory once, then drives each file
//! through decode, report building, persistence, archival and notification.
//! Per-file failures are logged and reported in the [`CycleSummary`]; they
//! never stop the cycle. A file is moved only after its report was accepted,
//! so anything that fails earlier stays put and is picked up again next cycle.

use crate::archive::archive;
use crate::config::{prepare_dirs, WatchConfig};
use crate::decode::WorkbookDecoder;
use crate::error::IngestError;
use crate::notify::{AnalysisEvent, SubscriberRegistry};
use crate::report::ReportBuilder;
use crate::store::ReportStore;
use crate::types::Report;
use partwatch_ids::IdSource;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Pipeline step at which a file was abandoned for this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStage {
    Decode,
    Persist,
    Archive,
}

impl fmt::Display for FailedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailedStage::Decode => "decode",
            FailedStage::Persist => "persist",
            FailedStage::Archive => "archive",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug)]
pub enum FileOutcome {
    Archived {
        report: Report,
        flagged: usize,
        destination: PathBuf,
    },
    Failed {
        stage: FailedStage,
        error: IngestError,
    },
}

impl FileOutcome {
    pub fn is_archived(&self) -> bool {
        matches!(self, FileOutcome::Archived { .. })
    }

    pub fn failed_stage(&self) -> Option<FailedStage> {
        match self {
            FileOutcome::Failed { stage, .. } => Some(*stage),
            FileOutcome::Archived { .. } => None,
        }
    }
}

/// Result of one pass over the watched directory.
#[derive(Debug, Default)]
pub struct CycleSummary {
    pub outcomes: Vec<(PathBuf, FileOutcome)>,
}

impl CycleSummary {
    pub fn discovered(&self) -> usize {
        self.outcomes.len()
    }

    pub fn archived(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_archived()).count()
    }

    pub fn failed(&self) -> usize {
        self.discovered() - self.archived()
    }

    pub fn outcome_for(&self, file_name: &str) -> Option<&FileOutcome> {
        self.outcomes
            .iter()
            .find(|(path, _)| path.file_name().map_or(false, |n| n == file_name))
            .map(|(_, outcome)| outcome)
    }
}

pub struct Watcher {
    watch_dir: PathBuf,
    archive_dir: PathBuf,
    extension: String,
    poll_interval: Duration,
    decoder: Arc<dyn WorkbookDecoder>,
    builder: ReportBuilder,
    store: Option<Arc<dyn ReportStore>>,
    notifier: Option<SubscriberRegistry>,
}

impl Watcher {
    pub fn new(config: &WatchConfig, decoder: Arc<dyn WorkbookDecoder>) -> Self {
        Self {
            watch_dir: config.watch_dir.clone(),
            archive_dir: config.archive_dir.clone(),
            extension: config.normalized_extension().to_string(),
            poll_interval: config.poll_interval(),
            decoder,
            builder: ReportBuilder::default(),
            store: None,
            notifier: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_notifier(mut self, registry: SubscriberRegistry) -> Self {
        self.notifier = Some(registry);
        self
    }

    pub fn with_id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.builder = ReportBuilder::new(ids);
        self
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Candidate files currently in the watched directory, sorted by name.
    ///
    /// Flat scan; only regular files (or symlinks to them) whose extension
    /// matches case-insensitively. A missing directory yields nothing.
    pub fn discover(&self) -> std::io::Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.watch_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!(
                        dir = %self.watch_dir.display(),
                        error = %e,
                        "Skipping unreadable directory entry"
                    );
                    continue;
                }
            };
            // is_file follows symlinks; a dangling link is skipped.
            if has_extension(&path, &self.extension) && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Run one file through the pipeline.
    pub async fn process_file(&self, path: &Path) -> FileOutcome {
        let file_name = display_name(path);

        let sheets = match self.decoder.decode(path) {
            Ok(sheets) => sheets,
            Err(e) => {
                warn!(file = %file_name, error = %e, "Decode failed; will retry next cycle");
                self.notify(AnalysisEvent::failed(&file_name, e.message.clone()));
                return FileOutcome::Failed {
                    stage: FailedStage::Decode,
                    error: e.into(),
                };
            }
        };

        let (report, parts) = self.builder.build(&file_name, &sheets);
        debug!(
            file = %file_name,
            report_id = %report.id,
            sheets = report.sheet_stats.len(),
            total_rows = report.total_parts_analyzed,
            flagged = parts.len(),
            "Report built"
        );

        if let Some(store) = &self.store {
            if let Err(e) = store.insert_report(&report, &parts).await {
                error!(
                    file = %file_name,
                    backend = store.backend_name(),
                    error = %e,
                    "Persisting report failed; file left in place"
                );
                return FileOutcome::Failed {
                    stage: FailedStage::Persist,
                    error: e.into(),
                };
            }
        }

        let destination = match archive(path, &self.archive_dir) {
            Ok(dest) => dest,
            Err(e) => {
                error!(
                    file = %file_name,
                    report_id = %report.id,
                    error = %e,
                    "Archiving failed after report was stored"
                );
                return FileOutcome::Failed {
                    stage: FailedStage::Archive,
                    error: e.into(),
                };
            }
        };

        info!(
            file = %file_name,
            report_id = %report.id,
            total_rows = report.total_parts_analyzed,
            flagged = parts.len(),
            dest = %destination.display(),
            "Analyzed and archived"
        );

        self.notify(AnalysisEvent::analyzed(&file_name, report.sheet_names()));

        FileOutcome::Archived {
            report,
            flagged: parts.len(),
            destination,
        }
    }

    /// One `Processing` phase over a fresh snapshot of the watched directory.
    /// Files added while the cycle runs wait for the next one.
    pub async fn run_cycle(&self) -> CycleSummary {
        let files = match self.discover() {
            Ok(files) => files,
            Err(e) => {
                warn!(dir = %self.watch_dir.display(), error = %e, "Failed to scan watch directory");
                return CycleSummary::default();
            }
        };

        let mut summary = CycleSummary::default();
        for path in files {
            let outcome = self.process_file(&path).await;
            summary.outcomes.push((path, outcome));
        }

        if summary.discovered() > 0 {
            info!(
                discovered = summary.discovered(),
                archived = summary.archived(),
                failed = summary.failed(),
                "Cycle complete"
            );
        }
        summary
    }

    /// Run cycles until `shutdown` flips to `true` or its sender is dropped.
    /// Shutdown is only observed between cycles.
    ///
    /// Returns at once, without processing anything, when the directories
    /// cannot be created or resolve to the same folder.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = prepare_dirs(&self.watch_dir, &self.archive_dir) {
            error!(error = %e, "Watcher not started");
            return;
        }
        info!(
            "Watching {} for *.{} every {:?}",
            self.watch_dir.display(),
            self.extension,
            self.poll_interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown channel closed");
                        break;
                    }
                }
            }
        }

        info!("Watcher stopped");
    }

    fn notify(&self, event: AnalysisEvent) {
        if let Some(registry) = &self.notifier {
            let delivered = registry.broadcast(&event);
            debug!(file = %event.file_name, delivered, "Event broadcast");
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case(extension))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

//! Partwatch CLI
//!
//! Usage:
//!     partwatch run --watch-dir Uploads --archive-dir ParsedExcel
//!     partwatch check parts.xlsx

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use partwatch::store::ReportStore;
use partwatch::{
    CalamineDecoder, ReportBuilder, RestReportStore, SqliteReportStore, StoreConfig,
    SubscriberRegistry, WatchConfig, Watcher, WorkbookDecoder,
};
use partwatch_logging::{init_logging, LogConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Grace period for open WebSocket connections on shutdown
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

#[derive(Parser, Debug)]
#[command(name = "partwatch", about = "Part-list spreadsheet intake and audit")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Do not write a log file
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch a folder and process spreadsheets as they arrive
    Run(RunArgs),

    /// Classify one workbook and print its report as JSON (no store, no move)
    Check {
        /// Workbook to classify
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// TOML configuration file
    #[arg(short, long, env = "PARTWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Folder polled for new spreadsheets
    #[arg(long, env = "PARTWATCH_WATCH_DIR")]
    watch_dir: Option<PathBuf>,

    /// Folder processed spreadsheets are moved into
    #[arg(long, env = "PARTWATCH_ARCHIVE_DIR")]
    archive_dir: Option<PathBuf>,

    /// Milliseconds between polls
    #[arg(long, env = "PARTWATCH_INTERVAL_MS")]
    interval_ms: Option<u64>,

    /// Store reports in this SQLite database
    #[arg(long, env = "PARTWATCH_DB", conflicts_with = "no_store")]
    db: Option<PathBuf>,

    /// Do not persist reports
    #[arg(long)]
    no_store: bool,

    /// Serve live events on ws://ADDR/ws
    #[arg(long, env = "PARTWATCH_NOTIFY_BIND")]
    notify_bind: Option<SocketAddr>,
}

impl RunArgs {
    fn resolve_config(&self) -> Result<WatchConfig> {
        let mut config = match &self.config {
            Some(path) => WatchConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => WatchConfig::default(),
        };

        if let Some(dir) = &self.watch_dir {
            config.watch_dir = dir.clone();
        }
        if let Some(dir) = &self.archive_dir {
            config.archive_dir = dir.clone();
        }
        if let Some(ms) = self.interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(path) = &self.db {
            config.store = Some(StoreConfig::Sqlite { path: path.clone() });
        }
        if self.no_store {
            config.store = Some(StoreConfig::None);
        }
        if let Some(addr) = self.notify_bind {
            config.notify_bind = Some(addr);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    // .env must be loaded before clap reads env fallbacks
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    match init_logging(LogConfig {
        app_name: "partwatch",
        verbose: cli.verbose,
        log_to_file: !cli.no_log_file,
    }) {
        Ok(_) => {}
        Err(e) => eprintln!("Warning: failed to initialize logging: {:#}", e),
    }

    match dotenv {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring unreadable .env: {}", e),
    }

    let result = match cli.command {
        Commands::Run(args) => run(args),
        Commands::Check { file } => check(&file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = args.resolve_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    runtime.block_on(run_watcher(config))
}

async fn open_store(config: &WatchConfig) -> Result<Option<Arc<dyn ReportStore>>> {
    let store: Option<Arc<dyn ReportStore>> =
        match config.resolve_store(|key| std::env::var(key).ok()) {
            StoreConfig::Sqlite { path } => {
                let store = SqliteReportStore::open(&path).await.with_context(|| {
                    format!("Failed to open report database {}", path.display())
                })?;
                Some(Arc::new(store))
            }
            StoreConfig::Rest { url, api_key } => {
                info!("Storing reports at {}", url);
                Some(Arc::new(RestReportStore::new(url, api_key)))
            }
            StoreConfig::None => {
                warn!("No report store configured; reports are not persisted");
                None
            }
        };
    Ok(store)
}

async fn run_watcher(config: WatchConfig) -> Result<()> {
    info!("Starting partwatch");
    info!("  Watch dir: {}", config.watch_dir.display());
    info!("  Archive dir: {}", config.archive_dir.display());
    config.prepare_dirs().context("Invalid configuration")?;

    let store = open_store(&config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut watcher = Watcher::new(&config, Arc::new(CalamineDecoder));
    if let Some(store) = store {
        watcher = watcher.with_store(store);
    }

    let mut server = None;
    if let Some(addr) = config.notify_bind {
        let registry = SubscriberRegistry::new();
        watcher = watcher.with_notifier(registry.clone());

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind notification endpoint {}", addr))?;
        let mut stop = shutdown_rx.clone();
        server = Some(tokio::spawn(partwatch::server::serve_on(
            listener,
            registry,
            async move {
                let _ = stop.wait_for(|stopped| *stopped).await;
            },
        )));
    }

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Keep the sender alive; dropping it would stop the watcher.
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
        let _ = shutdown_tx.send(true);
    });

    watcher.run(shutdown_rx).await;

    if let Some(server) = server {
        match tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!("Notification endpoint error: {}", e),
            Ok(Err(e)) => warn!("Notification endpoint task failed: {}", e),
            Err(_) => warn!(
                "Notification endpoint did not stop within {}s",
                SHUTDOWN_TIMEOUT_SECS
            ),
        }
    }
    Ok(())
}

fn check(file: &Path) -> Result<()> {
    let sheets = CalamineDecoder.decode(file)?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let (report, parts) = ReportBuilder::default().build(&file_name, &sheets);
    let output = serde_json::json!({
        "report": report,
        "flaggedRows": parts,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to encode report")?
    );
    Ok(())
}

//! Shared logging setup for partwatch binaries.
//!
//! Installs a `tracing` registry with a stderr layer and, unless disabled, a
//! log file under `{partwatch home}/logs` that rolls over by size.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "partwatch=info,partwatch_logging=info";
const VERBOSE_LOG_FILTER: &str = "partwatch=debug,partwatch_logging=debug";

pub struct LogConfig<'a> {
    /// Log file stem, e.g. `partwatch` -> `partwatch.log`.
    pub app_name: &'a str,
    /// Raise the console filter to `debug` for partwatch crates.
    pub verbose: bool,
    pub log_to_file: bool,
}

/// Install the global subscriber. Honors `RUST_LOG` when set.
///
/// Returns the active log file, if any. A log file that cannot be opened is
/// reported on stderr and logging continues on the console only.
pub fn init_logging(config: LogConfig<'_>) -> Result<Option<PathBuf>> {
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let mut log_path = None;
    let file_layer = if config.log_to_file {
        match open_log_file(config.app_name) {
            Ok(log) => {
                log_path = Some(log.path());
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(log))
                        .with_ansi(false)
                        .with_filter(env_filter()),
                )
            }
            Err(err) => {
                eprintln!("Warning: file logging disabled: {:#}", err);
                None
            }
        }
    } else {
        None
    };

    let console_filter = if config.verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        env_filter()
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(path) = &log_path {
        tracing::debug!(path = %path.display(), "File logging enabled");
    }
    Ok(log_path)
}

fn open_log_file(app_name: &str) -> Result<RollingLog> {
    let dir = ensure_logs_dir()?;
    RollingLog::open(&dir, app_name, Rollover::default())
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

/// `$PARTWATCH_HOME`, else `~/.partwatch`, else `./.partwatch`.
pub fn partwatch_home() -> PathBuf {
    match std::env::var_os("PARTWATCH_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".partwatch"),
    }
}

pub fn logs_dir() -> PathBuf {
    partwatch_home().join("logs")
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// When to roll the log and how many old files to keep.
#[derive(Debug, Clone, Copy)]
pub struct Rollover {
    pub max_bytes: u64,
    /// Old files kept next to the live one (`name.1.log` is the newest).
    pub keep: usize,
}

impl Default for Rollover {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            keep: 4,
        }
    }
}

/// Append-only log file that rolls over once it would exceed `max_bytes`.
struct RollingLog {
    dir: PathBuf,
    stem: String,
    policy: Rollover,
    file: File,
    written: u64,
}

impl RollingLog {
    fn open(dir: &Path, app_name: &str, policy: Rollover) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stem = file_stem(app_name);
        let live = dir.join(format!("{}.log", stem));
        let file = append_to(&live)?;
        let written = file.metadata()?.len();

        let mut log = Self {
            dir: dir.to_path_buf(),
            stem,
            policy,
            file,
            written,
        };
        if log.written >= log.policy.max_bytes {
            log.roll()?;
        }
        Ok(log)
    }

    fn path(&self) -> PathBuf {
        self.generation(0)
    }

    /// 0 is the live file; 1..=keep are older generations.
    fn generation(&self, n: usize) -> PathBuf {
        if n == 0 {
            self.dir.join(format!("{}.log", self.stem))
        } else {
            self.dir.join(format!("{}.{}.log", self.stem, n))
        }
    }

    fn roll(&mut self) -> io::Result<()> {
        self.file.flush()?;

        for n in (0..self.policy.keep).rev() {
            let from = self.generation(n);
            if from.exists() {
                fs::rename(&from, self.generation(n + 1))?;
            }
        }
        if self.policy.keep == 0 {
            // Nothing to keep: start the live file over.
            self.file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .create(true)
                .open(self.path())?;
        } else {
            self.file = append_to(&self.path())?;
        }
        self.written = 0;
        Ok(())
    }
}

impl Write for RollingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.policy.max_bytes {
            self.roll()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn append_to(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn file_stem(app_name: &str) -> String {
    let stem: String = app_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "partwatch".to_string()
    } else {
        stem
    }
}

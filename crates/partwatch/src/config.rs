//! Configuration for the watcher.
//!
//! Layering: built-in defaults, then an optional TOML file, then the
//! environment (including `.env`), then command-line flags.

use crate::archive::same_directory;
use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SUPABASE_URL_VAR: &str = "SUPABASE_URL";
pub const SUPABASE_KEY_VAR: &str = "SUPABASE_SERVICE_KEY";

/// Where reports are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    Sqlite { path: PathBuf },
    Rest { url: String, api_key: String },
    /// Classify and archive only.
    None,
}

impl StoreConfig {
    pub fn default_sqlite() -> Self {
        StoreConfig::Sqlite {
            path: partwatch_logging::partwatch_home().join("reports.sqlite3"),
        }
    }
}

/// Main configuration for the watcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory polled for new spreadsheets
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// Directory processed files are moved into
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// File extension picked up by the scan, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Sleep between cycles, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Report store. When unset, the environment decides (see [`WatchConfig::resolve_store`]).
    #[serde(default)]
    pub store: Option<StoreConfig>,

    /// Address for the `/ws` notification endpoint. Notifications are off when unset.
    #[serde(default)]
    pub notify_bind: Option<SocketAddr>,
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("Uploads")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("ParsedExcel")
}

fn default_extension() -> String {
    "xlsx".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            archive_dir: default_archive_dir(),
            extension: default_extension(),
            poll_interval_ms: default_poll_interval_ms(),
            store: None,
            notify_bind: None,
        }
    }
}

impl WatchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: WatchConfig =
            toml::from_str(&content).map_err(|e| IngestError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| IngestError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Extension without a leading dot, as matched by the scan.
    pub fn normalized_extension(&self) -> &str {
        self.extension.trim().trim_start_matches('.')
    }

    /// The configured store, or one chosen from the environment: the hosted
    /// store when both Supabase variables are set, local SQLite otherwise.
    pub fn resolve_store<F>(&self, env: F) -> StoreConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(store) = &self.store {
            return store.clone();
        }

        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        match (non_empty(SUPABASE_URL_VAR), non_empty(SUPABASE_KEY_VAR)) {
            (Some(url), Some(api_key)) => StoreConfig::Rest { url, api_key },
            _ => StoreConfig::default_sqlite(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.normalized_extension().is_empty() {
            return Err(IngestError::Config("extension must not be empty".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(IngestError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.watch_dir == self.archive_dir {
            return Err(IngestError::Config(format!(
                "watch_dir and archive_dir must differ (both are {})",
                self.watch_dir.display()
            )));
        }
        if let Some(StoreConfig::Rest { url, .. }) = &self.store {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(IngestError::Config(format!(
                    "rest store url must be http(s): {}",
                    url
                )));
            }
        }
        Ok(())
    }

    /// Create both directories and refuse to run when they are one folder
    /// under two names (`Uploads` and `./Uploads`, an absolute path, a symlink).
    pub fn prepare_dirs(&self) -> Result<()> {
        prepare_dirs(&self.watch_dir, &self.archive_dir)
    }
}

pub(crate) fn prepare_dirs(watch_dir: &Path, archive_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(watch_dir)?;
    std::fs::create_dir_all(archive_dir)?;
    if same_directory(watch_dir, archive_dir)? {
        return Err(IngestError::Config(format!(
            "watch_dir {} and archive_dir {} are the same directory",
            watch_dir.display(),
            archive_dir.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = WatchConfig::default();
        assert_eq!(config.watch_dir, PathBuf::from("Uploads"));
        assert_eq!(config.archive_dir, PathBuf::from("ParsedExcel"));
        assert_eq!(config.extension, "xlsx");
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert!(config.notify_bind.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: WatchConfig = toml::from_str(
            r#"
            watch_dir = "/srv/inbox"
            notify_bind = "127.0.0.1:8000"

            [store]
            kind = "sqlite"
            path = "/srv/reports.sqlite3"
            "#,
        )
        .unwrap();

        assert_eq!(config.watch_dir, PathBuf::from("/srv/inbox"));
        assert_eq!(config.archive_dir, PathBuf::from("ParsedExcel"));
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.notify_bind, Some("127.0.0.1:8000".parse().unwrap()));
        assert_eq!(
            config.store,
            Some(StoreConfig::Sqlite {
                path: PathBuf::from("/srv/reports.sqlite3")
            })
        );
    }

    #[test]
    fn test_config_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("partwatch.toml");
        let config = WatchConfig {
            watch_dir: PathBuf::from("in"),
            archive_dir: PathBuf::from("out"),
            extension: "xlsm".to_string(),
            poll_interval_ms: 500,
            store: Some(StoreConfig::Rest {
                url: "https://example.supabase.co".to_string(),
                api_key: "key".to_string(),
            }),
            notify_bind: None,
        };

        config.save(&path).unwrap();
        let loaded = WatchConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "poll_interval_ms = \"soon\"").unwrap();
        assert!(matches!(
            WatchConfig::load(&path),
            Err(IngestError::Config(_))
        ));
    }

    #[test]
    fn test_store_from_environment() {
        let config = WatchConfig::default();

        let rest = config.resolve_store(env_from(&[
            (SUPABASE_URL_VAR, "https://x.supabase.co"),
            (SUPABASE_KEY_VAR, "secret"),
        ]));
        assert_eq!(
            rest,
            StoreConfig::Rest {
                url: "https://x.supabase.co".to_string(),
                api_key: "secret".to_string()
            }
        );

        let partial = config.resolve_store(env_from(&[(SUPABASE_URL_VAR, "https://x")]));
        assert!(matches!(partial, StoreConfig::Sqlite { .. }));

        let blank = config.resolve_store(env_from(&[
            (SUPABASE_URL_VAR, "https://x"),
            (SUPABASE_KEY_VAR, "  "),
        ]));
        assert!(matches!(blank, StoreConfig::Sqlite { .. }));
    }

    #[test]
    fn test_explicit_store_beats_environment() {
        let config = WatchConfig {
            store: Some(StoreConfig::None),
            ..WatchConfig::default()
        };
        let store = config.resolve_store(env_from(&[
            (SUPABASE_URL_VAR, "https://x"),
            (SUPABASE_KEY_VAR, "k"),
        ]));
        assert_eq!(store, StoreConfig::None);
    }

    #[test]
    fn test_validation() {
        let mut config = WatchConfig {
            extension: ".xlsx".to_string(),
            ..WatchConfig::default()
        };
        assert_eq!(config.normalized_extension(), "xlsx");
        config.validate().unwrap();

        config.extension = ".".to_string();
        assert!(config.validate().is_err());

        config.extension = "xlsx".to_string();
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        config.poll_interval_ms = 10;
        config.archive_dir = config.watch_dir.clone();
        assert!(config.validate().is_err());

        config.archive_dir = PathBuf::from("elsewhere");
        config.store = Some(StoreConfig::Rest {
            url: "ftp://nope".to_string(),
            api_key: "k".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prepare_dirs_creates_both() {
        let temp = TempDir::new().unwrap();
        let config = WatchConfig {
            watch_dir: temp.path().join("Uploads"),
            archive_dir: temp.path().join("ParsedExcel"),
            ..WatchConfig::default()
        };
        config.prepare_dirs().unwrap();
        assert!(config.watch_dir.is_dir());
        assert!(config.archive_dir.is_dir());
    }

    #[test]
    fn test_prepare_dirs_rejects_aliases() {
        // Relative to the working directory so `./x` and `x` both resolve.
        let temp = TempDir::new_in(".").unwrap();
        let name = temp.path().file_name().unwrap();
        let bare = PathBuf::from(name).join("Uploads");
        let dotted = Path::new(".").join(name).join("Uploads");
        std::fs::create_dir_all(&bare).unwrap();
        let absolute = std::fs::canonicalize(&bare).unwrap();

        for (watch_dir, archive_dir) in [
            (bare.clone(), dotted.clone()),
            (bare.clone(), absolute.clone()),
            (absolute.clone(), dotted.join("..").join("Uploads")),
        ] {
            let config = WatchConfig {
                watch_dir,
                archive_dir,
                ..WatchConfig::default()
            };
            // Textually different, so the plain check lets them through.
            config.validate().unwrap();
            assert!(matches!(config.prepare_dirs(), Err(IngestError::Config(_))));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_prepare_dirs_rejects_symlinked_archive() {
        let temp = TempDir::new().unwrap();
        let watch_dir = temp.path().join("Uploads");
        std::fs::create_dir_all(&watch_dir).unwrap();
        let link = temp.path().join("ParsedExcel");
        std::os::unix::fs::symlink(&watch_dir, &link).unwrap();

        let config = WatchConfig {
            watch_dir,
            archive_dir: link,
            ..WatchConfig::default()
        };
        assert!(matches!(config.prepare_dirs(), Err(IngestError::Config(_))));
    }
}

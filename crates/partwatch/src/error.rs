//! Error types for the ingestion pipeline.
//!
//! Each pipeline stage has its own error type so the watch loop can tell a
//! decode failure (retry next cycle) from an archive failure (already
//! persisted) without string matching.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The spreadsheet could not be opened or parsed.
#[derive(Error, Debug)]
#[error("Failed to decode {path}: {message}")]
pub struct DecodeError {
    pub path: PathBuf,
    pub message: String,
}

impl DecodeError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// The report or its part rows could not be stored.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{table} insert rejected with status {status}: {body}")]
    Rejected {
        table: String,
        status: u16,
        body: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// The processed file could not be moved into the archive directory.
#[derive(Error, Debug)]
#[error("Failed to archive {source_path} -> {destination}: {cause}")]
pub struct ArchiveError {
    pub source_path: PathBuf,
    pub destination: PathBuf,
    #[source]
    pub cause: io::Error,
}

/// An event could not be put on the wire. Handled by the transport.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Top-level error for the crate.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IngestError>;

//! Identifier wrappers for partwatch.
//!
//! Report identifiers are `report-{uuid}`. They are drawn from an [`IdSource`]
//! so that callers (and tests) decide how fresh identifiers are produced.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdParseError {
    #[error("invalid {kind}: expected '{prefix}-' prefix in '{value}'")]
    MissingPrefix {
        kind: &'static str,
        prefix: &'static str,
        value: String,
    },

    #[error("invalid {kind}: empty suffix")]
    EmptySuffix { kind: &'static str },
}

macro_rules! define_prefixed_id {
    ($name:ident, $prefix:literal, $label:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Fresh identifier backed by a random v4 UUID.
            pub fn new() -> Self {
                Self(format!("{}-{}", $prefix, Uuid::new_v4()))
            }

            /// Build an identifier from an arbitrary suffix.
            pub fn from_suffix(suffix: impl fmt::Display) -> Self {
                Self(format!("{}-{}", $prefix, suffix))
            }

            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                let suffix = value.strip_prefix(concat!($prefix, "-")).ok_or_else(|| {
                    IdParseError::MissingPrefix {
                        kind: $label,
                        prefix: $prefix,
                        value: value.to_string(),
                    }
                })?;
                if suffix.is_empty() {
                    return Err(IdParseError::EmptySuffix { kind: $label });
                }
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_prefixed_id!(ReportId, "report", "report ID");

/// Identifier for a single flagged part row.
///
/// Composed as `part-{report}-{sheet}-{row}`. The row index is the trailing
/// integer and sheet names are unique within a workbook, so two rows of the
/// same report never share an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(String);

impl PartId {
    pub fn compose(report_id: &ReportId, sheet_name: &str, row_index: usize) -> Self {
        Self(format!("part-{}-{}-{}", report_id, sheet_name, row_index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of fresh report identifiers.
pub trait IdSource: Send + Sync {
    fn next_report_id(&self) -> ReportId;
}

/// Random v4 UUIDs. The production default.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdSource;

impl IdSource for UuidIdSource {
    fn next_report_id(&self) -> ReportId {
        ReportId::new()
    }
}

/// Deterministic counter: `report-0001`, `report-0002`, ...
#[derive(Debug, Default)]
pub struct SequentialIdSource {
    next: AtomicU64,
}

impl SequentialIdSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for SequentialIdSource {
    fn next_report_id(&self) -> ReportId {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        ReportId::from_suffix(format!("{:04}", n))
    }
}

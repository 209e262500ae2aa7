use std::path::PathBuf;
use thiserror::Error;

use crate::log_parser::Field;

/// Errors surfaced by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum BenchError {
    /// I/O failure while reading logs or writing caches.
    #[error("io error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The suite directory does not exist or is not a directory.
    #[error("suite directory '{0}' does not exist")]
    SuiteNotFound(PathBuf),
    /// The suite directory holds no instance with a recognized log file.
    #[error("suite directory '{0}' contains no run logs")]
    EmptySuite(PathBuf),
    /// No domain file next to a problem file matches it.
    #[error("no domain file found for problem '{0}'")]
    DomainNotFound(PathBuf),
    /// A cache file that was asked for is missing.
    #[error("cache file '{0}' not found")]
    CacheNotFound(PathBuf),
    /// The cache blob could not be encoded or decoded.
    #[error("cache error: {0}")]
    Cache(#[from] bincode::Error),
    /// A config or experiment file is not valid JSON for its schema.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
    /// A marker pattern does not compile.
    #[error("invalid marker pattern for {field}: {source}")]
    Regex {
        field: String,
        #[source]
        source: regex::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl BenchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::Io { path: path.into(), source }
    }
}

/// Failure to turn a matched payload into a value. Scoped to a single field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("malformed number '{payload}' for {field:?}")]
    MalformedNumber { field: Field, payload: String },
    #[error("malformed time string '{0}'")]
    MalformedTime(String),
}

/// Why a statistic could not be computed. Rendered as "N/A" by the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StatError {
    /// The partition the statistic ranges over has no records.
    #[error("no records in partition")]
    EmptyPartition,
    /// The partition has records but none carries the value.
    #[error("no values present")]
    NoValues,
    /// Every record of the suite is an encoding error.
    #[error("no applicable instances")]
    NoApplicableInstances,
}

pub type Result<T> = std::result::Result<T, BenchError>;

//! On-disk cache of run records.
//!
//! A cache file is a bincode blob of `Vec<RunRecord>`, written wholesale.
//! There is no locking: two writers on the same path race.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{BenchError, Result};
use crate::locator::{locate_output_files, locate_suites};
use crate::log_parser::LogGrammar;
use crate::record::{build_record, RunRecord};

/// A suite together with the name it was ingested under.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedSuite {
    pub name: String,
    pub records: Vec<RunRecord>,
}

impl NamedSuite {
    /// Names a suite after its cache file stem.
    pub fn from_cache<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(NamedSuite { name, records: read_suite(path)? })
    }
}

/// What an ingestion run produced and what it had to skip.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub records: usize,
    pub skipped_files: usize,
    pub malformed_fields: usize,
    /// Records whose log carried none of the mandatory markers.
    pub unrecognized_logs: usize,
}

impl IngestSummary {
    pub fn warnings(&self) -> usize {
        self.skipped_files + self.malformed_fields + self.unrecognized_logs
    }

    fn absorb(&mut self, other: &IngestSummary) {
        self.records += other.records;
        self.skipped_files += other.skipped_files;
        self.malformed_fields += other.malformed_fields;
        self.unrecognized_logs += other.unrecognized_logs;
    }
}

/// Locates and builds every record of a suite, in locator order.
pub fn collect_suite<P: AsRef<Path>>(suite_dir: P, config: &PipelineConfig) -> Result<(Vec<RunRecord>, IngestSummary)> {
    let suite_dir = suite_dir.as_ref();
    let grammar = LogGrammar::compile(&config.markers)?;
    let locations = locate_output_files(suite_dir, config)?;
    if locations.is_empty() {
        return Err(BenchError::EmptySuite(suite_dir.to_path_buf()));
    }

    let mut summary = IngestSummary::default();
    let mut records = Vec::with_capacity(locations.len());
    for (i, location) in locations.iter().enumerate() {
        tracing::debug!("({}/{}) Compiling information about {}", i + 1, locations.len(), location.domain_desc);
        match build_record(&location.domain_desc, &location.file_path, &grammar) {
            Ok(record) => {
                summary.malformed_fields += record.malformed_fields.len();
                if !record.has_mandatory_markers() {
                    warn!("{}: no known marker in {}", record.domain_desc, record.file_path.display());
                    summary.unrecognized_logs += 1;
                }
                records.push(record);
            }
            Err(err) => {
                warn!("skipping {}: {}", location.domain_desc, err);
                summary.skipped_files += 1;
            }
        }
    }
    summary.records = records.len();
    Ok((records, summary))
}

/// Ingests a suite directory and writes its records to `output_path`.
pub fn write_suite<P: AsRef<Path>, Q: AsRef<Path>>(
    suite_dir: P,
    output_path: Q,
    config: &PipelineConfig,
) -> Result<IngestSummary> {
    let (records, summary) = collect_suite(suite_dir, config)?;
    write_records(&records, output_path.as_ref())?;
    Ok(summary)
}

/// Serializes records to `path`, replacing whatever was there.
pub fn write_records(records: &[RunRecord], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
    }

    info!("Dumping {} records to {}", records.len(), path.display());
    let file = File::create(path).map_err(|e| BenchError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, records)?;
    writer.flush().map_err(|e| BenchError::io(path, e))?;
    Ok(())
}

/// Reads records written by [`write_suite`].
pub fn read_suite<P: AsRef<Path>>(path: P) -> Result<Vec<RunRecord>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(BenchError::CacheNotFound(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| BenchError::io(path, e))?;
    let records = bincode::deserialize_from(BufReader::new(file))?;
    Ok(records)
}

/// Ingests every suite below `parent_dir`, one cache file per suite
/// (`<cache_dir>/<suite>.bin`). Empty suites are skipped with a warning.
pub fn write_suite_set<P: AsRef<Path>, Q: AsRef<Path>>(
    parent_dir: P,
    cache_dir: Q,
    config: &PipelineConfig,
) -> Result<IngestSummary> {
    let cache_dir = cache_dir.as_ref();
    let mut total = IngestSummary::default();

    for (name, suite_dir) in locate_suites(parent_dir)? {
        let output_path = cache_path(cache_dir, &name);
        match write_suite(&suite_dir, &output_path, config) {
            Ok(summary) => total.absorb(&summary),
            Err(BenchError::EmptySuite(dir)) => {
                warn!("skipping empty suite {}", dir.display());
                total.skipped_files += 1;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(total)
}

/// Reads every cache file in `cache_dir`, sorted by suite name.
pub fn read_suite_set<P: AsRef<Path>>(cache_dir: P) -> Result<Vec<NamedSuite>> {
    let cache_dir = cache_dir.as_ref();
    if !cache_dir.is_dir() {
        return Err(BenchError::CacheNotFound(cache_dir.to_path_buf()));
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(cache_dir).map_err(|e| BenchError::io(cache_dir, e))? {
        let path = entry.map_err(|e| BenchError::io(cache_dir, e))?.path();
        if path.is_file() && path.extension().map(|ext| ext == "bin").unwrap_or(false) {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(NamedSuite::from_cache).collect()
}

pub fn cache_path(cache_dir: &Path, suite_name: &str) -> PathBuf {
    cache_dir.join(format!("{}.bin", suite_name))
}

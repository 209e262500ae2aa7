use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, trace, warn};

use crate::config::PipelineConfig;
use crate::error::{BenchError, Result};

/// An instance directory together with the log that was found in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLocation {
    pub domain_desc: String,
    pub file_path: PathBuf,
}

/// Keeps only the alphanumeric characters of an instance name.
pub fn sanitize(name: &str) -> String {
    name.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Sorted immediate subdirectories of `dir`, as `(name, path)`.
fn subdirectories(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Err(BenchError::SuiteNotFound(dir.to_path_buf()));
    }

    let mut folders = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| BenchError::io(dir, e))? {
        let entry = entry.map_err(|e| BenchError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            folders.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    folders.sort();
    Ok(folders)
}

/// Finds the log of every instance in a suite.
///
/// Only the immediate subdirectories of `suite_dir` are inspected. Accepted
/// file names are tried in the order given by the config and the first one
/// present wins. Instances without any accepted file are skipped. The
/// directory name is sanitized into the instance id; two directories with
/// the same id are both kept and reported.
pub fn locate_output_files<P: AsRef<Path>>(suite_dir: P, config: &PipelineConfig) -> Result<Vec<LogLocation>> {
    let suite_dir = suite_dir.as_ref();
    let mut locations = Vec::new();
    let mut seen: FxHashMap<String, String> = FxHashMap::default();

    for (name, folder) in subdirectories(suite_dir)? {
        let found = config
            .log_file_names
            .iter()
            .map(|file_name| folder.join(file_name))
            .find(|candidate| candidate.is_file());

        match found {
            Some(file_path) => {
                let domain_desc = sanitize(&name);
                if let Some(previous) = seen.insert(domain_desc.clone(), name.clone()) {
                    warn!("directories '{}' and '{}' share the instance id {}", previous, name, domain_desc);
                }
                locations.push(LogLocation { domain_desc, file_path });
            }
            None => trace!("no log file in {}", folder.display()),
        }
    }

    info!("Suite {}: found {} run logs", suite_dir.display(), locations.len());
    Ok(locations)
}

/// Lists the suite directories below a parent folder, sorted by name.
pub fn locate_suites<P: AsRef<Path>>(parent_dir: P) -> Result<Vec<(String, PathBuf)>> {
    subdirectories(parent_dir.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_accepted_names_by_priority_and_skips_empty_instances() {
        let suite = tempfile::tempdir().unwrap();
        let a = suite.path().join("gripperprob01pddl");
        let b = suite.path().join("blocksprob02pddl");
        let c = suite.path().join("crashed");
        for dir in [&a, &b, &c] {
            fs::create_dir(dir).unwrap();
        }
        fs::write(a.join("output.txt"), "").unwrap();
        fs::write(a.join("planDD_output.txt"), "").unwrap();
        fs::write(b.join("output.txt"), "").unwrap();
        fs::write(c.join("fd_output.txt"), "").unwrap();
        fs::write(suite.path().join("stray.txt"), "").unwrap();

        let found = locate_output_files(suite.path(), &PipelineConfig::default()).unwrap();
        assert_eq!(
            found,
            vec![
                LogLocation { domain_desc: "blocksprob02pddl".to_string(), file_path: b.join("output.txt") },
                LogLocation { domain_desc: "gripperprob01pddl".to_string(), file_path: a.join("planDD_output.txt") },
            ]
        );
    }

    #[test]
    fn instance_ids_are_sanitized() {
        let suite = tempfile::tempdir().unwrap();
        for name in ["gripper-prob01.pddl", "gripperprob01pddl", "visitall_prob02"] {
            let dir = suite.path().join(name);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("planDD_output.txt"), "").unwrap();
        }

        let found = locate_output_files(suite.path(), &PipelineConfig::default()).unwrap();
        let ids: Vec<&str> = found.iter().map(|l| l.domain_desc.as_str()).collect();
        assert_eq!(ids, vec!["gripperprob01pddl", "gripperprob01pddl", "visitallprob02"]);
        assert!(found.iter().all(|l| l.domain_desc.chars().all(char::is_alphanumeric)));
        assert!(found[0].file_path.starts_with(suite.path().join("gripper-prob01.pddl")));
    }

    #[test]
    fn missing_suite_is_an_error() {
        let err = locate_output_files("/nonexistent/suite", &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, BenchError::SuiteNotFound(_)));
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};
use crate::log_parser::{planner_line, Field, MarkerRule, RegionRule, ScanMode};

/// Options shared by every stage of the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where `ingest-batch` drops one cache blob per suite.
    pub cache_dir: PathBuf,
    /// Accepted log file names inside an instance directory, by priority.
    pub log_file_names: Vec<String>,
    /// Planner timeout in seconds, used by the plot curves.
    pub timeout: f64,
    pub markers: MarkerTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            cache_dir: PathBuf::from("test_output"),
            log_file_names: vec!["planDD_output.txt".to_string(), "output.txt".to_string()],
            timeout: 600.0,
            markers: MarkerTable::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads a config from a JSON file. Keys left out keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        Ok(config)
    }
}

/// The phrases the planners print, as extraction rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerTable {
    pub rules: BTreeMap<Field, MarkerRule>,
    pub config_banner: RegionRule,
    pub engine_stats: RegionRule,
}

impl Default for MarkerTable {
    fn default() -> Self {
        let rules = BTreeMap::from([
            (
                Field::FinishedCnf,
                MarkerRule::new(ScanMode::First, planner_line("info", r"Constructed a total of (?P<value>\S+) clauses")),
            ),
            (
                Field::ConstructedVariables,
                MarkerRule::new(ScanMode::First, planner_line("info", r"Constructed a total of (?P<value>\S+) variables")),
            ),
            (
                Field::Finished,
                MarkerRule::new(ScanMode::First, planner_line("info", r"Finished constructing DD")),
            ),
            (
                Field::EncodingError,
                MarkerRule::new(ScanMode::First, planner_line("error", r"Not a unit cost problem")),
            ),
            (
                Field::ConjoinedClauses,
                MarkerRule::new(ScanMode::Last, planner_line("info", r"Conjoined (?P<value>\S+) clauses")),
            ),
            (
                Field::ConjoinProgress,
                MarkerRule::new(ScanMode::All, planner_line("info", r"Conjoined (?P<value>\S+)% of all clauses")),
            ),
            (
                Field::EngineProgress,
                MarkerRule::new(
                    ScanMode::All,
                    planner_line(
                        r"\w+",
                        r"CUDD stats: #nodes: (?P<nodes>\S+) #peak nodes: (?P<peak_nodes>\S+) #reorderings: (?P<reorderings>\S+) #memory bytes: (?P<memory>\S+)",
                    ),
                ),
            ),
            (
                Field::PlansFound,
                MarkerRule::new(
                    ScanMode::All,
                    planner_line("info", r"Found (?P<new>\S+) new plans in timestep (?P<step>\S+) new total is: (?P<value>\S+)"),
                ),
            ),
            (
                Field::AttemptedPlans,
                MarkerRule::new(ScanMode::All, r"^\[t=(?P<ts>[^s\]\n]*)s[^\]\n]*\] Attempted plans: (?P<value>\S+)M"),
            ),
            (
                Field::ColourClasses,
                MarkerRule::new(ScanMode::First, planner_line("info", r"Num colours: (?P<value>\S+)")),
            ),
        ]);

        MarkerTable {
            rules,
            config_banner: RegionRule {
                start: "Using the following config:".to_string(),
                end: "Start Parsing SAS Problem".to_string(),
                include_end: false,
            },
            engine_stats: RegionRule {
                start: "Printing CUDD statistics...".to_string(),
                end: "Time for reordering:".to_string(),
                include_end: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_covers_every_field() {
        let table = MarkerTable::default();
        for field in Field::ALL {
            assert!(table.rules.contains_key(&field), "no rule for {:?}", field);
        }
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{ "timeout": 300.0 }"#).unwrap();
        assert_eq!(config.timeout, 300.0);
        assert_eq!(config.log_file_names, PipelineConfig::default().log_file_names);
        assert_eq!(config.markers, MarkerTable::default());
    }

    #[test]
    fn marker_table_survives_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = PipelineConfig::load("/nonexistent/plandd.json").unwrap_err();
        assert!(matches!(err, BenchError::Io { .. }));
    }
}

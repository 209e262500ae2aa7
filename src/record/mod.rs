//! Run records and the builder that scrapes them out of planner logs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::error::{BenchError, ParseError, Result};
use crate::log_parser::{capture, capture_time, Field, LogGrammar};

/// Values sampled every time the planner reports conjoin progress.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Log time of each "Conjoined N% of all clauses" line, in seconds.
    pub timesteps: Vec<f64>,
    pub conjoin_percent: Vec<u32>,
    pub nodes: Vec<u64>,
    pub peak_nodes: Vec<u64>,
    pub reorderings: Vec<u64>,
    pub memory: Vec<u64>,
}

/// Cumulative number of plans found at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanCount {
    pub time: f64,
    pub plans: f64,
}

/// Everything scraped from one planner log. `None` means the marker line was
/// not in the log, which is distinct from a legitimate zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub domain_desc: String,
    pub file_path: PathBuf,
    /// Raw configuration banner lines.
    pub config: Vec<String>,
    /// The banner exploded into `key -> value`.
    pub config_values: BTreeMap<String, String>,
    pub has_finished_cnf: bool,
    pub has_finished: bool,
    pub error_while_encoding: bool,
    /// Seconds since planner start at which the DD was finished.
    pub finish_time: Option<f64>,
    pub constructed_clauses: Option<u64>,
    pub constructed_variables: Option<u64>,
    pub conjoined_clauses: Option<u64>,
    pub num_colours: Option<u64>,
    pub progress: Progress,
    pub plan_progress: Vec<PlanCount>,
    /// Raw lines of the decision-diagram backend statistics dump.
    pub engine_stats: Vec<String>,
    /// Fields whose marker matched but whose payload did not parse.
    pub malformed_fields: Vec<Field>,
}

impl RunRecord {
    /// Looks up a configuration value. Both `build_order` and
    /// `config_build_order` name the same entry.
    pub fn config_value(&self, key: &str) -> Option<&str> {
        let key = key.strip_prefix("config_").unwrap_or(key);
        self.config_values.get(key).map(String::as_str)
    }

    pub fn last_conjoin_percent(&self) -> Option<u32> {
        self.progress.conjoin_percent.last().copied()
    }

    pub fn last_nodes(&self) -> Option<u64> {
        self.progress.nodes.last().copied()
    }

    pub fn last_peak_nodes(&self) -> Option<u64> {
        self.progress.peak_nodes.last().copied()
    }

    pub fn last_reorderings(&self) -> Option<u64> {
        self.progress.reorderings.last().copied()
    }

    pub fn last_memory(&self) -> Option<u64> {
        self.progress.memory.last().copied()
    }

    pub fn last_plan_count(&self) -> Option<f64> {
        self.plan_progress.last().map(|p| p.plans)
    }

    /// Scrapes the statistics dump lazily.
    pub fn engine_stats(&self) -> EngineStats<'_> {
        EngineStats { lines: &self.engine_stats }
    }

    /// Share of the finish time spent reordering, in percent.
    pub fn percent_reordering(&self) -> Option<f64> {
        let finish_time = self.finish_time?;
        let reordering_time = self.engine_stats().reordering_time()?;
        if finish_time <= 0.0 {
            return None;
        }
        Some(100.0 * reordering_time / finish_time)
    }

    pub fn conjoined_clause_percent(&self) -> Option<f64> {
        let constructed = self.constructed_clauses?;
        let conjoined = self.conjoined_clauses?;
        if constructed == 0 {
            return None;
        }
        Some(100.0 * conjoined as f64 / constructed as f64)
    }

    /// False when the log carries none of the markers every run prints,
    /// which usually means the log wording changed.
    pub fn has_mandatory_markers(&self) -> bool {
        !self.config.is_empty() || self.has_finished_cnf || self.error_while_encoding || !self.plan_progress.is_empty()
    }
}

/// View over the statistics dump of a record.
pub struct EngineStats<'a> {
    lines: &'a [String],
}

struct StatPatterns {
    peak_nodes: Regex,
    peak_live_nodes: Regex,
    dd_size: Regex,
    reordering_time: Regex,
}

fn stat_patterns() -> &'static StatPatterns {
    static PATTERNS: OnceLock<StatPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| StatPatterns {
        peak_nodes: Regex::new(r"^Peak number of nodes: (\S+)").expect("static pattern"),
        peak_live_nodes: Regex::new(r"^Peak number of live nodes: (\S+)").expect("static pattern"),
        dd_size: Regex::new(r"Number of nodes: ([^,\s]+),").expect("static pattern"),
        reordering_time: Regex::new(r"^Time for reordering: (\S+) sec").expect("static pattern"),
    })
}

impl EngineStats<'_> {
    pub fn peak_nodes(&self) -> Option<u64> {
        self.first(&stat_patterns().peak_nodes)
    }

    pub fn peak_live_nodes(&self) -> Option<u64> {
        self.first(&stat_patterns().peak_live_nodes)
    }

    /// Node count of the final decision diagram.
    pub fn dd_size(&self) -> Option<u64> {
        self.first(&stat_patterns().dd_size)
    }

    pub fn reordering_time(&self) -> Option<f64> {
        self.first(&stat_patterns().reordering_time)
    }

    fn first<T: std::str::FromStr>(&self, pattern: &Regex) -> Option<T> {
        let caps = self.lines.iter().find_map(|line| pattern.captures(line.trim()))?;
        let payload = &caps[1];
        match payload.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                debug!("unparsable statistics payload '{}'", payload);
                None
            }
        }
    }
}

/// Collects per-field parse failures without stopping the build.
struct FieldSink<'a> {
    domain_desc: &'a str,
    malformed: Vec<Field>,
}

impl FieldSink<'_> {
    fn take<T: Default>(&mut self, field: Field, result: std::result::Result<T, ParseError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                self.note(field, &err);
                T::default()
            }
        }
    }

    /// Keeps the rows that parsed. A dropped row takes all of its columns
    /// with it, so series built from the same matches stay aligned.
    fn rows<R>(&mut self, field: Field, rows: Vec<std::result::Result<R, ParseError>>) -> Vec<R> {
        rows.into_iter()
            .filter_map(|row| match row {
                Ok(row) => Some(row),
                Err(err) => {
                    self.note(field, &err);
                    None
                }
            })
            .collect()
    }

    fn note(&mut self, field: Field, err: &ParseError) {
        warn!("{}: {}", self.domain_desc, err);
        if !self.malformed.contains(&field) {
            self.malformed.push(field);
        }
    }
}

fn config_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^>\s*(?P<key>[^=(]+?)\s*(?:\(empty\))?\s*(?:\(default\))?\s*=(?P<value>.*)$").expect("static pattern")
    })
}

/// Splits `> key(default)=value` banner lines. Lines that do not follow the
/// grammar are ignored.
pub fn explode_config(lines: &[String]) -> BTreeMap<String, String> {
    lines
        .iter()
        .filter_map(|line| config_line_pattern().captures(line.trim()))
        .map(|caps| (caps["key"].trim().to_string(), caps["value"].trim().to_string()))
        .collect()
}

/// Reads a log and builds its record. Only I/O failures are errors.
pub fn build_record<P: AsRef<Path>>(domain_desc: &str, file_path: P, grammar: &LogGrammar) -> Result<RunRecord> {
    let file_path = file_path.as_ref();
    let bytes = fs::read(file_path).map_err(|e| BenchError::io(file_path, e))?;
    let content = String::from_utf8_lossy(&bytes);
    Ok(build_record_from_content(domain_desc, file_path, &content, grammar))
}

/// Builds a record from log text. Every field is extracted on its own, a
/// missing or broken field never affects the others.
pub fn build_record_from_content(
    domain_desc: &str,
    file_path: &Path,
    content: &str,
    grammar: &LogGrammar,
) -> RunRecord {
    let mut sink = FieldSink { domain_desc, malformed: Vec::new() };

    let constructed_clauses = sink.take(Field::FinishedCnf, grammar.value(Field::FinishedCnf, "value", content));
    let constructed_variables =
        sink.take(Field::ConstructedVariables, grammar.value(Field::ConstructedVariables, "value", content));
    let finish_time = sink.take(
        Field::Finished,
        grammar.timestamps(Field::Finished, content).map(|ts| ts.first().copied()),
    );
    let conjoined_clauses =
        sink.take(Field::ConjoinedClauses, grammar.value(Field::ConjoinedClauses, "value", content));
    let num_colours = sink.take(Field::ColourClasses, grammar.value(Field::ColourClasses, "value", content));

    let progress = progress(&mut sink, grammar, content);

    let mut plan_progress = plan_counts(&mut sink, grammar, Field::PlansFound, content, 1.0);
    plan_progress.extend(plan_counts(&mut sink, grammar, Field::AttemptedPlans, content, 1_000_000.0));

    let config = grammar.config_banner(content);
    let config_values = explode_config(&config);

    RunRecord {
        domain_desc: domain_desc.to_string(),
        file_path: file_path.to_path_buf(),
        config,
        config_values,
        has_finished_cnf: grammar.flag(Field::FinishedCnf, content),
        has_finished: grammar.flag(Field::Finished, content),
        error_while_encoding: grammar.flag(Field::EncodingError, content),
        finish_time,
        constructed_clauses,
        constructed_variables,
        conjoined_clauses,
        num_colours,
        progress,
        plan_progress,
        engine_stats: grammar.engine_stats(content),
        malformed_fields: sink.malformed,
    }
}

fn progress(sink: &mut FieldSink<'_>, grammar: &LogGrammar, content: &str) -> Progress {
    let conjoin = grammar.rows(Field::ConjoinProgress, content, |caps| {
        Ok((capture_time(caps)?, capture::<u32>(Field::ConjoinProgress, caps, "value")?))
    });
    let (timesteps, conjoin_percent): (Vec<f64>, Vec<u32>) = sink.rows(Field::ConjoinProgress, conjoin).into_iter().unzip();

    let engine = grammar.rows(Field::EngineProgress, content, |caps| {
        let field = Field::EngineProgress;
        Ok([
            capture::<u64>(field, caps, "nodes")?,
            capture(field, caps, "peak_nodes")?,
            capture(field, caps, "reorderings")?,
            capture(field, caps, "memory")?,
        ])
    });
    let engine = sink.rows(Field::EngineProgress, engine);

    Progress {
        timesteps,
        conjoin_percent,
        nodes: engine.iter().map(|row| row[0]).collect(),
        peak_nodes: engine.iter().map(|row| row[1]).collect(),
        reorderings: engine.iter().map(|row| row[2]).collect(),
        memory: engine.iter().map(|row| row[3]).collect(),
    }
}

fn plan_counts(sink: &mut FieldSink<'_>, grammar: &LogGrammar, field: Field, content: &str, scale: f64) -> Vec<PlanCount> {
    let rows = grammar.rows(field, content, |caps| {
        Ok(PlanCount { time: capture_time(caps)?, plans: capture::<f64>(field, caps, "value")? * scale })
    });
    sink.rows(field, rows)
}

//! Declarative log grammar.
//!
//! Every value scraped from a planner log is described by one [`MarkerRule`]:
//! a line-anchored regular expression plus a [`ScanMode`] telling which of the
//! matches count. [`LogGrammar`] compiles the rule table once and serves all
//! extractions through the same routine, so the record builder never touches
//! a regex directly.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::config::MarkerTable;
use crate::error::{BenchError, ParseError};

/// Every extraction target the grammar knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// "Constructed a total of N clauses", marks the end of CNF construction.
    FinishedCnf,
    ConstructedVariables,
    /// "Finished constructing DD", its timestamp is the finish time.
    Finished,
    EncodingError,
    /// Absolute conjoined clause count. Updated monotonically, last match wins.
    ConjoinedClauses,
    /// "Conjoined N% of all clauses" progress lines.
    ConjoinProgress,
    /// Periodic decision-diagram backend counters.
    EngineProgress,
    /// Top-k plan counts printed by planDD.
    PlansFound,
    /// Plan counts printed by symk and kstar, in millions.
    AttemptedPlans,
    ColourClasses,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::FinishedCnf,
        Field::ConstructedVariables,
        Field::Finished,
        Field::EncodingError,
        Field::ConjoinedClauses,
        Field::ConjoinProgress,
        Field::EngineProgress,
        Field::PlansFound,
        Field::AttemptedPlans,
        Field::ColourClasses,
    ];
}

/// Which matches of a rule are meaningful.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    First,
    Last,
    All,
}

/// One row of the marker table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerRule {
    pub mode: ScanMode,
    /// Regex applied in multi-line mode. Named groups: `ts` for the line
    /// timestamp, `value` for the main payload, anything else for auxiliary
    /// payloads.
    pub pattern: String,
}

impl MarkerRule {
    pub fn new(mode: ScanMode, pattern: impl Into<String>) -> Self {
        MarkerRule { mode, pattern: pattern.into() }
    }
}

/// A multi-line block delimited by two literal phrases.
///
/// The block closes at the first `end` line after `start`. A log holding
/// several statistics dumps therefore yields only the first one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionRule {
    pub start: String,
    pub end: String,
    /// Whether the line carrying `end` belongs to the block.
    pub include_end: bool,
}

/// Builds the pattern of a planDD log line: `[timestamp][severity] phrase`.
pub fn planner_line(severity: &str, phrase: &str) -> String {
    format!(r"^\[(?P<ts>[^\]\n]*)\]\[{}\] {}", severity, phrase)
}

struct CompiledRule {
    mode: ScanMode,
    regex: Regex,
}

/// Compiled form of a [`MarkerTable`].
pub struct LogGrammar {
    rules: BTreeMap<Field, CompiledRule>,
    config_banner: RegionRule,
    engine_stats: RegionRule,
}

impl LogGrammar {
    pub fn compile(table: &MarkerTable) -> Result<Self, BenchError> {
        let mut rules = BTreeMap::new();
        for (&field, rule) in &table.rules {
            let pattern = if rule.pattern.starts_with("(?m)") {
                rule.pattern.clone()
            } else {
                format!("(?m){}", rule.pattern)
            };
            let regex = Regex::new(&pattern).map_err(|source| BenchError::Regex {
                field: format!("{:?}", field),
                source,
            })?;
            rules.insert(field, CompiledRule { mode: rule.mode, regex });
        }

        Ok(LogGrammar {
            rules,
            config_banner: table.config_banner.clone(),
            engine_stats: table.engine_stats.clone(),
        })
    }

    /// Applies the rule for `field` to the whole log, honouring its scan mode.
    /// Matches are returned in file order. A field without a rule never matches.
    pub fn scan<'h>(&self, field: Field, content: &'h str) -> Vec<Captures<'h>> {
        let Some(rule) = self.rules.get(&field) else {
            return Vec::new();
        };
        let mut matches = rule.regex.captures_iter(content);
        match rule.mode {
            ScanMode::First => matches.next().into_iter().collect(),
            ScanMode::Last => matches.last().into_iter().collect(),
            ScanMode::All => matches.collect(),
        }
    }

    pub fn flag(&self, field: Field, content: &str) -> bool {
        !self.scan(field, content).is_empty()
    }

    /// Parses `group` of the selected match, `None` when the marker is absent.
    pub fn value<T: FromStr>(&self, field: Field, group: &str, content: &str) -> Result<Option<T>, ParseError> {
        match self.scan(field, content).first() {
            Some(caps) => capture(field, caps, group).map(Some),
            None => Ok(None),
        }
    }

    /// Parses every selected match into one row, in file order. Each row
    /// stands on its own, a malformed match only spoils its own row.
    pub fn rows<R, F>(&self, field: Field, content: &str, parse: F) -> Vec<Result<R, ParseError>>
    where
        F: Fn(&Captures<'_>) -> Result<R, ParseError>,
    {
        self.scan(field, content).iter().map(parse).collect()
    }

    /// Line timestamps (group `ts`) of every selected match, in seconds.
    pub fn timestamps(&self, field: Field, content: &str) -> Result<Vec<f64>, ParseError> {
        self.scan(field, content)
            .iter()
            .map(capture_time)
            .collect()
    }

    pub fn config_banner(&self, content: &str) -> Vec<String> {
        extract_region(&self.config_banner, content)
    }

    pub fn engine_stats(&self, content: &str) -> Vec<String> {
        extract_region(&self.engine_stats, content)
    }
}

/// Parses the named group of a match. A missing group parses as "".
pub fn capture<T: FromStr>(field: Field, caps: &Captures<'_>, group: &str) -> Result<T, ParseError> {
    let payload = caps.name(group).map_or("", |m| m.as_str()).trim();
    payload.parse::<T>().map_err(|_| ParseError::MalformedNumber {
        field,
        payload: payload.to_string(),
    })
}

/// The line timestamp (group `ts`) of a match, in seconds.
pub fn capture_time(caps: &Captures<'_>) -> Result<f64, ParseError> {
    parse_time_string(caps.name("ts").map_or("", |m| m.as_str()))
}

/// Lines strictly after the first line containing `start`, up to the first
/// following line containing `end`. Both delimiters must be present, a block
/// cut off by a truncated log yields nothing.
fn extract_region(rule: &RegionRule, content: &str) -> Vec<String> {
    let mut lines = content.lines();
    if !lines.by_ref().any(|line| line.contains(&rule.start)) {
        return Vec::new();
    }

    let mut block = Vec::new();
    let mut closed = false;
    for line in lines {
        if line.contains(&rule.end) {
            if rule.include_end {
                block.push(line.trim_end().to_string());
            }
            closed = true;
            break;
        }
        block.push(line.trim_end().to_string());
    }
    if !closed {
        return Vec::new();
    }

    while block.first().is_some_and(|l| l.trim().is_empty()) {
        block.remove(0);
    }
    while block.last().is_some_and(|l| l.trim().is_empty()) {
        block.pop();
    }
    block
}

/// Converts `HH:MM:SS[,fraction]` into seconds (`3600*H + 60*M + S`).
///
/// Components fold from the right, so `MM:SS` and plain `SS` (the symk
/// format) are accepted too. Both `,` and `.` work as decimal separator.
pub fn parse_time_string(time_string: &str) -> Result<f64, ParseError> {
    let malformed = || ParseError::MalformedTime(time_string.to_string());

    let parts: Vec<&str> = time_string.trim().split(':').collect();
    if parts.len() > 3 {
        return Err(malformed());
    }

    let mut seconds = 0.0;
    for (part, weight) in parts.iter().rev().zip([1.0, 60.0, 3600.0]) {
        let value: f64 = part.trim().replace(',', ".").parse().map_err(|_| malformed())?;
        if !value.is_finite() {
            return Err(malformed());
        }
        seconds += value * weight;
    }
    Ok(seconds)
}

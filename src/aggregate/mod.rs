//! Statistics over suites of run records.
//!
//! Numeric statistics only ever range over records that actually carry the
//! value. An empty partition, or one where no record has the value, yields a
//! [`StatError`] instead of a number.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::StatError;
use crate::record::RunRecord;
use crate::store::NamedSuite;

pub type Statistic = Result<f64, StatError>;

/// Where a run ended up. Exactly one status applies to every record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// The input is not applicable to the approach (e.g. not unit cost).
    EncodingError,
    /// Stopped before the CNF was complete.
    NotFinishedCnf,
    /// CNF complete, decision diagram never finished.
    NotFinishedDd,
    Solved,
}

impl Status {
    pub fn of(record: &RunRecord) -> Self {
        if record.error_while_encoding {
            Status::EncodingError
        } else if record.has_finished {
            Status::Solved
        } else if !record.has_finished_cnf {
            Status::NotFinishedCnf
        } else {
            Status::NotFinishedDd
        }
    }
}

/// A suite split by [`Status`].
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub encoding_error: Vec<&'a RunRecord>,
    pub not_finished_cnf: Vec<&'a RunRecord>,
    pub not_finished_dd: Vec<&'a RunRecord>,
    pub solved: Vec<&'a RunRecord>,
}

impl<'a> Partition<'a> {
    pub fn of(records: &'a [RunRecord]) -> Self {
        let mut partition = Partition::default();
        for record in records {
            match Status::of(record) {
                Status::EncodingError => partition.encoding_error.push(record),
                Status::NotFinishedCnf => partition.not_finished_cnf.push(record),
                Status::NotFinishedDd => partition.not_finished_dd.push(record),
                Status::Solved => partition.solved.push(record),
            }
        }
        partition
    }

    pub fn total(&self) -> usize {
        self.encoding_error.len() + self.not_finished_cnf.len() + self.not_finished_dd.len() + self.solved.len()
    }

    /// Records that got past CNF construction, solved or not.
    pub fn attempted(&self) -> Vec<&'a RunRecord> {
        self.solved.iter().chain(&self.not_finished_dd).copied().collect()
    }

    /// Solved share in percent. Encoding errors are left out of the
    /// denominator since they are inputs the approach does not apply to.
    pub fn percent_solved(&self) -> Statistic {
        let applicable = self.total() - self.encoding_error.len();
        if applicable == 0 {
            return Err(StatError::NoApplicableInstances);
        }
        Ok(100.0 * self.solved.len() as f64 / applicable as f64)
    }
}

/// Arithmetic mean of `value` over the records that have it.
pub fn mean_of<F>(records: &[&RunRecord], value: F) -> Statistic
where
    F: Fn(&RunRecord) -> Option<f64>,
{
    if records.is_empty() {
        return Err(StatError::EmptyPartition);
    }
    let values: Vec<f64> = records.iter().filter_map(|r| value(r)).collect();
    if values.is_empty() {
        return Err(StatError::NoValues);
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn solved_ids(records: &[RunRecord]) -> BTreeSet<String> {
    records
        .iter()
        .filter(|r| Status::of(r) == Status::Solved)
        .map(|r| r.domain_desc.clone())
        .collect()
}

/// The full report of a single suite.
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteSummary {
    pub total: usize,
    pub encoding_errors: usize,
    pub not_finished_cnf: usize,
    pub not_finished_dd: usize,
    pub solved: usize,
    pub percent_solved: Statistic,
    pub avg_finish_time: Statistic,
    pub avg_percent_reordering: Statistic,
    pub avg_clauses_attempted: Statistic,
    pub avg_variables_attempted: Statistic,
    pub avg_clauses_solved: Statistic,
    pub avg_variables_solved: Statistic,
    pub avg_conjoin_percent: Statistic,
    pub avg_peak_nodes: Statistic,
    pub avg_peak_live_nodes: Statistic,
    pub avg_dd_size: Statistic,
    pub avg_colours: Statistic,
    /// Solved instances with their finish time, sorted by id.
    pub solved_times: Vec<(String, Option<f64>)>,
}

impl SuiteSummary {
    pub fn compute(records: &[RunRecord]) -> Self {
        let partition = Partition::of(records);
        let solved = &partition.solved;
        let attempted = partition.attempted();

        let mut solved_times: Vec<(String, Option<f64>)> =
            solved.iter().map(|r| (r.domain_desc.clone(), r.finish_time)).collect();
        solved_times.sort_by(|a, b| a.0.cmp(&b.0));

        SuiteSummary {
            total: partition.total(),
            encoding_errors: partition.encoding_error.len(),
            not_finished_cnf: partition.not_finished_cnf.len(),
            not_finished_dd: partition.not_finished_dd.len(),
            solved: solved.len(),
            percent_solved: partition.percent_solved(),
            avg_finish_time: mean_of(solved, |r| r.finish_time),
            avg_percent_reordering: mean_of(solved, RunRecord::percent_reordering),
            avg_clauses_attempted: mean_of(&attempted, |r| r.constructed_clauses.map(|v| v as f64)),
            avg_variables_attempted: mean_of(&attempted, |r| r.constructed_variables.map(|v| v as f64)),
            avg_clauses_solved: mean_of(solved, |r| r.constructed_clauses.map(|v| v as f64)),
            avg_variables_solved: mean_of(solved, |r| r.constructed_variables.map(|v| v as f64)),
            avg_conjoin_percent: mean_of(&attempted, |r| r.last_conjoin_percent().map(f64::from)),
            avg_peak_nodes: mean_of(solved, |r| r.engine_stats().peak_nodes().map(|v| v as f64)),
            avg_peak_live_nodes: mean_of(solved, |r| r.engine_stats().peak_live_nodes().map(|v| v as f64)),
            avg_dd_size: mean_of(solved, |r| r.engine_stats().dd_size().map(|v| v as f64)),
            avg_colours: mean_of(solved, |r| r.num_colours.map(|v| v as f64)),
            solved_times,
        }
    }
}

/// One line of a multi-suite comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub suite: String,
    /// `key: value` pairs of the config keys the suites differ in.
    pub label: String,
    pub solved: usize,
    pub avg_finish_time: Statistic,
    pub avg_peak_nodes: Statistic,
    pub avg_peak_live_nodes: Statistic,
    pub avg_dd_size: Statistic,
    pub example_path: Option<PathBuf>,
}

fn strip_config_prefix(key: &str) -> &str {
    key.strip_prefix("config_").unwrap_or(key)
}

/// The value a suite was run with, read from its first record carrying the key.
fn suite_config_value<'a>(records: &'a [RunRecord], key: &str) -> Option<&'a str> {
    records.iter().find_map(|r| r.config_value(key))
}

/// Config keys whose value is not the same across all suites.
pub fn differing_config_keys(suites: &[NamedSuite]) -> Vec<String> {
    let all_keys: BTreeSet<&str> = suites
        .iter()
        .flat_map(|s| s.records.iter().flat_map(|r| r.config_values.keys().map(String::as_str)))
        .collect();

    all_keys
        .into_iter()
        .filter(|key| {
            let values: FxHashSet<Option<&str>> =
                suites.iter().map(|s| suite_config_value(&s.records, key)).collect();
            values.len() > 1
        })
        .map(str::to_string)
        .collect()
}

/// Summarizes each suite under a label built from `keys`, sorted ascending by
/// number solved so the strongest configuration comes last.
pub fn compare_suites(suites: &[NamedSuite], keys: &[String]) -> Vec<ComparisonRow> {
    let mut rows: Vec<ComparisonRow> = suites
        .iter()
        .map(|suite| {
            let label = keys
                .iter()
                .map(|key| {
                    let value = suite_config_value(&suite.records, key).unwrap_or("-");
                    format!("{}: {}", strip_config_prefix(key), value)
                })
                .collect::<Vec<_>>()
                .join(" ");

            let partition = Partition::of(&suite.records);
            let solved = &partition.solved;
            ComparisonRow {
                suite: suite.name.clone(),
                label,
                solved: solved.len(),
                avg_finish_time: mean_of(solved, |r| r.finish_time),
                avg_peak_nodes: mean_of(solved, |r| r.engine_stats().peak_nodes().map(|v| v as f64)),
                avg_peak_live_nodes: mean_of(solved, |r| r.engine_stats().peak_live_nodes().map(|v| v as f64)),
                avg_dd_size: mean_of(solved, |r| r.engine_stats().dd_size().map(|v| v as f64)),
                example_path: suite.records.first().map(|r| r.file_path.clone()),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.solved
            .cmp(&b.solved)
            .then_with(|| a.example_path.cmp(&b.example_path))
            .then_with(|| a.suite.cmp(&b.suite))
    });
    rows
}

/// The `n` strongest rows, best first.
pub fn best_candidates(rows: &[ComparisonRow], n: usize) -> Vec<&ComparisonRow> {
    rows.iter().rev().take(n).collect()
}

/// Instances solved by exactly one of two suites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveDifference {
    pub only_a: BTreeSet<String>,
    pub only_b: BTreeSet<String>,
}

pub fn solve_difference(a: &[RunRecord], b: &[RunRecord]) -> SolveDifference {
    let solved_a = solved_ids(a);
    let solved_b = solved_ids(b);
    SolveDifference {
        only_a: solved_a.difference(&solved_b).cloned().collect(),
        only_b: solved_b.difference(&solved_a).cloned().collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioStep {
    pub suite: String,
    pub solved: usize,
    /// Size of the union of solved instances up to and including this suite.
    pub cumulative: usize,
    /// Instances no earlier suite solved.
    pub newly_solved: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Portfolio {
    pub steps: Vec<PortfolioStep>,
    pub solved: BTreeSet<String>,
}

/// Runs the suites as a fallback chain in the given order and reports what
/// each one adds on top of the ones before it.
pub fn portfolio(suites: &[NamedSuite]) -> Portfolio {
    let mut covered: FxHashSet<String> = FxHashSet::default();
    let mut steps = Vec::with_capacity(suites.len());

    for suite in suites {
        let solved = solved_ids(&suite.records);
        let before = covered.len();
        covered.extend(solved.iter().cloned());
        steps.push(PortfolioStep {
            suite: suite.name.clone(),
            solved: solved.len(),
            cumulative: covered.len(),
            newly_solved: covered.len() - before,
        });
    }

    Portfolio { steps, solved: covered.into_iter().collect() }
}

/// Cactus curve: solved finish times within `timeout`, sorted, against the
/// running count of solved instances.
pub fn cactus_points(records: &[RunRecord], timeout: f64) -> Vec<(f64, usize)> {
    let mut times: Vec<f64> = Partition::of(records)
        .solved
        .iter()
        .filter_map(|r| r.finish_time)
        .filter(|&t| t >= 0.0 && t <= timeout)
        .collect();
    times.sort_by(f64::total_cmp);
    times.into_iter().enumerate().map(|(i, t)| (t, i + 1)).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScatterPoint {
    pub domain_desc: String,
    pub time_a: f64,
    pub time_b: f64,
}

/// Pairs instances present in both suites by id. Unsolved runs or runs over
/// the timeout are drawn at `1.2 * timeout`.
pub fn scatter_points(a: &[RunRecord], b: &[RunRecord], timeout: f64) -> Vec<ScatterPoint> {
    let by_id: FxHashMap<&str, &RunRecord> = a.iter().map(|r| (r.domain_desc.as_str(), r)).collect();
    let penalized = |record: &RunRecord| match record.finish_time {
        Some(t) if Status::of(record) == Status::Solved && t > 0.0 && t <= timeout => t,
        _ => timeout * 1.2,
    };

    b.iter()
        .filter_map(|record_b| {
            let record_a = by_id.get(record_b.domain_desc.as_str())?;
            Some(ScatterPoint {
                domain_desc: record_b.domain_desc.clone(),
                time_a: penalized(record_a),
                time_b: penalized(record_b),
            })
        })
        .collect()
}

/// Number of instances that found at least k plans within `timebound`, as a
/// step curve over k. Plan counts are capped at `cap`.
pub fn k_to_solved(records: &[RunRecord], timebound: f64, cap: f64) -> Vec<(f64, usize)> {
    let mut max_ks: Vec<f64> = records
        .iter()
        .map(|r| {
            r.plan_progress
                .iter()
                .filter(|p| p.time < timebound)
                .map(|p| p.plans)
                .fold(0.0, f64::max)
                .min(cap)
        })
        .collect();
    max_ks.sort_by(f64::total_cmp);

    let n = max_ks.len();
    let mut points: Vec<(f64, usize)> = max_ks.into_iter().enumerate().map(|(i, k)| (k, n - i)).collect();
    points.push((0.0, n));
    points.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(&a.1)));
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PlanCount, Progress};
    use std::collections::BTreeMap;

    fn record(id: &str) -> RunRecord {
        RunRecord {
            domain_desc: id.to_string(),
            file_path: PathBuf::from(format!("suite/{}/planDD_output.txt", id)),
            config: Vec::new(),
            config_values: BTreeMap::new(),
            has_finished_cnf: false,
            has_finished: false,
            error_while_encoding: false,
            finish_time: None,
            constructed_clauses: None,
            constructed_variables: None,
            conjoined_clauses: None,
            num_colours: None,
            progress: Progress::default(),
            plan_progress: Vec::new(),
            engine_stats: Vec::new(),
            malformed_fields: Vec::new(),
        }
    }

    fn solved(id: &str, time: f64) -> RunRecord {
        RunRecord {
            has_finished_cnf: true,
            has_finished: true,
            finish_time: Some(time),
            ..record(id)
        }
    }

    fn encoding_error(id: &str) -> RunRecord {
        RunRecord { error_while_encoding: true, ..record(id) }
    }

    fn stuck_in_dd(id: &str) -> RunRecord {
        RunRecord { has_finished_cnf: true, ..record(id) }
    }

    fn suite(name: &str, records: Vec<RunRecord>) -> NamedSuite {
        NamedSuite { name: name.to_string(), records }
    }

    fn mixed_suite() -> Vec<RunRecord> {
        let mut records = vec![encoding_error("e1"), encoding_error("e2")];
        for i in 0..5 {
            records.push(solved(&format!("s{}", i), 10.0 * (i + 1) as f64));
        }
        records.push(record("c1"));
        records.push(stuck_in_dd("d1"));
        records.push(stuck_in_dd("d2"));
        records
    }

    #[test]
    fn partitions_are_exhaustive_and_disjoint() {
        let records = mixed_suite();
        let partition = Partition::of(&records);
        assert_eq!(partition.encoding_error.len(), 2);
        assert_eq!(partition.not_finished_cnf.len(), 1);
        assert_eq!(partition.not_finished_dd.len(), 2);
        assert_eq!(partition.solved.len(), 5);
        assert_eq!(partition.total(), records.len());

        let empty = Partition::of(&[]);
        assert_eq!(empty.total(), 0);
    }

    #[test]
    fn encoding_error_wins_over_finished() {
        let r = RunRecord { error_while_encoding: true, ..solved("x", 1.0) };
        assert_eq!(Status::of(&r), Status::EncodingError);
    }

    #[test]
    fn percent_solved_leaves_errors_out() {
        let summary = SuiteSummary::compute(&mixed_suite());
        assert_eq!(summary.total, 10);
        assert_eq!(summary.percent_solved, Ok(62.5));
        assert_eq!(summary.avg_finish_time, Ok(30.0));
    }

    #[test]
    fn empty_suite_statistics_are_errors_not_nan() {
        let summary = SuiteSummary::compute(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.percent_solved, Err(StatError::NoApplicableInstances));
        assert_eq!(summary.avg_finish_time, Err(StatError::EmptyPartition));
        assert_eq!(summary.avg_peak_nodes, Err(StatError::EmptyPartition));
    }

    #[test]
    fn missing_values_never_enter_a_mean() {
        let mut with_stats = solved("a", 4.0);
        with_stats.engine_stats = vec!["Peak number of nodes: 100".to_string()];
        let records = vec![with_stats, solved("b", 8.0)];
        let summary = SuiteSummary::compute(&records);
        assert_eq!(summary.avg_peak_nodes, Ok(100.0));
        assert_eq!(summary.avg_dd_size, Err(StatError::NoValues));
        assert_eq!(summary.avg_finish_time, Ok(6.0));
    }

    #[test]
    fn solve_difference_is_symmetric() {
        let a = vec![solved("p1", 1.0), solved("p2", 1.0), solved("p3", 1.0)];
        let b = vec![solved("p2", 1.0), solved("p3", 1.0), solved("p4", 1.0), stuck_in_dd("p1")];
        let diff = solve_difference(&a, &b);
        assert_eq!(diff.only_a, BTreeSet::from(["p1".to_string()]));
        assert_eq!(diff.only_b, BTreeSet::from(["p4".to_string()]));
    }

    #[test]
    fn portfolio_marginals_add_up() {
        let suites = vec![
            suite("a", vec![solved("p1", 1.0), solved("p2", 1.0), record("p3")]),
            suite("b", vec![solved("p2", 1.0), solved("p3", 1.0)]),
            suite("c", vec![solved("p1", 1.0)]),
        ];
        let result = portfolio(&suites);

        assert_eq!(result.steps[0].newly_solved, result.steps[0].solved);
        assert_eq!(
            result.steps.iter().map(|s| s.newly_solved).collect::<Vec<_>>(),
            vec![2, 1, 0]
        );
        let marginal_sum: usize = result.steps.iter().map(|s| s.newly_solved).sum();
        assert_eq!(marginal_sum, result.solved.len());
        assert_eq!(result.steps.last().unwrap().cumulative, 3);
    }

    #[test]
    fn comparison_is_sorted_by_solved_and_labelled_by_config() {
        let with_order = |id: &str, order: &str, finished: bool| {
            let mut r = if finished { solved(id, 2.0) } else { record(id) };
            r.config_values.insert("build_order".to_string(), order.to_string());
            r.config_values.insert("timesteps".to_string(), "13".to_string());
            r
        };
        let suites = vec![
            suite("strong", vec![with_order("p1", "igx:", true), with_order("p2", "igx:", true)]),
            suite("weak", vec![with_order("p1", "xgi:", true), with_order("p2", "xgi:", false)]),
        ];

        let keys = differing_config_keys(&suites);
        assert_eq!(keys, vec!["build_order".to_string()]);

        let rows = compare_suites(&suites, &["config_build_order".to_string()]);
        assert_eq!(rows[0].suite, "weak");
        assert_eq!(rows[0].label, "build_order: xgi:");
        assert_eq!(rows[1].solved, 2);
        assert_eq!(best_candidates(&rows, 1)[0].suite, "strong");
    }

    #[test]
    fn cactus_points_count_up_within_timeout() {
        let records = vec![solved("a", 5.0), solved("b", 1.0), solved("c", 700.0), record("d")];
        assert_eq!(cactus_points(&records, 600.0), vec![(1.0, 1), (5.0, 2)]);
    }

    #[test]
    fn scatter_penalizes_unsolved_runs() {
        let a = vec![solved("p1", 3.0), record("p2")];
        let b = vec![solved("p2", 4.0), solved("p1", 5.0), solved("p9", 1.0)];
        let points = scatter_points(&a, &b, 100.0);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], ScatterPoint { domain_desc: "p2".to_string(), time_a: 120.0, time_b: 4.0 });
        assert_eq!(points[1], ScatterPoint { domain_desc: "p1".to_string(), time_a: 3.0, time_b: 5.0 });
    }

    #[test]
    fn k_to_solved_counts_instances_reaching_k() {
        let mut a = record("a");
        a.plan_progress = vec![PlanCount { time: 1.0, plans: 10.0 }, PlanCount { time: 50.0, plans: 1000.0 }];
        let mut b = record("b");
        b.plan_progress = vec![PlanCount { time: 2.0, plans: 100.0 }];
        let c = record("c");

        let points = k_to_solved(&[a, b, c], 10.0, 1e7);
        assert_eq!(points, vec![(0.0, 3), (0.0, 3), (10.0, 2), (100.0, 1)]);
    }
}

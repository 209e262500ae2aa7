use std::fs;
use std::path::Path;

use plandd_benchmark_rs::aggregate::{portfolio, solve_difference, Partition, SuiteSummary};
use plandd_benchmark_rs::config::PipelineConfig;
use plandd_benchmark_rs::error::BenchError;
use plandd_benchmark_rs::locator::locate_output_files;
use plandd_benchmark_rs::log_parser::LogGrammar;
use plandd_benchmark_rs::record::build_record;
use plandd_benchmark_rs::store::{read_suite, read_suite_set, write_suite, write_suite_set};

const SOLVED: &str = "\
Using the following config:
> build_order(default)=igrtyumpecx:
> timesteps=13
[00:00:00.000100][info] Start Parsing SAS Problem
[00:00:00.200000][info] Constructed a total of 120 clauses
[00:00:00.200100][info] Constructed a total of 40 variables (with helper)
[00:00:01.000000][info] Conjoined 100% of all clauses
[00:00:01.000001][info] Conjoined 120 clauses
[00:00:02.250000][info] Finished constructing DD
";

const TRUNCATED: &str = "\
[00:00:00.100000][info] Constructed a total of 500 clauses
[00:00:02][info] Conjoined 30% of all clauses
[00:00:05][info] Conjoined 70% of all clauses
";

const NOT_UNIT_COST: &str = "[00:00:00.010000][error] Not a unit cost problem\n";

fn add_instance(suite: &Path, id: &str, file_name: &str, log: &str) {
    let dir = suite.join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(file_name), log).unwrap();
}

#[test]
fn cache_round_trip_matches_fresh_build() {
    let suite = tempfile::tempdir().unwrap();
    add_instance(suite.path(), "gripperprob01pddl", "planDD_output.txt", SOLVED);
    add_instance(suite.path(), "gripperprob02pddl", "output.txt", TRUNCATED);
    add_instance(suite.path(), "visitallprob01pddl", "planDD_output.txt", NOT_UNIT_COST);
    add_instance(suite.path(), "blocksprob01pddl", "planDD_output.txt", "segfault\n");
    fs::create_dir(suite.path().join("never_started")).unwrap();

    let config = PipelineConfig::default();
    let out = tempfile::tempdir().unwrap();
    let cache = out.path().join("suite.bin");
    let summary = write_suite(suite.path(), &cache, &config).unwrap();
    assert_eq!(summary.records, 4);
    assert_eq!(summary.unrecognized_logs, 1);

    let grammar = LogGrammar::compile(&config.markers).unwrap();
    let fresh: Vec<_> = locate_output_files(suite.path(), &config)
        .unwrap()
        .iter()
        .map(|loc| build_record(&loc.domain_desc, &loc.file_path, &grammar).unwrap())
        .collect();
    assert_eq!(read_suite(&cache).unwrap(), fresh);

    let summary = SuiteSummary::compute(&fresh);
    assert_eq!(summary.total, 4);
    assert_eq!(summary.solved, 1);
    assert_eq!(summary.encoding_errors, 1);
    assert_eq!(summary.not_finished_dd, 1);
    assert_eq!(summary.not_finished_cnf, 1);
    assert_eq!(summary.avg_finish_time, Ok(2.25));
}

#[test]
fn truncated_and_markerless_logs_survive_ingestion() {
    let suite = tempfile::tempdir().unwrap();
    add_instance(suite.path(), "a", "planDD_output.txt", TRUNCATED);
    add_instance(suite.path(), "b", "planDD_output.txt", "");

    let out = tempfile::tempdir().unwrap();
    let cache = out.path().join("s.bin");
    write_suite(suite.path(), &cache, &PipelineConfig::default()).unwrap();
    let records = read_suite(&cache).unwrap();

    let truncated = &records[0];
    assert!(!truncated.has_finished);
    assert_eq!(truncated.progress.conjoin_percent, vec![30, 70]);
    assert_eq!(truncated.last_conjoin_percent(), Some(70));
    assert_eq!(truncated.finish_time, None);

    let empty = &records[1];
    assert!(!empty.has_finished_cnf && !empty.has_finished && !empty.error_while_encoding);
    assert_eq!(empty.constructed_clauses, None);
    assert_eq!(empty.finish_time, None);

    let partition = Partition::of(&records);
    assert_eq!(partition.total(), records.len());
}

#[test]
fn batch_ingestion_feeds_multi_suite_analysis() {
    let parent = tempfile::tempdir().unwrap();
    for (suite, solved) in [("bdd", ["p1", "p2", "p3"]), ("sdd", ["p2", "p3", "p4"])] {
        for id in ["p1", "p2", "p3", "p4"] {
            let log = if solved.contains(&id) { SOLVED } else { TRUNCATED };
            add_instance(&parent.path().join(suite), id, "planDD_output.txt", log);
        }
    }
    fs::create_dir(parent.path().join("empty_suite")).unwrap();

    let cache_dir = tempfile::tempdir().unwrap();
    let summary = write_suite_set(parent.path(), cache_dir.path(), &PipelineConfig::default()).unwrap();
    assert_eq!(summary.records, 8);

    let suites = read_suite_set(cache_dir.path()).unwrap();
    let names: Vec<&str> = suites.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["bdd", "sdd"]);

    let diff = solve_difference(&suites[0].records, &suites[1].records);
    assert_eq!(diff.only_a.iter().collect::<Vec<_>>(), vec!["p1"]);
    assert_eq!(diff.only_b.iter().collect::<Vec<_>>(), vec!["p4"]);

    let result = portfolio(&suites);
    assert_eq!(result.steps[0].newly_solved, 3);
    assert_eq!(result.steps[1].newly_solved, 1);
    assert_eq!(result.solved.len(), 4);
}

#[test]
fn missing_suite_directory_is_reported() {
    let out = tempfile::tempdir().unwrap();
    let err = write_suite("/nonexistent/suite", out.path().join("x.bin"), &PipelineConfig::default()).unwrap_err();
    assert!(matches!(err, BenchError::SuiteNotFound(_)));
}

#[test]
fn suites_with_raw_directory_names_join_on_sanitized_ids() {
    let planner = tempfile::tempdir().unwrap();
    add_instance(planner.path(), "gripperprob01pddl", "planDD_output.txt", SOLVED);
    let competitor = tempfile::tempdir().unwrap();
    add_instance(competitor.path(), "gripper-prob01.pddl", "output.txt", SOLVED);

    let out = tempfile::tempdir().unwrap();
    let config = PipelineConfig::default();
    write_suite(planner.path(), out.path().join("plandd.bin"), &config).unwrap();
    write_suite(competitor.path(), out.path().join("symk.bin"), &config).unwrap();

    let a = read_suite(out.path().join("plandd.bin")).unwrap();
    let b = read_suite(out.path().join("symk.bin")).unwrap();
    assert_eq!(b[0].domain_desc, "gripperprob01pddl");
    let diff = solve_difference(&a, &b);
    assert!(diff.only_a.is_empty() && diff.only_b.is_empty());
}

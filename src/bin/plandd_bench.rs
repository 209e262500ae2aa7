//! plandd_bench
//!
//! Turns planDD benchmark output directories into cached run records and
//! reports on them.
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use plandd_benchmark_rs::aggregate::{
    best_candidates, compare_suites, differing_config_keys, portfolio, solve_difference, SuiteSummary,
};
use plandd_benchmark_rs::command::{write_parallel_file, ExperimentPlan};
use plandd_benchmark_rs::config::PipelineConfig;
use plandd_benchmark_rs::error::BenchError;
use plandd_benchmark_rs::report;
use plandd_benchmark_rs::store::{cache_path, write_suite, write_suite_set, IngestSummary, NamedSuite};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON pipeline config, defaults apply to every key left out
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse every run log of a suite directory into a cache file
    Ingest { suite_dir: PathBuf, cache_file: PathBuf },
    /// Ingest every suite below a directory, one cache file per suite
    IngestBatch { parent_dir: PathBuf, cache_dir: Option<PathBuf> },
    /// Print a summary table per cache file
    Report {
        #[arg(required = true)]
        caches: Vec<PathBuf>,
        /// Also list the solved instances
        #[arg(long)]
        solved: bool,
    },
    /// Compare suites side by side, weakest first
    Compare {
        #[arg(required = true)]
        caches: Vec<PathBuf>,
        /// Config keys to label suites by, defaults to the keys that differ
        #[arg(long, value_delimiter = ',')]
        by: Vec<String>,
        /// Number of best candidates to list
        #[arg(long, default_value_t = 5)]
        best: usize,
    },
    /// Instances solved by exactly one of two suites
    Diff { cache_a: PathBuf, cache_b: PathBuf },
    /// Treat the suites as a fallback chain in the given order
    Portfolio {
        #[arg(required = true)]
        caches: Vec<PathBuf>,
    },
    /// Write plot data for pgfplots
    Plot {
        kind: PlotKind,
        #[arg(required = true)]
        caches: Vec<PathBuf>,
        /// Overrides the timeout of the config
        #[arg(long)]
        timeout: Option<f64>,
        /// Time bound for k-solved curves
        #[arg(long, default_value_t = 300.0)]
        timebound: f64,
        /// Largest plan count for k-solved curves
        #[arg(long, default_value_t = 1e7)]
        cap: f64,
        /// Instance whose progress series to write
        #[arg(long)]
        instance: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate the command file for an experiment
    Commands {
        experiment: PathBuf,
        #[arg(long, default_value = "all_commands.txt")]
        out: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PlotKind {
    Cactus,
    Scatter,
    Progress,
    KSolved,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Bench(#[from] BenchError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Bench(BenchError::CacheNotFound(_)) => 2,
            CliError::Bench(BenchError::SuiteNotFound(_) | BenchError::EmptySuite(_)) => 3,
            _ => 1,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    match args.command {
        Command::Ingest { suite_dir, cache_file } => {
            let summary = write_suite(&suite_dir, &cache_file, &config)?;
            finish_ingest(&summary);
        }
        Command::IngestBatch { parent_dir, cache_dir } => {
            let cache_dir = cache_dir.unwrap_or_else(|| config.cache_dir.clone());
            let summary = write_suite_set(&parent_dir, &cache_dir, &config)?;
            finish_ingest(&summary);
        }
        Command::Report { caches, solved } => {
            for suite in load_suites(&config, &caches)? {
                let summary = SuiteSummary::compute(&suite.records);
                report::print_suite_summary(&suite.name, &summary, solved);
            }
        }
        Command::Compare { caches, by, best } => {
            let suites = load_suites(&config, &caches)?;
            let keys = if by.is_empty() { differing_config_keys(&suites) } else { by };
            info!("Comparing {} suites by {:?}", suites.len(), keys);
            let rows = compare_suites(&suites, &keys);
            report::print_comparison(&rows, &best_candidates(&rows, best));
        }
        Command::Diff { cache_a, cache_b } => {
            let a = NamedSuite::from_cache(resolve_cache(&config, &cache_a))?;
            let b = NamedSuite::from_cache(resolve_cache(&config, &cache_b))?;
            report::print_solve_difference(&a.name, &b.name, &solve_difference(&a.records, &b.records));
        }
        Command::Portfolio { caches } => {
            let suites = load_suites(&config, &caches)?;
            report::print_portfolio(&portfolio(&suites));
        }
        Command::Plot { kind, caches, timeout, timebound, cap, instance, out } => {
            let suites = load_suites(&config, &caches)?;
            let timeout = timeout.unwrap_or(config.timeout);
            let mut writer = open_output(out.as_deref())?;
            write_plot(&mut writer, kind, &suites, timeout, timebound, cap, instance.as_deref())?;
            writer.flush()?;
        }
        Command::Commands { experiment, out } => {
            let plan = ExperimentPlan::load(&experiment)?;
            let calls = plan.command_calls()?;
            write_parallel_file(&calls, &out)?;
            println!("Run with: parallel --jobs <N> :::: {}", out.display());
        }
    }
    Ok(())
}

fn finish_ingest(summary: &IngestSummary) {
    info!("Ingested {} records", summary.records);
    if summary.warnings() > 0 {
        warn!(
            "{} warnings: {} skipped files, {} malformed fields, {} logs without markers",
            summary.warnings(),
            summary.skipped_files,
            summary.malformed_fields,
            summary.unrecognized_logs
        );
    }
    println!("{} records, {} warnings", summary.records, summary.warnings());
}

/// A bare suite name that is not a file resolves to `<cache_dir>/<name>.bin`.
fn resolve_cache(config: &PipelineConfig, cache: &Path) -> PathBuf {
    let bare = cache.components().count() == 1 && cache.extension().is_none();
    match cache.to_str() {
        Some(name) if bare && !cache.exists() => cache_path(&config.cache_dir, name),
        _ => cache.to_path_buf(),
    }
}

fn load_suites(config: &PipelineConfig, caches: &[PathBuf]) -> Result<Vec<NamedSuite>, BenchError> {
    caches.iter().map(|cache| NamedSuite::from_cache(resolve_cache(config, cache))).collect()
}

fn open_output(out: Option<&Path>) -> Result<Box<dyn Write>, BenchError> {
    match out {
        Some(path) => {
            let file = File::create(path).map_err(|e| BenchError::Io { path: path.to_path_buf(), source: e })?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn write_plot<W: Write>(
    out: &mut W,
    kind: PlotKind,
    suites: &[NamedSuite],
    timeout: f64,
    timebound: f64,
    cap: f64,
    instance: Option<&str>,
) -> Result<(), CliError> {
    match kind {
        PlotKind::Cactus => report::write_cactus(out, suites, timeout)?,
        PlotKind::Scatter => match suites {
            [a, b] => report::write_scatter(out, a, b, timeout)?,
            _ => return Err(CliError::Usage("scatter needs exactly two cache files".to_string())),
        },
        PlotKind::Progress => {
            let id = instance.ok_or_else(|| CliError::Usage("progress needs --instance".to_string()))?;
            let mut found = false;
            for record in suites.iter().flat_map(|s| &s.records).filter(|r| r.domain_desc == id) {
                report::write_progress(out, record)?;
                found = true;
            }
            if !found {
                return Err(CliError::Usage(format!("no run of instance {}", id)));
            }
        }
        PlotKind::KSolved => report::write_k_solved(out, suites, timebound, cap)?,
    }
    Ok(())
}


//! Builds the shell command lines that run the planners.
//!
//! Output is a plain text file with one command per line, meant for
//! `parallel --jobs N :::: all_commands.txt`. Flags are opaque strings here,
//! nothing checks what they mean.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{BenchError, Result};
use crate::locator::sanitize;

pub const DEFAULT_PLANNER_TEMPLATE: &str = "timeout $timeout ../../planDD/build/planDD --sas_file output.sas --$mode --timesteps $timesteps --build_order $build_order $addition_flags > planDD_output.txt";
pub const DEFAULT_TRANSLATOR_TEMPLATE: &str = "../../downward/fast-downward.py --sas-file output.sas --translate-time-limit $downward_timeout --translate $problem_path > fd_output.txt";

/// Filled in from the problem whenever a template mentions them.
pub const PROBLEM_PATH_KEY: &str = "$problem_path";
pub const DOMAIN_PATH_KEY: &str = "$domain_path";

/// A command line with `$name` placeholders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(pub String);

impl CommandTemplate {
    /// Replaces the first occurrence of every key. A key the template does
    /// not contain is reported and otherwise ignored.
    pub fn apply_arguments(&self, arguments: &BTreeMap<String, String>) -> String {
        let mut command = self.0.clone();
        for (key, value) in arguments {
            if !command.contains(key.as_str()) {
                warn!("can't replace key {} in '{}'", key, command);
            }
            command = command.replacen(key.as_str(), value, 1);
        }
        command
    }

    fn mentions(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

/// A planning problem of a benchmark domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub domain: String,
    pub problem: String,
    pub path: PathBuf,
    /// Domain file to plan with, looked up next to `path` when absent.
    #[serde(default)]
    pub domain_path: Option<PathBuf>,
}

impl Problem {
    /// Identifier of the problem's output directory and of its run record.
    pub fn domain_desc(&self) -> String {
        sanitized_domain_desc(&self.domain, &self.problem)
    }

    pub fn resolve_domain_path(&self) -> Result<PathBuf> {
        match &self.domain_path {
            Some(path) => Ok(path.clone()),
            None => domain_path_for(&self.path),
        }
    }
}

/// One configuration to run on every problem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArguments {
    pub suite_name: String,
    pub planner: BTreeMap<String, String>,
    #[serde(default)]
    pub translator: BTreeMap<String, String>,
    /// Replaces the experiment's planner template for this run, e.g. for
    /// symk or kstar.
    #[serde(default)]
    pub planner_template: Option<CommandTemplate>,
    /// Whether the translator runs before the planner. Planners that read
    /// PDDL themselves skip it.
    #[serde(default = "default_translate")]
    pub translate: bool,
}

fn default_translate() -> bool {
    true
}

/// Everything needed to generate a command file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    pub output_root: PathBuf,
    #[serde(default = "default_planner_template")]
    pub planner_template: CommandTemplate,
    #[serde(default = "default_translator_template")]
    pub translator_template: CommandTemplate,
    /// Problems listed explicitly.
    #[serde(default)]
    pub problems: Vec<Problem>,
    /// Benchmark root and domains to discover problems from.
    #[serde(default)]
    pub benchmark_root: Option<PathBuf>,
    #[serde(default)]
    pub domains: Vec<String>,
    pub runs: Vec<RunArguments>,
}

fn default_planner_template() -> CommandTemplate {
    CommandTemplate(DEFAULT_PLANNER_TEMPLATE.to_string())
}

fn default_translator_template() -> CommandTemplate {
    CommandTemplate(DEFAULT_TRANSLATOR_TEMPLATE.to_string())
}

impl ExperimentPlan {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Explicit problems followed by the discovered ones.
    pub fn all_problems(&self) -> Result<Vec<Problem>> {
        let mut problems = self.problems.clone();
        if let Some(root) = &self.benchmark_root {
            problems.extend(discover_problems(root, &self.domains)?);
        }
        Ok(problems)
    }

    pub fn command_calls(&self) -> Result<Vec<String>> {
        let problems = self.all_problems()?;
        generate_command_calls(
            &self.output_root,
            &problems,
            &self.runs,
            &self.planner_template,
            &self.translator_template,
        )
    }
}

/// Keeps only the alphanumeric characters of `domain + problem`.
pub fn sanitized_domain_desc(domain: &str, problem: &str) -> String {
    sanitize(&format!("{}{}", domain, problem))
}

pub fn output_directory(output_root: &Path, suite_name: &str, problem: &Problem) -> PathBuf {
    output_root.join(suite_name).join(problem.domain_desc())
}

/// Problem and domain paths for the placeholders `template` mentions. The
/// domain file is only looked up when needed.
fn path_arguments(template: &CommandTemplate, problem: &Problem) -> Result<BTreeMap<String, String>> {
    let mut arguments = BTreeMap::new();
    if template.mentions(PROBLEM_PATH_KEY) {
        arguments.insert(PROBLEM_PATH_KEY.to_string(), problem.path.display().to_string());
    }
    if template.mentions(DOMAIN_PATH_KEY) {
        let domain_path = problem.resolve_domain_path()?;
        arguments.insert(DOMAIN_PATH_KEY.to_string(), domain_path.display().to_string());
    }
    Ok(arguments)
}

/// `mkdir -p D && cd D [&& <translate>] && <plan>`
pub fn complete_call(
    output_dir: &Path,
    problem: &Problem,
    run: &RunArguments,
    planner_template: &CommandTemplate,
    translator_template: &CommandTemplate,
) -> Result<String> {
    let mut steps = vec![
        format!("mkdir -p {}", output_dir.display()),
        format!("cd {}", output_dir.display()),
    ];

    if run.translate {
        let mut translator_arguments = run.translator.clone();
        translator_arguments.extend(path_arguments(translator_template, problem)?);
        steps.push(translator_template.apply_arguments(&translator_arguments));
    }

    let planner_template = run.planner_template.as_ref().unwrap_or(planner_template);
    let mut planner_arguments = run.planner.clone();
    planner_arguments.extend(path_arguments(planner_template, problem)?);
    steps.push(planner_template.apply_arguments(&planner_arguments));

    Ok(steps.join(" && "))
}

/// One call per (run, problem), runs in the outer loop.
pub fn generate_command_calls(
    output_root: &Path,
    problems: &[Problem],
    runs: &[RunArguments],
    planner_template: &CommandTemplate,
    translator_template: &CommandTemplate,
) -> Result<Vec<String>> {
    let mut calls = Vec::with_capacity(runs.len() * problems.len());
    for run in runs {
        for problem in problems {
            let output_dir = output_directory(output_root, &run.suite_name, problem);
            calls.push(complete_call(&output_dir, problem, run, planner_template, translator_template)?);
        }
    }
    Ok(calls)
}

pub fn write_parallel_file<P: AsRef<Path>>(calls: &[String], path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| BenchError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for call in calls {
        writeln!(writer, "{}", call).map_err(|e| BenchError::io(path, e))?;
    }
    writer.flush().map_err(|e| BenchError::io(path, e))?;
    info!("Wrote {} command lines to {}", calls.len(), path.display());
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Finds the domain file that belongs to a problem file.
///
/// Candidates are the files next to the problem whose name contains
/// "domain", sorted by name. A single candidate wins outright, then
/// `domain.pddl`. Otherwise the first candidate containing the problem's
/// file name, then its part before the first `-`, then its part before the
/// first `.`.
pub fn domain_path_for(problem_path: &Path) -> Result<PathBuf> {
    let folder = match problem_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let problem_name = file_name(problem_path);

    let mut domains = Vec::new();
    for entry in fs::read_dir(folder).map_err(|e| BenchError::io(folder, e))? {
        let path = entry.map_err(|e| BenchError::io(folder, e))?.path();
        let name = file_name(&path);
        if path.is_file() && name.contains("domain") {
            domains.push(name);
        }
    }
    domains.sort();

    let prefix = |separator: char| {
        problem_name
            .split(separator)
            .next()
            .filter(|part| part.len() != problem_name.len())
            .map(str::to_string)
    };

    let found = if domains.len() == 1 {
        domains.first().cloned()
    } else if domains.iter().any(|d| d == "domain.pddl") {
        Some("domain.pddl".to_string())
    } else {
        [Some(problem_name.clone()), prefix('-'), prefix('.')]
            .into_iter()
            .flatten()
            .find_map(|needle| domains.iter().find(|d| d.contains(needle.as_str())).cloned())
    };

    match found {
        Some(name) => Ok(folder.join(name)),
        None => Err(BenchError::DomainNotFound(problem_path.to_path_buf())),
    }
}

/// Lists the `.pddl` problem files of the given domains, skipping domain
/// files. Problems are sorted by file name within each domain.
pub fn discover_problems(benchmark_root: &Path, domains: &[String]) -> Result<Vec<Problem>> {
    let mut problems = Vec::new();
    for domain in domains {
        let domain_path = benchmark_root.join(domain);
        let mut files = Vec::new();
        for entry in fs::read_dir(&domain_path).map_err(|e| BenchError::io(&domain_path, e))? {
            let path = entry.map_err(|e| BenchError::io(&domain_path, e))?.path();
            let name = file_name(&path);
            if path.is_file() && name.ends_with(".pddl") && !name.contains("domain") {
                files.push((name, path));
            }
        }
        files.sort();
        problems.extend(files.into_iter().map(|(name, path)| Problem {
            domain: domain.clone(),
            problem: name,
            path,
            domain_path: None,
        }));
    }
    Ok(problems)
}

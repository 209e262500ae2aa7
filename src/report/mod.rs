use prettytable::{row, Table};
use std::io::{self, Write};

use crate::aggregate::{
    cactus_points, k_to_solved, scatter_points, ComparisonRow, Portfolio, SolveDifference, Statistic, SuiteSummary,
};
use crate::record::RunRecord;
use crate::store::NamedSuite;

/// Formats a statistic, failed statistics print as "N/A".
pub fn fmt_stat(stat: &Statistic, precision: usize) -> String {
    match stat {
        Ok(value) => format!("{:.*}", precision, value),
        Err(_) => "N/A".to_string(),
    }
}

pub fn summary_table(summary: &SuiteSummary) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Statistic", "Value"]);
    table.add_row(row!["#Total", summary.total]);
    table.add_row(row!["#Error encoding", summary.encoding_errors]);
    table.add_row(row!["#Not finished building CNF", summary.not_finished_cnf]);
    table.add_row(row!["#Not finished building DD", summary.not_finished_dd]);
    table.add_row(row!["#Solved", summary.solved]);
    table.add_row(row!["%Solved", fmt_stat(&summary.percent_solved, 3)]);
    table.add_row(row!["Avg. finish time on solved (s)", fmt_stat(&summary.avg_finish_time, 2)]);
    table.add_row(row!["Avg. % of time spent reordering on solved", fmt_stat(&summary.avg_percent_reordering, 3)]);
    table.add_row(row![
        "Avg. #clauses/#variables",
        format!("{}/{}", fmt_stat(&summary.avg_clauses_attempted, 0), fmt_stat(&summary.avg_variables_attempted, 0))
    ]);
    table.add_row(row![
        "Avg. #clauses/#variables on solved",
        format!("{}/{}", fmt_stat(&summary.avg_clauses_solved, 0), fmt_stat(&summary.avg_variables_solved, 0))
    ]);
    table.add_row(row!["Avg. % of conjoined clauses", fmt_stat(&summary.avg_conjoin_percent, 3)]);
    table.add_row(row!["Avg. peak nodes on solved", fmt_stat(&summary.avg_peak_nodes, 0)]);
    table.add_row(row!["Avg. peak live nodes on solved", fmt_stat(&summary.avg_peak_live_nodes, 0)]);
    table.add_row(row!["Avg. DD size on solved", fmt_stat(&summary.avg_dd_size, 0)]);
    table.add_row(row!["Avg. colour classes on solved", fmt_stat(&summary.avg_colours, 1)]);
    table
}

/// Print the summary of one suite, optionally followed by its solved instances.
pub fn print_suite_summary(name: &str, summary: &SuiteSummary, list_solved: bool) {
    println!("\nResults for suite: {}", name);
    summary_table(summary).printstd();

    if list_solved {
        let mut table = Table::new();
        table.add_row(row!["Solved instance", "Finish time (s)"]);
        for (id, time) in &summary.solved_times {
            let time = time.map(|t| format!("{:.2}", t)).unwrap_or_else(|| "N/A".to_string());
            table.add_row(row![id, time]);
        }
        table.printstd();
    }
}

pub fn comparison_table(rows: &[ComparisonRow]) -> Table {
    let mut table = Table::new();
    table.add_row(row![
        "Suite",
        "Config",
        "#Solved",
        "Avg. finish time (s)",
        "Avg. peak nodes",
        "Avg. live nodes",
        "Avg. DD size"
    ]);
    for r in rows {
        table.add_row(row![
            r.suite,
            r.label,
            r.solved,
            fmt_stat(&r.avg_finish_time, 2),
            fmt_stat(&r.avg_peak_nodes, 0),
            fmt_stat(&r.avg_peak_live_nodes, 0),
            fmt_stat(&r.avg_dd_size, 0),
        ]);
    }
    table
}

/// Print the comparison rows (weakest first) and the best candidates.
pub fn print_comparison(rows: &[ComparisonRow], best: &[&ComparisonRow]) {
    println!();
    comparison_table(rows).printstd();

    if !best.is_empty() {
        println!("\nPrinting {} best candidates", best.len());
        for (i, r) in best.iter().enumerate() {
            let path = r
                .example_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| r.suite.clone());
            println!("{} {}", i + 1, path);
        }
    }
}

pub fn print_solve_difference(name_a: &str, name_b: &str, diff: &SolveDifference) {
    let mut table = Table::new();
    table.add_row(row![format!("Only solved by {}", name_a), format!("Only solved by {}", name_b)]);
    let a: Vec<&String> = diff.only_a.iter().collect();
    let b: Vec<&String> = diff.only_b.iter().collect();
    for i in 0..a.len().max(b.len()) {
        table.add_row(row![
            a.get(i).map(|s| s.as_str()).unwrap_or(""),
            b.get(i).map(|s| s.as_str()).unwrap_or("")
        ]);
    }
    table.add_row(row![format!("total {}", a.len()), format!("total {}", b.len())]);
    println!();
    table.printstd();
}

pub fn portfolio_table(result: &Portfolio) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Suite", "#Solved", "#Solved in total", "#Newly solved"]);
    for step in &result.steps {
        table.add_row(row![step.suite, step.solved, step.cumulative, step.newly_solved]);
    }
    table
}

pub fn print_portfolio(result: &Portfolio) {
    println!();
    portfolio_table(result).printstd();
    println!("Solved a total of {} problems", result.solved.len());
}

/// Cactus data, one block per suite (blocks separated by two blank lines).
pub fn write_cactus<W: Write>(out: &mut W, suites: &[NamedSuite], timeout: f64) -> io::Result<()> {
    for (i, suite) in suites.iter().enumerate() {
        if i > 0 {
            writeln!(out, "\n")?;
        }
        writeln!(out, "# {}", suite.name)?;
        writeln!(out, "time solved")?;
        for (time, solved) in cactus_points(&suite.records, timeout) {
            writeln!(out, "{:.3} {}", time, solved)?;
        }
    }
    Ok(())
}

pub fn write_scatter<W: Write>(out: &mut W, a: &NamedSuite, b: &NamedSuite, timeout: f64) -> io::Result<()> {
    writeln!(out, "# {} vs {}", a.name, b.name)?;
    writeln!(out, "instance time_a time_b")?;
    for point in scatter_points(&a.records, &b.records, timeout) {
        writeln!(out, "{} {:.3} {:.3}", point.domain_desc, point.time_a, point.time_b)?;
    }
    Ok(())
}

/// The progress series of a single run. Conjoin and engine columns each
/// come from whole rows, so a length difference only appears when the log
/// was cut off between a progress line and its `CUDD stats` line. The short
/// side is padded with `nan`, which pgfplots skips.
pub fn write_progress<W: Write>(out: &mut W, record: &RunRecord) -> io::Result<()> {
    let p = &record.progress;
    fn cell<T: ToString>(series: &[T], i: usize) -> String {
        series.get(i).map(|v| v.to_string()).unwrap_or_else(|| "nan".to_string())
    }

    writeln!(out, "# {}", record.domain_desc)?;
    writeln!(out, "time conjoin_percent nodes peak_nodes reorderings memory")?;
    let rows = [
        p.timesteps.len(),
        p.conjoin_percent.len(),
        p.nodes.len(),
        p.peak_nodes.len(),
        p.reorderings.len(),
        p.memory.len(),
    ]
    .into_iter()
    .max()
    .unwrap_or(0);
    for i in 0..rows {
        writeln!(
            out,
            "{} {} {} {} {} {}",
            cell(&p.timesteps, i),
            cell(&p.conjoin_percent, i),
            cell(&p.nodes, i),
            cell(&p.peak_nodes, i),
            cell(&p.reorderings, i),
            cell(&p.memory, i)
        )?;
    }
    Ok(())
}

pub fn write_k_solved<W: Write>(out: &mut W, suites: &[NamedSuite], timebound: f64, cap: f64) -> io::Result<()> {
    for (i, suite) in suites.iter().enumerate() {
        if i > 0 {
            writeln!(out, "\n")?;
        }
        writeln!(out, "# {}", suite.name)?;
        writeln!(out, "k solved")?;
        for (k, solved) in k_to_solved(&suite.records, timebound, cap) {
            writeln!(out, "{} {}", k, solved)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatError;
    use crate::record::Progress;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn finished(id: &str, time: f64) -> RunRecord {
        RunRecord {
            domain_desc: id.to_string(),
            file_path: PathBuf::from(id),
            config: Vec::new(),
            config_values: BTreeMap::new(),
            has_finished_cnf: true,
            has_finished: true,
            error_while_encoding: false,
            finish_time: Some(time),
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

    #[test]
    fn failed_statistics_print_as_na() {
        assert_eq!(fmt_stat(&Err(StatError::EmptyPartition), 2), "N/A");
        assert_eq!(fmt_stat(&Ok(62.5), 3), "62.500");

        let rendered = summary_table(&SuiteSummary::compute(&[])).to_string();
        assert!(rendered.contains("N/A"));
    }

    #[test]
    fn cactus_blocks_are_separated() {
        let suites = vec![
            NamedSuite { name: "bdd".to_string(), records: vec![finished("a", 2.0), finished("b", 1.0)] },
            NamedSuite { name: "sdd".to_string(), records: vec![finished("a", 3.0)] },
        ];
        let mut out = Vec::new();
        write_cactus(&mut out, &suites, 600.0).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "# bdd\ntime solved\n1.000 1\n2.000 2\n\n\n# sdd\ntime solved\n3.000 1\n"
        );
    }

    #[test]
    fn progress_pads_short_series() {
        let mut record = finished("a", 1.0);
        record.progress.timesteps = vec![0.5, 1.0];
        record.progress.conjoin_percent = vec![50, 100];
        record.progress.nodes = vec![7];
        let mut out = Vec::new();
        write_progress(&mut out, &record).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[2], "0.5 50 7 nan nan nan");
        assert_eq!(lines[3], "1 100 nan nan nan nan");
    }
}

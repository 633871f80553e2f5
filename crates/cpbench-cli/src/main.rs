//! cpbench - experiment harness for the CP solver project
//!
//! ## Commands
//!
//! - `evaluate`: build the solver, solve every instance of a model and check the runs
//! - `check`: re-check the runs of an existing experiment
//! - `parse`: write the statistics table of an experiment
//! - `proof`: process or check the proofs of the optimally solved runs
//! - `grade`: grade the solver against an assignment table
//! - `models`: list the known models

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn, Level};

use cpbench_core::{CheckReport, GradeTable, HarnessConfig, HarnessError};
use cpbench_harness::{
    CorrectnessChecker, CreateOptions, ExperimentContext, GradingEngine, Harness, InstanceRunner,
    ProofPipeline, ProofStage, ProofStepOutcome, StatisticsAggregator, ToolStatus,
};

#[derive(Parser)]
#[command(name = "cpbench")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Experiment and grading harness for the CP solver", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the solver for a model, solve all its instances and check the runs
    Evaluate {
        /// Model id (see `cpbench models`)
        model: String,

        /// Time budget per instance, in seconds
        timeout: u64,

        /// Extra solver flag, repeatable (`--flag -G --flag element`)
        #[arg(long = "flag", allow_hyphen_values = true)]
        flags: Vec<String>,

        /// Log proof scaffolds for every run
        #[arg(long)]
        with_proofs: bool,

        /// Allow uncommitted changes in the working tree
        #[arg(long)]
        allow_dirty: bool,

        /// Build the solver with explanation checks enabled
        #[arg(long)]
        explanation_checks: bool,

        /// Instances solved concurrently (0 = one per core)
        #[arg(short, long, env = "CPBENCH_JOBS")]
        jobs: Option<usize>,
    },

    /// Check the solutions and optimality claims of an experiment
    Check {
        /// Experiment directory
        experiment: PathBuf,
    },

    /// Write statistics.csv for an experiment
    Parse {
        /// Experiment directory
        experiment: PathBuf,
    },

    /// Process or check the proofs of an experiment
    Proof {
        /// Experiment directory
        experiment: PathBuf,

        /// Stage to run
        #[arg(value_enum)]
        stage: StageArg,
    },

    /// Grade the solver project against an assignment
    Grade {
        /// Built-in assignment (assignment-1, assignment-2)
        assignment: String,

        /// Grade table file replacing the built-in table
        #[arg(long)]
        table: Option<PathBuf>,

        /// Override the per-instance time budget of the table
        #[arg(long)]
        timeout: Option<u64>,

        /// Write the full report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the known models
    Models,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StageArg {
    Process,
    Check,
}

impl From<StageArg> for ProofStage {
    fn from(stage: StageArg) -> Self {
        match stage {
            StageArg::Process => ProofStage::Process,
            StageArg::Check => ProofStage::Check,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    cpbench_core::init_tracing(cli.json, level);

    let config = HarnessConfig::from_env();

    match cli.command {
        Commands::Evaluate {
            model,
            timeout,
            flags,
            with_proofs,
            allow_dirty,
            explanation_checks,
            jobs,
        } => {
            let config = match jobs {
                Some(jobs) => config.with_jobs(jobs),
                None => config,
            };
            let options = CreateOptions {
                with_proofs,
                allow_dirty,
                explanation_checks,
                ..CreateOptions::new(model, timeout).with_flags(flags)
            };
            interruptible(cmd_evaluate(Harness::with_processes(config), options)).await
        }
        Commands::Check { experiment } => {
            interruptible(cmd_check(Harness::with_processes(config), &experiment)).await
        }
        Commands::Parse { experiment } => cmd_parse(&experiment),
        Commands::Proof { experiment, stage } => {
            interruptible(cmd_proof(
                Harness::with_processes(config),
                &experiment,
                stage.into(),
            ))
            .await
        }
        Commands::Grade {
            assignment,
            table,
            timeout,
            report,
        } => {
            let table = load_table(&assignment, table.as_deref(), timeout)?;
            interruptible(cmd_grade(
                Harness::with_processes(config),
                table,
                report.as_deref(),
            ))
            .await
        }
        Commands::Models => cmd_models(&Harness::with_processes(config)),
    }
}

/// Race a command against Ctrl-C. Dropping the command future kills every
/// child it spawned.
async fn interruptible<F>(command: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::select! {
        result = command => result,
        _ = tokio::signal::ctrl_c() => {
            warn!(event = "harness.interrupted", "interrupted, stopping running tools");
            Err(HarnessError::Interrupted.into())
        }
    }
}

fn print_check_report(report: &CheckReport) {
    println!(
        "Checked {} runs: {}",
        report.total_runs(),
        if report.passed() {
            "✓ PASSED"
        } else {
            "✗ FAILED"
        }
    );
    let summary = report.render_summary();
    if !summary.is_empty() {
        println!();
        print!("{summary}");
    }
}

async fn cmd_evaluate(harness: Harness, options: CreateOptions) -> Result<()> {
    let manifest = ExperimentContext::create(&harness, &options)
        .await
        .context("Failed to create experiment")?;

    println!("Experiment: {}", manifest.directory.display());
    println!("Commit: {}", manifest.commit_hash);
    if manifest.has_dirty_files {
        println!("Warning: working tree has uncommitted changes");
    }
    println!("Flags: {}", manifest.flags.join(" "));
    println!();

    let runs = InstanceRunner::run_all(&harness, &manifest).await?;
    for run in &runs {
        let status = match run.status {
            ToolStatus::Exited(0) => "✓".to_string(),
            ToolStatus::Exited(code) => format!("✗ exit code {code}"),
            ToolStatus::Signalled => "✗ killed".to_string(),
            ToolStatus::TimedOut => "✗ timed out".to_string(),
        };
        println!("  {} ({}ms) {}", run.instance, run.duration_ms, status);
    }
    println!();

    let report = CorrectnessChecker::check_experiment(&harness, &manifest).await?;
    let rows = StatisticsAggregator::aggregate(&manifest)?;
    info!(rows = rows.len(), "evaluation finished");

    print_check_report(&report);
    if report.passed() {
        Ok(())
    } else {
        anyhow::bail!("Experiment produced incorrect results")
    }
}

async fn cmd_check(harness: Harness, experiment: &Path) -> Result<()> {
    let manifest = ExperimentContext::load(experiment)
        .with_context(|| format!("Failed to load experiment {:?}", experiment))?;
    let report = CorrectnessChecker::check_experiment(&harness, &manifest).await?;

    print_check_report(&report);
    if report.passed() {
        Ok(())
    } else {
        anyhow::bail!("Experiment produced incorrect results")
    }
}

fn cmd_parse(experiment: &Path) -> Result<()> {
    let manifest = ExperimentContext::load(experiment)
        .with_context(|| format!("Failed to load experiment {:?}", experiment))?;
    let rows = StatisticsAggregator::aggregate(&manifest)?;

    println!(
        "Wrote {} rows to {}",
        rows.len(),
        StatisticsAggregator::table_path(&manifest).display()
    );
    Ok(())
}

async fn cmd_proof(harness: Harness, experiment: &Path, stage: ProofStage) -> Result<()> {
    let manifest = ExperimentContext::load(experiment)
        .with_context(|| format!("Failed to load experiment {:?}", experiment))?;
    let reports = ProofPipeline::run_stage(&harness, &manifest, stage)
        .await
        .with_context(|| format!("Proof stage '{}' failed", stage))?;

    println!("Proof stage '{}': {} runs", stage, reports.len());
    for report in &reports {
        match &report.outcome {
            ProofStepOutcome::Completed { exit_code: Some(0) } => {
                println!("  ✓ {}", report.instance)
            }
            ProofStepOutcome::Completed { exit_code: Some(code) } => {
                println!("  ✗ {} (exit code: {})", report.instance, code)
            }
            ProofStepOutcome::Completed { exit_code: None } => {
                println!("  ✗ {} (killed)", report.instance)
            }
            ProofStepOutcome::Skipped { diagnostic } => {
                println!("  - {}: {}", report.instance, diagnostic)
            }
        }
    }
    Ok(())
}

/// Built-in table by name, or the table file when one is given.
fn load_table(assignment: &str, file: Option<&Path>, timeout: Option<u64>) -> Result<GradeTable> {
    let mut table = match file {
        Some(path) => GradeTable::load(path)
            .with_context(|| format!("Failed to load grade table {:?}", path))?,
        None => match GradeTable::builtin(assignment) {
            Some(table) => table,
            None => anyhow::bail!("Unknown assignment: {}", assignment),
        },
    };
    if let Some(timeout) = timeout {
        table.timeout = timeout;
    }
    Ok(table)
}

async fn cmd_grade(harness: Harness, table: GradeTable, report_path: Option<&Path>) -> Result<()> {
    let engine = GradingEngine::new(harness, table).context("Invalid grade table")?;
    println!(
        "Grading against '{}' ({} capabilities)",
        engine.table().table().name,
        engine.table().tasks().len()
    );
    println!();

    let report = engine.grade().await?;
    print!("{}", report.render());

    if let Some(path) = report_path {
        let content = serde_json::to_string_pretty(&report).context("serialize grade report")?;
        std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn cmd_models(harness: &Harness) -> Result<()> {
    for spec in harness.registry().models() {
        let instances = match spec.list_instances() {
            Ok(instances) => format!("{} instances", instances.len()),
            Err(_) => "no instances".to_string(),
        };
        println!(
            "{}\t{}\t{}",
            spec.id,
            spec.instances_dir.display(),
            instances
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_evaluate_collects_hyphenated_flags() {
        let cli = Cli::try_parse_from([
            "cpbench",
            "evaluate",
            "tsp",
            "20",
            "--flag",
            "-G",
            "--flag",
            "element",
            "--with-proofs",
            "--jobs",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Evaluate {
                model,
                timeout,
                flags,
                with_proofs,
                allow_dirty,
                jobs,
                ..
            } => {
                assert_eq!(model, "tsp");
                assert_eq!(timeout, 20);
                assert_eq!(flags, vec!["-G", "element"]);
                assert!(with_proofs);
                assert!(!allow_dirty);
                assert_eq!(jobs, Some(4));
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_proof_stage_argument() {
        let cli = Cli::try_parse_from(["cpbench", "proof", "experiments/x", "check"]).unwrap();
        match cli.command {
            Commands::Proof { stage, .. } => {
                assert_eq!(ProofStage::from(stage), ProofStage::Check)
            }
            _ => panic!("expected proof"),
        }
        assert!(Cli::try_parse_from(["cpbench", "proof", "experiments/x", "verify"]).is_err());
    }

    #[test]
    fn test_load_table_overrides_timeout() {
        let table = load_table("assignment-1", None, Some(3)).unwrap();
        assert_eq!(table.name, "assignment-1");
        assert_eq!(table.timeout, 3);
        assert!(load_table("assignment-9", None, None).is_err());
    }

    #[test]
    fn test_load_table_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.json");
        let json = serde_json::to_string(&GradeTable::assignment_2()).unwrap();
        std::fs::write(&path, json).unwrap();

        let table = load_table("ignored", Some(&path), None).unwrap();
        assert_eq!(table, GradeTable::assignment_2());
    }

    #[test]
    fn test_parse_requires_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_parse(dir.path()).is_err());
    }
}

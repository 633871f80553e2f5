//! Proof pipeline: expand logged scaffolds into full proofs, then check them.
//!
//! Only runs whose statistics row reports OPTIMAL take part, so the
//! statistics table must exist before either stage runs.

use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};

use cpbench_core::statistics::optimal_instances;
use cpbench_core::{ExperimentManifest, Result, RunLayout};

use crate::aggregate::StatisticsAggregator;
use crate::harness::Harness;
use crate::tool::ToolInvocation;

/// Exit code stored when the checker produced none (killed by a signal).
const NO_EXIT_CODE: i32 = -1;

/// One of the two proof stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofStage {
    /// Scaffold to full proof.
    Process,
    /// Validate the full proof.
    Check,
}

impl ProofStage {
    /// Mode token passed to the solver.
    pub fn mode(&self) -> &'static str {
        match self {
            ProofStage::Process => "process",
            ProofStage::Check => "check",
        }
    }
}

impl fmt::Display for ProofStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode())
    }
}

impl FromStr for ProofStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "process" => Ok(ProofStage::Process),
            "check" => Ok(ProofStage::Check),
            other => Err(format!("unknown proof stage: {other}")),
        }
    }
}

/// What happened to one run in a proof stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofStepOutcome {
    /// The solver ran; `exit_code` is `None` when it was killed.
    Completed { exit_code: Option<i32> },
    /// The input artifact was missing.
    Skipped { diagnostic: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofStepReport {
    pub instance: String,
    pub stage: ProofStage,
    pub outcome: ProofStepOutcome,
}

impl ProofStepReport {
    pub fn skipped(&self) -> bool {
        matches!(self.outcome, ProofStepOutcome::Skipped { .. })
    }
}

/// Drives the two proof stages over an experiment.
pub struct ProofPipeline;

impl ProofPipeline {
    /// Runs whose statistics row reports OPTIMAL.
    ///
    /// Fails with `StatisticsMissing` when the experiment has not been
    /// aggregated yet.
    pub fn eligible_runs(manifest: &ExperimentManifest) -> Result<Vec<RunLayout>> {
        let table = StatisticsAggregator::table_path(manifest);
        Ok(optimal_instances(&table)?
            .iter()
            .map(|instance| manifest.run(instance))
            .collect())
    }

    fn skip(run: &RunLayout, stage: ProofStage, diagnostic: String) -> ProofStepReport {
        warn!(
            event = "proof.skipped",
            instance = %run.instance(),
            stage = %stage,
            "{diagnostic}"
        );
        ProofStepReport {
            instance: run.instance(),
            stage,
            outcome: ProofStepOutcome::Skipped { diagnostic },
        }
    }

    /// `<exe> <instance> process <scaffold> <full proof>`, logging to
    /// `process.log`/`process.err`.
    pub async fn process_run(
        harness: &Harness,
        manifest: &ExperimentManifest,
        run: &RunLayout,
    ) -> Result<ProofStepReport> {
        let scaffold = run.scaffold();
        if !scaffold.is_file() {
            return Ok(Self::skip(
                run,
                ProofStage::Process,
                format!(
                    "missing {}; was the instance solved with proof logging enabled?",
                    scaffold.display()
                ),
            ));
        }

        let spec = harness.registry().get(&manifest.model)?;
        let instance = spec.instance_path(&run.instance());
        let invocation = ToolInvocation::new("process", manifest.executable.to_string_lossy())
            .arg(instance.to_string_lossy())
            .arg(ProofStage::Process.mode())
            .arg(scaffold.to_string_lossy())
            .arg(run.full_proof().to_string_lossy())
            .stdout_to(run.process_log())
            .stderr_to(run.process_err());

        let output = harness.executor().execute(&invocation).await?;
        info!(
            event = "proof.processed",
            instance = %run.instance(),
            exit_code = ?output.exit_code(),
            duration_ms = output.duration_ms
        );
        Ok(ProofStepReport {
            instance: run.instance(),
            stage: ProofStage::Process,
            outcome: ProofStepOutcome::Completed {
                exit_code: output.exit_code(),
            },
        })
    }

    /// `<exe> <instance> check <full proof>`, logging to
    /// `checking.log`/`checking.err` and storing the exit code in
    /// `checking_status`.
    pub async fn check_run(
        harness: &Harness,
        manifest: &ExperimentManifest,
        run: &RunLayout,
    ) -> Result<ProofStepReport> {
        let full_proof = run.full_proof();
        if !full_proof.is_file() {
            return Ok(Self::skip(
                run,
                ProofStage::Check,
                format!(
                    "missing {}; were the proofs processed?",
                    full_proof.display()
                ),
            ));
        }

        let spec = harness.registry().get(&manifest.model)?;
        let instance = spec.instance_path(&run.instance());
        let invocation = ToolInvocation::new("check", manifest.executable.to_string_lossy())
            .arg(instance.to_string_lossy())
            .arg(ProofStage::Check.mode())
            .arg(full_proof.to_string_lossy())
            .stdout_to(run.checking_log())
            .stderr_to(run.checking_err());

        let output = harness.executor().execute(&invocation).await?;
        run.write_checking_status(output.exit_code().unwrap_or(NO_EXIT_CODE))?;
        info!(
            event = "proof.checked",
            instance = %run.instance(),
            exit_code = ?output.exit_code(),
            duration_ms = output.duration_ms
        );
        Ok(ProofStepReport {
            instance: run.instance(),
            stage: ProofStage::Check,
            outcome: ProofStepOutcome::Completed {
                exit_code: output.exit_code(),
            },
        })
    }

    /// Run one stage over every eligible run, sequentially.
    pub async fn run_stage(
        harness: &Harness,
        manifest: &ExperimentManifest,
        stage: ProofStage,
    ) -> Result<Vec<ProofStepReport>> {
        let runs = Self::eligible_runs(manifest)?;
        info!(stage = %stage, runs = runs.len(), "running proof stage");

        let mut reports = Vec::with_capacity(runs.len());
        for run in &runs {
            let report = match stage {
                ProofStage::Process => Self::process_run(harness, manifest, run).await?,
                ProofStage::Check => Self::check_run(harness, manifest, run).await?,
            };
            reports.push(report);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedExecutor;
    use crate::tool::ToolOutput;
    use cpbench_core::{HarnessConfig, HarnessError, ModelRegistry};
    use std::path::Path;
    use std::sync::Arc;

    fn manifest(root: &Path) -> ExperimentManifest {
        let directory = root.join("exp");
        ExperimentManifest {
            runs: directory.join("runs"),
            executable: directory.join("tsp"),
            directory,
            model: "tsp".to_string(),
            timeout: 20,
            commit_hash: "abc".to_string(),
            has_dirty_files: false,
            flags: Vec::new(),
            with_proofs: true,
        }
    }

    fn harness(root: &Path, executor: Arc<ScriptedExecutor>) -> Harness {
        let config = HarnessConfig::rooted_at(root);
        let registry = ModelRegistry::builtin(&config);
        Harness::new(executor, config, registry)
    }

    #[test]
    fn test_stage_names() {
        assert_eq!("process".parse::<ProofStage>().unwrap(), ProofStage::Process);
        assert_eq!(ProofStage::Check.to_string(), "check");
        assert!("verify".parse::<ProofStage>().is_err());
    }

    #[tokio::test]
    async fn test_check_stores_exit_code() {
        let root = tempfile::tempdir().unwrap();
        let manifest = manifest(root.path());
        let run = manifest.run("a");
        std::fs::create_dir_all(run.dir()).unwrap();
        std::fs::write(run.full_proof(), "proof").unwrap();

        let executor = Arc::new(ScriptedExecutor::new().on("check", ToolOutput::exited(2)));
        let harness = harness(root.path(), executor.clone());

        let report = ProofPipeline::check_run(&harness, &manifest, &run)
            .await
            .unwrap();
        assert_eq!(
            report.outcome,
            ProofStepOutcome::Completed { exit_code: Some(2) }
        );
        assert_eq!(run.read_checking_status().unwrap(), Some(2));

        let call = &executor.calls_named("check")[0];
        assert_eq!(call.args[1], "check");
        assert_eq!(call.args[2], run.full_proof().to_string_lossy());
    }

    #[tokio::test]
    async fn test_check_before_process_skips() {
        let root = tempfile::tempdir().unwrap();
        let manifest = manifest(root.path());
        let run = manifest.run("a");
        std::fs::create_dir_all(run.dir()).unwrap();

        let executor = Arc::new(ScriptedExecutor::new());
        let harness = harness(root.path(), executor.clone());

        let report = ProofPipeline::check_run(&harness, &manifest, &run)
            .await
            .unwrap();
        assert!(report.skipped());
        assert_eq!(run.read_checking_status().unwrap(), None);
        assert_eq!(executor.call_count(), 0);
    }

    #[test]
    fn test_eligibility_requires_statistics_table() {
        let root = tempfile::tempdir().unwrap();
        let manifest = manifest(root.path());
        std::fs::create_dir_all(&manifest.runs).unwrap();

        let err = ProofPipeline::eligible_runs(&manifest).unwrap_err();
        assert!(matches!(err, HarnessError::StatisticsMissing(_)));
    }
}

//! Correctness checking of reported solutions against the verifier and the
//! ground truth.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use cpbench_core::{
    parse_log, CheckReport, ExperimentManifest, GroundTruth, HarnessError, ModelSpec,
    OptimalityMismatch, Result, RunLayout, RunOutcome, RunVerdict,
};

use crate::harness::Harness;
use crate::tool::ToolInvocation;

/// Write one data file per reported solution into the run's
/// `solutions_dzn` directory, replacing whatever a previous check left there.
pub fn materialize_solutions(
    run: &RunLayout,
    outcome: &RunOutcome,
    extension: &str,
) -> Result<Vec<PathBuf>> {
    let dir = run.solutions_dir();
    if dir.is_dir() {
        std::fs::remove_dir_all(&dir)?;
    }
    std::fs::create_dir_all(&dir)?;

    let mut files = Vec::with_capacity(outcome.solutions.len());
    for (index, solution) in outcome.solutions.iter().enumerate() {
        let path = run.solution_file(index, extension);
        std::fs::write(&path, solution.to_data_file())?;
        files.push(path);
    }
    Ok(files)
}

/// Ground truth loaded on first use, so experiments whose runs never claim
/// optimality do not need the side file.
struct LazyGroundTruth {
    path: PathBuf,
    loaded: Option<GroundTruth>,
}

impl LazyGroundTruth {
    fn new(path: PathBuf) -> Self {
        Self { path, loaded: None }
    }

    fn optimum(&mut self, instance: &str) -> Result<i64> {
        if self.loaded.is_none() {
            self.loaded = Some(GroundTruth::load(&self.path)?);
        }
        match &self.loaded {
            Some(truth) => truth.expect_optimum(instance),
            None => Err(HarnessError::MissingGroundTruth(instance.to_string())),
        }
    }
}

/// Checks runs with the verifier.
pub struct CorrectnessChecker;

impl CorrectnessChecker {
    /// `<verifier> --solver <backend> <template> <instance data> <solution>`.
    pub fn verify_invocation(
        harness: &Harness,
        template: &Path,
        data: &Path,
        solution: &Path,
    ) -> ToolInvocation {
        let verifier = &harness.config().verifier;
        ToolInvocation::new("verify", &verifier.program)
            .args(["--solver", verifier.backend.as_str()])
            .arg(template.to_string_lossy())
            .arg(data.to_string_lossy())
            .arg(solution.to_string_lossy())
    }

    /// Verify one materialised solution. `Ok(false)` means the verifier found
    /// the solution contradicts the model; a verifier failure without a
    /// contradiction response is fatal.
    pub async fn verify_solution(
        harness: &Harness,
        template: &Path,
        data: &Path,
        solution: &Path,
    ) -> Result<bool> {
        let invocation = Self::verify_invocation(harness, template, data, solution);
        let output = harness.executor().execute(&invocation).await?;

        let markers = &harness.config().verifier.contradiction_markers;
        let contradiction = markers
            .iter()
            .any(|m| output.stdout.contains(m.as_str()) || output.stderr.contains(m.as_str()));

        if contradiction {
            return Ok(false);
        }
        if !output.success() {
            return Err(HarnessError::VerifierFailed {
                command: invocation.command_line(),
                solution: solution.to_path_buf(),
                exit_code: output.exit_code(),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(true)
    }

    async fn check_run_with(
        harness: &Harness,
        spec: &ModelSpec,
        run: &RunLayout,
        ground_truth: &mut LazyGroundTruth,
    ) -> Result<RunVerdict> {
        let instance = run.instance();
        let outcome = parse_log(&run.read_output_log()?);
        let files = materialize_solutions(run, &outcome, &spec.data_extension)?;
        let data = spec.instance_path(&instance);

        let mut rejected_solutions = Vec::new();
        for file in &files {
            if !Self::verify_solution(harness, &spec.template, &data, file).await? {
                let stem = file
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                warn!(
                    event = "solution.rejected",
                    instance = %instance,
                    solution = %stem,
                    model = %spec.id,
                    data = %data.display(),
                    "verifier rejected solution"
                );
                rejected_solutions.push(stem);
            }
        }

        let mut optimality_mismatch = None;
        if outcome.is_optimal() {
            let expected = ground_truth.optimum(&instance)?;
            let reported = outcome.objective();
            if reported != Some(expected) {
                warn!(
                    instance = %instance,
                    expected,
                    reported = ?reported,
                    "incorrect optimality claim"
                );
                optimality_mismatch = Some(OptimalityMismatch { expected, reported });
            }
        }

        let verdict = RunVerdict {
            instance,
            solutions_checked: files.len(),
            rejected_solutions,
            optimality_mismatch,
        };
        info!(
            event = "run.checked",
            instance = %verdict.instance,
            status = %outcome.status,
            solutions = verdict.solutions_checked,
            error = ?verdict.error(),
        );
        Ok(verdict)
    }

    /// Check one run against a model's verifier template and ground truth.
    pub async fn check_run(
        harness: &Harness,
        spec: &ModelSpec,
        run: &RunLayout,
    ) -> Result<RunVerdict> {
        let mut ground_truth = LazyGroundTruth::new(spec.ground_truth_path());
        Self::check_run_with(harness, spec, run, &mut ground_truth).await
    }

    /// Check every run of an experiment, in instance order.
    pub async fn check_experiment(
        harness: &Harness,
        manifest: &ExperimentManifest,
    ) -> Result<CheckReport> {
        let spec = harness.registry().get(&manifest.model)?;
        let mut ground_truth = LazyGroundTruth::new(spec.ground_truth_path());

        let mut verdicts = Vec::new();
        for run in manifest.list_runs()? {
            verdicts.push(Self::check_run_with(harness, spec, &run, &mut ground_truth).await?);
        }
        Ok(CheckReport::new(verdicts))
    }
}

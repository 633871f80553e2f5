//! Instance runner: one solver invocation per benchmark instance.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, warn};

use cpbench_core::{ExperimentManifest, Result, RunLayout};

use crate::harness::Harness;
use crate::tool::{ToolInvocation, ToolStatus};

/// Mode token selecting the solve entry point of the solver.
pub const SOLVE_MODE: &str = "solve";

/// Flag introducing the proof-scaffold output path.
pub const PROOF_FLAG: &str = "-P";

/// How one solver invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub instance: String,
    pub status: ToolStatus,
    pub duration_ms: u64,
}

/// Runs the solver over the instances of an experiment's model.
pub struct InstanceRunner;

impl InstanceRunner {
    /// Solver invocation for one instance:
    /// `<exe> <instance> solve [-P <scaffold>] <flags...> <timeout>`.
    ///
    /// Output streams straight into the run's log files. The harness kills
    /// the solver `kill_grace` after its own time budget.
    pub fn solve_invocation(
        manifest: &ExperimentManifest,
        instance: &Path,
        run: &RunLayout,
        kill_grace: Duration,
    ) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(SOLVE_MODE, manifest.executable.to_string_lossy())
            .arg(instance.to_string_lossy())
            .arg(SOLVE_MODE);
        if manifest.with_proofs {
            invocation = invocation
                .arg(PROOF_FLAG)
                .arg(run.scaffold().to_string_lossy());
        }
        invocation
            .args(manifest.flags.iter().cloned())
            .arg(manifest.timeout.to_string())
            .timeout(Duration::from_secs(manifest.timeout).saturating_add(kill_grace))
            .stdout_to(run.output_log())
            .stderr_to(run.output_err())
    }

    /// Solve one instance in a fresh run directory named after it.
    ///
    /// A nonzero exit or a kill is logged and returned, never raised; the
    /// captured log decides what the run reported.
    pub async fn run_instance(
        harness: &Harness,
        manifest: &ExperimentManifest,
        instance: &Path,
    ) -> Result<RunSummary> {
        let name = instance
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let run = manifest.run(&name);
        std::fs::create_dir(run.dir())?;

        let grace = Duration::from_secs(harness.config().kill_grace_secs);
        let invocation = Self::solve_invocation(manifest, instance, &run, grace);

        info!(event = "instance.started", instance = %name, model = %manifest.model);
        let output = harness.executor().execute(&invocation).await?;

        if output.timed_out() {
            warn!(
                instance = %name,
                timeout = manifest.timeout,
                "solver exceeded its time budget and was killed"
            );
        }
        info!(
            event = "instance.finished",
            instance = %name,
            status = ?output.status,
            duration_ms = output.duration_ms
        );

        Ok(RunSummary {
            instance: name,
            status: output.status,
            duration_ms: output.duration_ms,
        })
    }

    /// Solve every instance of the manifest's model.
    ///
    /// At most `jobs` solver processes run at once; `jobs = 1` solves the
    /// instances one at a time in name order. Summaries come back sorted by
    /// instance name.
    pub async fn run_all(
        harness: &Harness,
        manifest: &ExperimentManifest,
    ) -> Result<Vec<RunSummary>> {
        let spec = harness.registry().get(&manifest.model)?;
        let instances: Vec<PathBuf> = spec.list_instances()?;
        let jobs = harness.config().jobs.max(1);

        info!(model = %manifest.model, instances = instances.len(), jobs, "running instances");

        let mut summaries: Vec<RunSummary> = stream::iter(instances.iter())
            .map(|instance| Self::run_instance(harness, manifest, instance))
            .buffer_unordered(jobs)
            .try_collect()
            .await?;
        summaries.sort_by(|a, b| a.instance.cmp(&b.instance));
        Ok(summaries)
    }
}

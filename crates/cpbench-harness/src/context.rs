//! Experiment creation and loading.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use cpbench_core::layout::RUNS_DIR;
use cpbench_core::{ExperimentManifest, HarnessError, Result};

use crate::build::{build_solver, install_executable};
use crate::git::working_tree_state;
use crate::harness::Harness;

/// What to create an experiment for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub model: String,

    /// Time budget per instance, in seconds.
    pub timeout: u64,

    /// Solver flags, appended after the model's default flags.
    pub flags: Vec<String>,

    pub with_proofs: bool,

    /// Proceed even when the working tree has uncommitted changes.
    pub allow_dirty: bool,

    /// Build with the `explanation-checks` feature.
    pub explanation_checks: bool,
}

impl CreateOptions {
    pub fn new(model: impl Into<String>, timeout: u64) -> Self {
        Self {
            model: model.into(),
            timeout,
            ..Self::default()
        }
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }
}

/// Directory name of an experiment started at `now`:
/// `%Y%m%d-%H.%M.%S.%f-<model>`.
pub fn experiment_dir_name(model: &str, now: DateTime<Local>) -> String {
    format!("{}-{model}", now.format("%Y%m%d-%H.%M.%S.%6f"))
}

/// Creates and loads experiment manifests.
pub struct ExperimentContext;

impl ExperimentContext {
    /// Create an experiment in a fresh timestamped directory.
    pub async fn create(
        harness: &Harness,
        options: &CreateOptions,
    ) -> Result<ExperimentManifest> {
        let name = experiment_dir_name(&options.model, Local::now());
        let directory = harness.config().experiments_dir.join(name);
        Self::create_at(harness, directory, options).await
    }

    /// Create an experiment rooted at `directory`, which must not exist yet.
    ///
    /// The manifest is written last, so its presence means the directory tree
    /// and the executable are in place. A failure part-way leaves the
    /// directory behind without a manifest.
    pub async fn create_at(
        harness: &Harness,
        directory: PathBuf,
        options: &CreateOptions,
    ) -> Result<ExperimentManifest> {
        let config = harness.config();
        let spec = harness.registry().get(&options.model)?;

        std::fs::create_dir_all(&config.experiments_dir)?;

        let tree =
            working_tree_state(harness.executor(), &config.git, &config.solver_root).await?;
        if tree.has_dirty_files {
            if !options.allow_dirty {
                return Err(HarnessError::DirtyWorkingTree);
            }
            warn!(model = %options.model, "creating experiment with uncommitted changes");
        }

        match std::fs::create_dir(&directory) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(HarnessError::DirectoryCollision(directory));
            }
            Err(e) => return Err(e.into()),
        }
        let runs = directory.join(RUNS_DIR);
        std::fs::create_dir(&runs)?;

        let built = build_solver(harness, spec, options.explanation_checks).await?;
        let executable = install_executable(&built, &directory)?;

        let mut flags = spec.default_flags.clone();
        flags.extend(options.flags.iter().cloned());

        let manifest = ExperimentManifest {
            directory,
            runs,
            model: options.model.clone(),
            timeout: options.timeout,
            commit_hash: tree.commit_hash,
            has_dirty_files: tree.has_dirty_files,
            executable,
            flags,
            with_proofs: options.with_proofs,
        };
        let path = manifest.save()?;

        info!(
            event = "experiment.created",
            model = %manifest.model,
            directory = %manifest.directory.display(),
            manifest = %path.display(),
            "experiment created"
        );
        Ok(manifest)
    }

    /// Load the manifest of an existing experiment.
    pub fn load(directory: &Path) -> Result<ExperimentManifest> {
        ExperimentManifest::load(directory)
    }
}

//! Harness configuration.
//!
//! Defaults are relative to the current directory, which is expected to be the
//! root of the solver project. Every field can be overridden through a
//! `CPBENCH_*` environment variable (see [`HarnessConfig::from_env`]) and the
//! CLI overrides individual fields on top of that.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How to invoke the declarative verifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifierConfig {
    /// Verifier program.
    pub program: String,

    /// Backend selector passed as `--solver <backend>`.
    pub backend: String,

    /// Output fragments that identify a contradiction response. A nonzero
    /// verifier exit carrying one of these rejects the solution instead of
    /// aborting the checking pass.
    pub contradiction_markers: Vec<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            program: "minizinc".to_string(),
            backend: "cp-sat".to_string(),
            contradiction_markers: vec![
                "UNSATISFIABLE".to_string(),
                "model inconsistency detected".to_string(),
            ],
        }
    }
}

/// Paths, programs and limits used by every harness stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessConfig {
    /// Cargo project containing the solver examples and its unit tests.
    pub solver_root: PathBuf,

    /// Benchmark instances, one subdirectory per model.
    pub data_dir: PathBuf,

    /// Verifier model templates, one `<model>.mzn` per model.
    pub models_dir: PathBuf,

    /// Where experiment directories are created.
    pub experiments_dir: PathBuf,

    /// Cargo program used for builds and unit tests.
    pub cargo: String,

    /// Git program used for the working-tree status.
    pub git: String,

    pub verifier: VerifierConfig,

    /// Number of instances solved concurrently. 1 is the sequential schedule.
    pub jobs: usize,

    /// Extra seconds a solver may run past its own time budget before the
    /// harness kills it.
    pub kill_grace_secs: u64,

    /// Time limit for one unit-test invocation during grading.
    pub test_timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            solver_root: PathBuf::from("."),
            data_dir: PathBuf::from("data"),
            models_dir: PathBuf::from("models"),
            experiments_dir: PathBuf::from("experiments"),
            cargo: "cargo".to_string(),
            git: "git".to_string(),
            verifier: VerifierConfig::default(),
            jobs: 1,
            kill_grace_secs: 10,
            test_timeout_secs: 1800,
        }
    }
}

impl HarnessConfig {
    /// Defaults overridden by `CPBENCH_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(root) = std::env::var("CPBENCH_SOLVER_ROOT") {
            config.solver_root = PathBuf::from(&root);
            config.data_dir = config.solver_root.join("data");
            config.models_dir = config.solver_root.join("models");
            config.experiments_dir = config.solver_root.join("experiments");
        }
        if let Ok(dir) = std::env::var("CPBENCH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("CPBENCH_MODELS_DIR") {
            config.models_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("CPBENCH_EXPERIMENTS_DIR") {
            config.experiments_dir = PathBuf::from(dir);
        }
        if let Ok(program) = std::env::var("CPBENCH_VERIFIER") {
            config.verifier.program = program;
        }
        if let Ok(backend) = std::env::var("CPBENCH_VERIFIER_BACKEND") {
            config.verifier.backend = backend;
        }
        if let Some(jobs) = std::env::var("CPBENCH_JOBS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            config.jobs = jobs;
        }

        config
    }

    /// Set the worker-pool size; zero means one worker per available core.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = if jobs == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            jobs
        };
        self
    }

    /// Place every data path under `root`.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join("data"),
            models_dir: root.join("models"),
            experiments_dir: root.join("experiments"),
            solver_root: root,
            ..Self::default()
        }
    }
}

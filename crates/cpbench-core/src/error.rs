//! Error taxonomy for the harness.
//!
//! Every variant here is fatal for the operation that raised it. Recoverable
//! outcomes (wrong solutions, skipped proof stages, failed capabilities) are
//! reported through verdict types instead.

use std::path::PathBuf;

/// Errors produced while validating a grade table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GradeTableError {
    #[error("grade class {class}: contributions sum to {actual}, expected {expected}")]
    ContributionTotal {
        class: String,
        expected: f64,
        actual: f64,
    },

    #[error("grade table maximum is {actual}, expected {expected}")]
    TableTotal { expected: f64, actual: f64 },

    #[error("grade class {class}: duplicate capability {capability}")]
    DuplicateCapability { class: String, capability: String },

    #[error("grade class {class}: capability {capability} has negative points {points}")]
    NegativePoints {
        class: String,
        capability: String,
        points: f64,
    },

    #[error("grade class {class}: model {model} has no propagator sets")]
    NoPropagatorSets { class: String, model: String },

    #[error("grade class {class}: no models to evaluate against")]
    NoModels { class: String },

    #[error("propagator sets list model {model} twice")]
    DuplicateModel { model: String },
}

/// Harness errors.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("experiment directory already exists: {0}")]
    DirectoryCollision(PathBuf),

    #[error("uncommitted changes in the working tree (override with --allow-dirty)")]
    DirtyWorkingTree,

    #[error("git error: {0}")]
    GitFailed(String),

    #[error("build failed for model {model} (exit code {exit_code:?}):\n{output}")]
    BuildFailed {
        model: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("solver executable not found at {0}")]
    ExecutableMissing(PathBuf),

    #[error("invalid manifest {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("verifier failed on {solution} (exit code {exit_code:?}). Command: {command}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    VerifierFailed {
        command: String,
        solution: PathBuf,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("no ground-truth objective recorded for instance {0}")]
    MissingGroundTruth(String),

    #[error("statistics table missing at {0}; parse the run logs first")]
    StatisticsMissing(PathBuf),

    #[error("malformed statistics table {path}: {reason}")]
    StatisticsMalformed { path: PathBuf, reason: String },

    #[error("grade table error: {0}")]
    GradeTable(#[from] GradeTableError),

    #[error("failed to spawn {program}: {source}")]
    ToolSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation interrupted")]
    Interrupted,

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

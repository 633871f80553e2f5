//! Solver build step.

use std::path::{Path, PathBuf};

use tracing::info;

use cpbench_core::{HarnessError, ModelSpec, Result};

use crate::harness::Harness;
use crate::tool::ToolInvocation;

/// Cargo feature that makes the solver validate every explanation.
pub const EXPLANATION_CHECKS_FEATURE: &str = "explanation-checks";

/// File name of a built example on this platform.
pub fn executable_name(example: &str) -> String {
    if cfg!(windows) {
        format!("{example}.exe")
    } else {
        example.to_string()
    }
}

/// `cargo build --release [--features explanation-checks] --example <example>`.
pub fn build_invocation(
    harness: &Harness,
    spec: &ModelSpec,
    explanation_checks: bool,
) -> ToolInvocation {
    let config = harness.config();
    let mut invocation = ToolInvocation::new("build", &config.cargo).args(["build", "--release"]);
    if explanation_checks {
        invocation = invocation.args(["--features", EXPLANATION_CHECKS_FEATURE]);
    }
    invocation
        .args(["--example", spec.example.as_str()])
        .current_dir(&config.solver_root)
}

/// Build the solver for a model and return the path of the built executable.
pub async fn build_solver(
    harness: &Harness,
    spec: &ModelSpec,
    explanation_checks: bool,
) -> Result<PathBuf> {
    let invocation = build_invocation(harness, spec, explanation_checks);
    info!(model = %spec.id, explanation_checks, "building solver");

    let output = harness.executor().execute(&invocation).await?;
    if !output.success() {
        return Err(HarnessError::BuildFailed {
            model: spec.id.clone(),
            exit_code: output.exit_code(),
            output: output.stderr,
        });
    }

    let built = harness
        .config()
        .solver_root
        .join("target")
        .join("release")
        .join("examples")
        .join(executable_name(&spec.example));
    if !built.is_file() {
        return Err(HarnessError::ExecutableMissing(built));
    }
    Ok(built)
}

/// Copy a built executable into `directory`, keeping its file name.
pub fn install_executable(built: &Path, directory: &Path) -> Result<PathBuf> {
    let name = built
        .file_name()
        .ok_or_else(|| HarnessError::ExecutableMissing(built.to_path_buf()))?;
    let installed = directory.join(name);
    std::fs::copy(built, &installed)?;
    Ok(installed)
}

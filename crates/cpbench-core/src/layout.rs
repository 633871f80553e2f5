//! On-disk layout of experiments and runs.

use std::path::{Path, PathBuf};

use crate::error::{HarnessError, Result};

/// Subdirectory of an experiment holding the runs.
pub const RUNS_DIR: &str = "runs";

/// Statistics table written by the aggregator, one per experiment.
pub const STATISTICS_FILE: &str = "statistics.csv";

pub const OUTPUT_LOG: &str = "output.log";
pub const OUTPUT_ERR: &str = "output.err";
pub const SCAFFOLD: &str = "scaffold.drcp";
pub const PROCESS_LOG: &str = "process.log";
pub const PROCESS_ERR: &str = "process.err";
pub const FULL_PROOF: &str = "full_proof.drcp";
pub const CHECKING_LOG: &str = "checking.log";
pub const CHECKING_ERR: &str = "checking.err";
pub const CHECKING_STATUS: &str = "checking_status";
pub const SOLUTIONS_DIR: &str = "solutions_dzn";

/// Paths of the artifacts belonging to one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    dir: PathBuf,
}

impl RunLayout {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Instance name, which is the run directory's base name.
    pub fn instance(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn output_log(&self) -> PathBuf {
        self.dir.join(OUTPUT_LOG)
    }

    pub fn output_err(&self) -> PathBuf {
        self.dir.join(OUTPUT_ERR)
    }

    pub fn scaffold(&self) -> PathBuf {
        self.dir.join(SCAFFOLD)
    }

    pub fn process_log(&self) -> PathBuf {
        self.dir.join(PROCESS_LOG)
    }

    pub fn process_err(&self) -> PathBuf {
        self.dir.join(PROCESS_ERR)
    }

    pub fn full_proof(&self) -> PathBuf {
        self.dir.join(FULL_PROOF)
    }

    pub fn checking_log(&self) -> PathBuf {
        self.dir.join(CHECKING_LOG)
    }

    pub fn checking_err(&self) -> PathBuf {
        self.dir.join(CHECKING_ERR)
    }

    pub fn checking_status(&self) -> PathBuf {
        self.dir.join(CHECKING_STATUS)
    }

    pub fn solutions_dir(&self) -> PathBuf {
        self.dir.join(SOLUTIONS_DIR)
    }

    /// Path of the materialised solution with the given index.
    pub fn solution_file(&self, index: usize, extension: &str) -> PathBuf {
        self.solutions_dir().join(format!("sol-{index}.{extension}"))
    }

    /// Read the solver log. A run whose log was never written reads as empty.
    pub fn read_output_log(&self) -> Result<String> {
        read_optional(&self.output_log()).map(Option::unwrap_or_default)
    }

    /// Read the proof-processing log, if the process stage ran.
    pub fn read_process_log(&self) -> Result<Option<String>> {
        read_optional(&self.process_log())
    }

    /// Persist the exit code of the proof checker verbatim.
    pub fn write_checking_status(&self, exit_code: i32) -> Result<()> {
        std::fs::write(self.checking_status(), exit_code.to_string())?;
        Ok(())
    }

    /// Read the stored proof-checker exit code, if the check stage ran.
    pub fn read_checking_status(&self) -> Result<Option<i32>> {
        let path = self.checking_status();
        match read_optional(&path)? {
            None => Ok(None),
            Some(content) => content.trim().parse().map(Some).map_err(|_| {
                HarnessError::StatisticsMalformed {
                    path,
                    reason: format!("checking status {:?} is not an integer", content.trim()),
                }
            }),
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

//! Correctness verdicts per run and per experiment.

use serde::{Deserialize, Serialize};

/// Error category of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunError {
    /// At least one reported solution was rejected by the verifier.
    WrongSolution,
    /// The run claimed an optimum that differs from the ground truth.
    WrongOptimality,
    Both,
}

impl RunError {
    pub fn wrong_solution(&self) -> bool {
        matches!(self, RunError::WrongSolution | RunError::Both)
    }

    pub fn wrong_optimality(&self) -> bool {
        matches!(self, RunError::WrongOptimality | RunError::Both)
    }
}

/// A claimed optimum that does not match the ground truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimalityMismatch {
    pub expected: i64,

    /// `None` when the log carried no integral objective.
    pub reported: Option<i64>,
}

/// Checking result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunVerdict {
    pub instance: String,

    /// Number of solutions handed to the verifier.
    pub solutions_checked: usize,

    /// File stems of solutions the verifier rejected.
    pub rejected_solutions: Vec<String>,

    pub optimality_mismatch: Option<OptimalityMismatch>,
}

impl RunVerdict {
    pub fn error(&self) -> Option<RunError> {
        match (
            !self.rejected_solutions.is_empty(),
            self.optimality_mismatch.is_some(),
        ) {
            (true, true) => Some(RunError::Both),
            (true, false) => Some(RunError::WrongSolution),
            (false, true) => Some(RunError::WrongOptimality),
            (false, false) => None,
        }
    }
}

/// Experiment-level checking report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub verdicts: Vec<RunVerdict>,
}

impl CheckReport {
    pub fn new(verdicts: Vec<RunVerdict>) -> Self {
        Self { verdicts }
    }

    pub fn total_runs(&self) -> usize {
        self.verdicts.len()
    }

    /// Instances with at least one rejected solution.
    pub fn wrong_solution_instances(&self) -> Vec<&str> {
        self.instances_where(RunError::wrong_solution)
    }

    /// Instances with an incorrect optimality claim.
    pub fn wrong_optimality_instances(&self) -> Vec<&str> {
        self.instances_where(RunError::wrong_optimality)
    }

    fn instances_where(&self, pred: fn(&RunError) -> bool) -> Vec<&str> {
        self.verdicts
            .iter()
            .filter(|v| v.error().as_ref().map(pred).unwrap_or(false))
            .map(|v| v.instance.as_str())
            .collect()
    }

    /// Whether every run passed both checks.
    pub fn passed(&self) -> bool {
        self.verdicts.iter().all(|v| v.error().is_none())
    }

    /// Human-readable summary naming every offending instance.
    pub fn render_summary(&self) -> String {
        let total = self.total_runs();
        let mut out = String::new();

        let wrong_solution = self.wrong_solution_instances();
        if !wrong_solution.is_empty() {
            out.push_str(&format!(
                "{}/{} instances reported at least one incorrect solution\n",
                wrong_solution.len(),
                total
            ));
            for instance in &wrong_solution {
                out.push_str(&format!("\t{instance}\n"));
            }
        }

        let wrong_optimality = self.wrong_optimality_instances();
        if !wrong_optimality.is_empty() {
            out.push_str(&format!(
                "{}/{} instances reported incorrect optimality\n",
                wrong_optimality.len(),
                total
            ));
            for instance in &wrong_optimality {
                out.push_str(&format!("\t{instance}\n"));
            }
        }

        if out.is_empty() {
            out.push_str(&format!("All {total} runs passed the correctness checks\n"));
        }
        out
    }
}

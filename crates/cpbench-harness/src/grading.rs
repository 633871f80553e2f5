//! Grading engine: unit tests plus a full solve-and-check cycle per graded
//! capability, scored all-or-nothing against a validated grade table.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use cpbench_core::{
    GradeClass, GradeTable, GradeTask, HarnessError, Result, ValidGradeTable,
};

use crate::checker::CorrectnessChecker;
use crate::context::{CreateOptions, ExperimentContext};
use crate::harness::Harness;
use crate::runner::InstanceRunner;
use crate::tool::ToolInvocation;

/// Why a capability earned nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityFailure {
    /// The scoped unit tests failed; carries the test runner's output.
    UnitTests { output: String },
    /// The solver could not be built or the experiment not created.
    Setup { reason: String },
    /// At least one run reported a wrong solution or optimum.
    Incorrect { summary: String },
}

impl CapabilityFailure {
    /// Text shown under a failed capability.
    pub fn details(&self) -> &str {
        match self {
            CapabilityFailure::UnitTests { output } => output,
            CapabilityFailure::Setup { reason } => reason,
            CapabilityFailure::Incorrect { summary } => summary,
        }
    }
}

/// Result of one graded evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityResult {
    pub task: GradeTask,
    pub earned: f64,
    pub failure: Option<CapabilityFailure>,

    /// Experiment directory of the solve-and-check cycle, when one ran.
    pub experiment: Option<PathBuf>,
}

impl CapabilityResult {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Final grading report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeReport {
    pub id: Uuid,
    pub table: String,
    pub harness_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<CapabilityResult>,
    pub achieved: f64,
    pub maximum: f64,
}

impl GradeReport {
    /// `achieved/maximum`.
    pub fn score_line(&self) -> String {
        format!(
            "Grade = {}/{}",
            format_points(self.achieved),
            format_points(self.maximum)
        )
    }

    /// Per-capability pass/fail lines, failure details inline, then the score.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            let task = &result.task;
            let label = match task.class {
                GradeClass::Propagator => {
                    format!("{} {} [{}]", task.class, task.capability, task.model)
                }
                _ => format!(
                    "{} {} [{}: {}]",
                    task.class,
                    task.capability,
                    task.model,
                    task.propagators.join(", ")
                ),
            };
            match &result.failure {
                None => out.push_str(&format!(
                    "✓ {label}: {}/{}\n",
                    format_points(result.earned),
                    format_points(task.points)
                )),
                Some(failure) => {
                    out.push_str(&format!("✗ {label}: 0/{}\n", format_points(task.points)));
                    for line in failure.details().lines() {
                        out.push_str("    ");
                        out.push_str(line);
                        out.push('\n');
                    }
                }
            }
        }
        out.push_str(&self.score_line());
        out.push('\n');
        out
    }
}

fn format_points(points: f64) -> String {
    if points.fract() == 0.0 {
        format!("{points:.0}")
    } else {
        format!("{points:.2}")
    }
}

#[derive(Debug, Clone)]
struct UnitTestOutcome {
    passed: bool,
    output: String,
}

/// Grades capabilities of the solver project against one grade table.
pub struct GradingEngine {
    harness: Harness,
    table: ValidGradeTable,
}

impl GradingEngine {
    /// Validate the table and build the engine. An invalid table, or one
    /// naming a model the registry lacks, fails here before any tool is started.
    pub fn new(harness: Harness, table: GradeTable) -> Result<Self> {
        let table = table.validate()?;
        for task in table.tasks() {
            harness.registry().get(&task.model)?;
        }
        Ok(Self { harness, table })
    }

    pub fn table(&self) -> &ValidGradeTable {
        &self.table
    }

    /// `cargo test <filter>` in the solver project.
    pub fn test_invocation(&self, test_filter: &str) -> ToolInvocation {
        let config = self.harness.config();
        ToolInvocation::new("test", &config.cargo)
            .args(["test", test_filter])
            .current_dir(&config.solver_root)
            .timeout(Duration::from_secs(config.test_timeout_secs))
    }

    async fn run_unit_tests(&self, test_filter: &str) -> Result<UnitTestOutcome> {
        let output = self
            .harness
            .executor()
            .execute(&self.test_invocation(test_filter))
            .await?;
        let mut text = output.stdout.clone();
        if !output.success() && !output.stderr.is_empty() {
            text.push_str(&output.stderr);
        }
        if output.timed_out() {
            text.push_str("test run timed out\n");
        }
        Ok(UnitTestOutcome {
            passed: output.success(),
            output: text,
        })
    }

    /// Create an experiment for the task, solve every instance and check the
    /// runs. `Ok(Err(..))` is a scored failure; `Err(..)` is fatal.
    async fn solve_and_check(
        &self,
        task: &GradeTask,
    ) -> Result<std::result::Result<PathBuf, CapabilityFailure>> {
        let table = self.table.table();
        let options = CreateOptions {
            model: task.model.clone(),
            timeout: table.timeout,
            flags: task.flags.clone(),
            with_proofs: false,
            allow_dirty: true,
            explanation_checks: table.explanation_checks,
        };

        let manifest = match ExperimentContext::create(&self.harness, &options).await {
            Ok(manifest) => manifest,
            Err(
                e @ (HarnessError::BuildFailed { .. }
                | HarnessError::ExecutableMissing(_)
                | HarnessError::DirectoryCollision(_)),
            ) => {
                return Ok(Err(CapabilityFailure::Setup {
                    reason: e.to_string(),
                }))
            }
            Err(e) => return Err(e),
        };

        InstanceRunner::run_all(&self.harness, &manifest).await?;
        let report = CorrectnessChecker::check_experiment(&self.harness, &manifest).await?;
        if report.passed() {
            Ok(Ok(manifest.directory))
        } else {
            Ok(Err(CapabilityFailure::Incorrect {
                summary: report.render_summary(),
            }))
        }
    }

    async fn grade_task(
        &self,
        task: &GradeTask,
        unit_tests: &mut HashMap<String, UnitTestOutcome>,
    ) -> Result<CapabilityResult> {
        let tests = match unit_tests.get(&task.test_filter) {
            Some(outcome) => outcome.clone(),
            None => {
                let outcome = self.run_unit_tests(&task.test_filter).await?;
                unit_tests.insert(task.test_filter.clone(), outcome.clone());
                outcome
            }
        };

        let (earned, failure, experiment) = if !tests.passed {
            (
                0.0,
                Some(CapabilityFailure::UnitTests {
                    output: tests.output,
                }),
                None,
            )
        } else {
            match self.solve_and_check(task).await? {
                Ok(directory) => (task.points, None, Some(directory)),
                Err(failure) => (0.0, Some(failure), None),
            }
        };

        let result = CapabilityResult {
            task: task.clone(),
            earned,
            failure,
            experiment,
        };
        if result.passed() {
            info!(
                event = "grade.capability",
                class = %task.class,
                capability = %task.capability,
                model = %task.model,
                earned,
                "capability passed"
            );
        } else {
            warn!(
                event = "grade.capability",
                class = %task.class,
                capability = %task.capability,
                model = %task.model,
                earned,
                "capability failed"
            );
        }
        Ok(result)
    }

    /// Grade every task of the table in order. A failing capability scores
    /// zero and grading continues; harness faults abort.
    pub async fn grade(&self) -> Result<GradeReport> {
        let started_at = Utc::now();
        let tasks = self.table.tasks();
        info!(table = %self.table.table().name, tasks = tasks.len(), "grading started");

        let mut unit_tests = HashMap::new();
        let mut results = Vec::with_capacity(tasks.len());
        for task in &tasks {
            results.push(self.grade_task(task, &mut unit_tests).await?);
        }

        let achieved = results.iter().map(|r| r.earned).sum();
        let report = GradeReport {
            id: Uuid::new_v4(),
            table: self.table.table().name.clone(),
            harness_version: cpbench_core::VERSION.to_string(),
            started_at,
            finished_at: Utc::now(),
            results,
            achieved,
            maximum: self.table.maximum(),
        };
        info!(
            event = "grade.finished",
            achieved = report.achieved,
            maximum = report.maximum,
            "grading finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedExecutor;
    use cpbench_core::{HarnessConfig, ModelRegistry};
    use std::sync::Arc;

    fn engine(table: GradeTable) -> Result<(GradingEngine, Arc<ScriptedExecutor>)> {
        let executor = Arc::new(ScriptedExecutor::new());
        let config = HarnessConfig::rooted_at("/solver");
        let registry = ModelRegistry::builtin(&config);
        let harness = Harness::new(executor.clone(), config, registry);
        Ok((GradingEngine::new(harness, table)?, executor))
    }

    #[test]
    fn test_test_invocation() {
        let (engine, _) = engine(GradeTable::assignment_1()).unwrap();
        let invocation = engine.test_invocation("tests::propagators::element");
        assert_eq!(invocation.program, "cargo");
        assert_eq!(invocation.args, vec!["test", "tests::propagators::element"]);
        assert_eq!(invocation.current_dir, Some(PathBuf::from("/solver")));
        assert_eq!(invocation.timeout, Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_invalid_table_is_rejected_without_tools() {
        let mut table = GradeTable::assignment_2();
        table.conflict_analysis.entries[0].points = 4.0;
        match engine(table) {
            Err(HarnessError::GradeTable(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("mis-totalled table accepted"),
        }
    }

    #[test]
    fn test_unknown_model_is_rejected_without_tools() {
        let mut table = GradeTable::assignment_1();
        table.propagators.entries[0].model = "tspp".to_string();
        let executor = Arc::new(ScriptedExecutor::new());
        let config = HarnessConfig::rooted_at("/solver");
        let registry = ModelRegistry::builtin(&config);
        let harness = Harness::new(executor.clone(), config, registry);

        match GradingEngine::new(harness, table) {
            Err(HarnessError::UnknownModel(model)) => assert_eq!(model, "tspp"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("table with unknown model accepted"),
        }
        assert_eq!(executor.call_count(), 0);
    }

    #[test]
    fn test_unknown_strategy_model_is_rejected() {
        let mut table = GradeTable::assignment_2();
        table.propagator_sets[1].model = "jobshop".to_string();
        assert!(matches!(engine(table), Err(HarnessError::UnknownModel(m)) if m == "jobshop"));
    }

    fn sample_report() -> GradeReport {
        let task = GradeTask {
            class: GradeClass::Propagator,
            capability: "element".to_string(),
            test_filter: "tests::propagators::element".to_string(),
            model: "tsp".to_string(),
            propagators: vec!["element".to_string()],
            flags: vec!["-G".to_string(), "element".to_string()],
            points: 7.0,
        };
        let failed = CapabilityResult {
            task: GradeTask {
                capability: "maximum".to_string(),
                model: "rcpsp".to_string(),
                points: 4.0,
                ..task.clone()
            },
            earned: 0.0,
            failure: Some(CapabilityFailure::UnitTests {
                output: "test maximum::bounds ... FAILED\n".to_string(),
            }),
            experiment: None,
        };
        let passed = CapabilityResult {
            task,
            earned: 7.0,
            failure: None,
            experiment: Some(PathBuf::from("/exp")),
        };
        GradeReport {
            id: Uuid::new_v4(),
            table: "assignment-1".to_string(),
            harness_version: cpbench_core::VERSION.to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            results: vec![passed, failed],
            achieved: 7.0,
            maximum: 45.0,
        }
    }

    #[test]
    fn test_report_renders_failures_inline() {
        let rendered = sample_report().render();
        assert!(rendered.contains("✓ propagators element [tsp]: 7/7"));
        assert!(rendered.contains("✗ propagators maximum [rcpsp]: 0/4"));
        assert!(rendered.contains("    test maximum::bounds ... FAILED"));
        assert!(rendered.trim_end().ends_with("Grade = 7/45"));
    }

    #[test]
    fn test_fractional_points_format() {
        assert_eq!(format_points(1.25), "1.25");
        assert_eq!(format_points(45.0), "45");
    }

    #[test]
    fn test_report_serializes() {
        let json = serde_json::to_value(sample_report()).unwrap();
        assert_eq!(json["table"], "assignment-1");
        assert_eq!(json["results"][1]["failure"]["kind"], "unit_tests");
    }
}

//! cpbench harness
//!
//! Async pipeline stages built on one tool-execution capability: experiment
//! creation, instance runs, correctness checking, statistics aggregation,
//! the proof pipeline and grading.

pub mod aggregate;
pub mod build;
pub mod checker;
pub mod context;
pub mod fakes;
pub mod git;
pub mod grading;
pub mod harness;
pub mod proof;
pub mod runner;
pub mod tool;

pub use aggregate::StatisticsAggregator;
pub use build::{build_solver, executable_name, install_executable};
pub use checker::{materialize_solutions, CorrectnessChecker};
pub use context::{experiment_dir_name, CreateOptions, ExperimentContext};
pub use git::{capture_head_sha, has_dirty_files, working_tree_state, WorkingTreeState};
pub use grading::{CapabilityFailure, CapabilityResult, GradeReport, GradingEngine};
pub use harness::Harness;
pub use proof::{ProofPipeline, ProofStage, ProofStepOutcome, ProofStepReport};
pub use runner::{InstanceRunner, RunSummary};
pub use tool::{OutputSink, ProcessExecutor, ToolExecutor, ToolInvocation, ToolOutput, ToolStatus};

//! cpbench core library
//!
//! Synchronous data model shared by the harness stages: experiment manifests
//! and directory layout, the solver-log grammar, the statistics schema,
//! correctness verdicts and grade tables.

pub mod config;
pub mod error;
pub mod grade_table;
pub mod ground_truth;
pub mod layout;
pub mod manifest;
pub mod registry;
pub mod solution_log;
pub mod statistics;
pub mod telemetry;
pub mod verdict;

pub use config::{HarnessConfig, VerifierConfig};
pub use error::{GradeTableError, HarnessError, Result};
pub use grade_table::{
    ClassTable, GradeClass, GradeTable, GradeTask, ModelSets, PropagatorEntry, StrategyEntry,
    ValidGradeTable,
};
pub use ground_truth::GroundTruth;
pub use layout::RunLayout;
pub use manifest::{ExperimentManifest, MANIFEST_FILE};
pub use registry::{ModelRegistry, ModelSpec, GROUND_TRUTH_FILE};
pub use solution_log::{
    parse_log, parse_statistics, RunOutcome, RunStatus, SolutionBlock, StatValue, Statistics,
};
pub use statistics::{
    optimal_instances, read_table, write_table, ProofCheckStatus, StatisticsRow, TableRecord,
};
pub use telemetry::init_tracing;
pub use verdict::{CheckReport, OptimalityMismatch, RunError, RunVerdict};

/// Crate version, recorded in grade reports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

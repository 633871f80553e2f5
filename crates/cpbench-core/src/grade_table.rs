//! Grade tables: which capabilities are graded, how, and for how many points.
//!
//! A [`GradeTable`] is plain configuration. It only becomes usable for grading
//! after [`GradeTable::validate`] turns it into a [`ValidGradeTable`], which
//! checks every class total against its declared maximum.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GradeTableError, HarnessError, Result};

const TOLERANCE: f64 = 1e-9;

/// The graded capability classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeClass {
    Propagator,
    ConflictAnalysis,
    Minimisation,
}

impl GradeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeClass::Propagator => "propagators",
            GradeClass::ConflictAnalysis => "conflict_analysis",
            GradeClass::Minimisation => "minimisation",
        }
    }
}

impl fmt::Display for GradeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A propagator graded on one model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropagatorEntry {
    /// Name passed to the solver with `-G`.
    pub name: String,

    /// Unit-test filter, e.g. `tests::propagators::element`.
    pub test_filter: String,

    pub model: String,

    pub points: f64,
}

/// A search strategy graded across every (model, propagator set).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyEntry {
    pub name: String,
    pub test_filter: String,
    pub points: f64,
}

/// The propagator sets a model is evaluated with when grading strategies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSets {
    pub model: String,
    pub sets: Vec<Vec<String>>,
}

impl ModelSets {
    pub fn new(model: &str, sets: Vec<Vec<String>>) -> Self {
        Self {
            model: model.to_string(),
            sets,
        }
    }
}

/// One class of a grade table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassTable<E> {
    /// Declared total of the class.
    pub maximum: f64,

    /// Solver flags appended to every evaluation of this class.
    #[serde(default)]
    pub extra_flags: Vec<String>,

    #[serde(default = "Vec::new")]
    pub entries: Vec<E>,
}

impl<E> ClassTable<E> {
    pub fn empty() -> Self {
        Self {
            maximum: 0.0,
            extra_flags: Vec::new(),
            entries: Vec::new(),
        }
    }
}

/// Declarative grading configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradeTable {
    pub name: String,

    /// Documented maximum of the whole table.
    pub maximum: f64,

    /// Per-instance solver time budget in seconds.
    pub timeout: u64,

    /// Build the solver with the `explanation-checks` feature.
    #[serde(default)]
    pub explanation_checks: bool,

    pub propagators: ClassTable<PropagatorEntry>,

    #[serde(default = "ClassTable::empty")]
    pub conflict_analysis: ClassTable<StrategyEntry>,

    #[serde(default = "ClassTable::empty")]
    pub minimisation: ClassTable<StrategyEntry>,

    /// Models strategies are evaluated on, in evaluation order.
    #[serde(default)]
    pub propagator_sets: Vec<ModelSets>,

    /// Conflict analysis pinned while grading minimisation.
    #[serde(default = "default_baseline")]
    pub baseline_conflict_analysis: String,
}

fn default_baseline() -> String {
    "unique-implication-point".to_string()
}

/// One unit of grading work: a capability evaluated once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeTask {
    pub class: GradeClass,
    pub capability: String,
    pub test_filter: String,
    pub model: String,

    /// Propagators enabled for this evaluation.
    pub propagators: Vec<String>,

    /// Full solver flag list.
    pub flags: Vec<String>,

    /// Points earned if the evaluation passes.
    pub points: f64,
}

impl GradeTable {
    /// Load a table from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(HarnessError::from)
    }

    /// Look up a built-in table by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "assignment-1" => Some(Self::assignment_1()),
            "assignment-2" => Some(Self::assignment_2()),
            _ => None,
        }
    }

    /// Propagators only, worth 45 points.
    pub fn assignment_1() -> Self {
        let propagators = vec![
            propagator("dfs-circuit", "circuit::dfs", "tsp", 8.0),
            propagator("forward-checking-circuit", "circuit::forward_checking", "tsp", 4.0),
            propagator("all-different", "all_different", "tsp", 10.0),
            propagator("element", "element", "tsp", 7.0),
            propagator("time-table-cumulative", "cumulative::time_table", "rcpsp", 4.0),
            propagator(
                "energetic-reasoning-cumulative",
                "cumulative::energetic_reasoning",
                "rcpsp",
                8.0,
            ),
            propagator("maximum", "maximum", "rcpsp", 4.0),
        ];

        Self {
            name: "assignment-1".to_string(),
            maximum: 45.0,
            timeout: 20,
            explanation_checks: false,
            propagators: ClassTable {
                maximum: 45.0,
                extra_flags: Vec::new(),
                entries: propagators,
            },
            conflict_analysis: ClassTable::empty(),
            minimisation: ClassTable::empty(),
            propagator_sets: Vec::new(),
            baseline_conflict_analysis: default_baseline(),
        }
    }

    /// Propagators (25), conflict analysis (10) and minimisation (10), with
    /// explanation checking enabled.
    pub fn assignment_2() -> Self {
        let propagators = vec![
            propagator("forward-checking-circuit", "circuit::forward_checking", "tsp", 3.0),
            propagator("all-different", "all_different", "tsp", 6.0),
            propagator("element", "element", "tsp", 4.0),
            propagator("time-table-cumulative", "cumulative::time_table", "rcpsp", 3.0),
            propagator(
                "energetic-reasoning-cumulative",
                "cumulative::energetic_reasoning",
                "rcpsp",
                6.0,
            ),
            propagator("maximum", "maximum", "rcpsp", 3.0),
        ];

        let propagator_sets = vec![
            ModelSets::new(
                "tsp",
                vec![strings(&["forward-checking-circuit", "all-different", "element"])],
            ),
            ModelSets::new(
                "rcpsp",
                vec![
                    strings(&["time-table-cumulative", "maximum"]),
                    strings(&["energetic-reasoning-cumulative", "maximum"]),
                ],
            ),
        ];

        Self {
            name: "assignment-2".to_string(),
            maximum: 45.0,
            timeout: 20,
            explanation_checks: true,
            propagators: ClassTable {
                maximum: 25.0,
                extra_flags: strings(&["-E", "-R"]),
                entries: propagators,
            },
            conflict_analysis: ClassTable {
                maximum: 10.0,
                extra_flags: Vec::new(),
                entries: vec![
                    strategy("all-decision", "conflict_analysis::all_decision_learning", 5.0),
                    strategy(
                        "unique-implication-point",
                        "conflict_analysis::unique_implication_point",
                        5.0,
                    ),
                ],
            },
            minimisation: ClassTable {
                maximum: 10.0,
                extra_flags: Vec::new(),
                entries: vec![
                    strategy("recursive", "minimisation::recursive_minimisation", 5.0),
                    strategy("semantic", "minimisation::semantic_minimisation", 5.0),
                ],
            },
            propagator_sets,
            baseline_conflict_analysis: default_baseline(),
        }
    }

    /// Check every class total against its declared maximum.
    pub fn validate(self) -> std::result::Result<ValidGradeTable, GradeTableError> {
        check_class(
            GradeClass::Propagator,
            self.propagators.maximum,
            self.propagators.entries.iter().map(|e| (e.name.as_str(), e.points)),
        )?;
        check_class(
            GradeClass::ConflictAnalysis,
            self.conflict_analysis.maximum,
            self.conflict_analysis
                .entries
                .iter()
                .map(|e| (e.name.as_str(), e.points)),
        )?;
        check_class(
            GradeClass::Minimisation,
            self.minimisation.maximum,
            self.minimisation.entries.iter().map(|e| (e.name.as_str(), e.points)),
        )?;

        let declared = self.propagators.maximum
            + self.conflict_analysis.maximum
            + self.minimisation.maximum;
        if (declared - self.maximum).abs() > TOLERANCE {
            return Err(GradeTableError::TableTotal {
                expected: self.maximum,
                actual: declared,
            });
        }

        let mut models = BTreeSet::new();
        for entry in &self.propagator_sets {
            if !models.insert(entry.model.as_str()) {
                return Err(GradeTableError::DuplicateModel {
                    model: entry.model.clone(),
                });
            }
        }

        for (class, has_entries) in [
            (
                GradeClass::ConflictAnalysis,
                !self.conflict_analysis.entries.is_empty(),
            ),
            (GradeClass::Minimisation, !self.minimisation.entries.is_empty()),
        ] {
            if !has_entries {
                continue;
            }
            if self.propagator_sets.is_empty() {
                return Err(GradeTableError::NoModels {
                    class: class.to_string(),
                });
            }
            if let Some(empty) = self.propagator_sets.iter().find(|m| m.sets.is_empty()) {
                return Err(GradeTableError::NoPropagatorSets {
                    class: class.to_string(),
                    model: empty.model.clone(),
                });
            }
        }

        Ok(ValidGradeTable { table: self })
    }
}

fn check_class<'a>(
    class: GradeClass,
    maximum: f64,
    entries: impl Iterator<Item = (&'a str, f64)>,
) -> std::result::Result<(), GradeTableError> {
    let mut seen = BTreeSet::new();
    let mut total = 0.0;
    for (name, points) in entries {
        if !seen.insert(name) {
            return Err(GradeTableError::DuplicateCapability {
                class: class.to_string(),
                capability: name.to_string(),
            });
        }
        if points < 0.0 {
            return Err(GradeTableError::NegativePoints {
                class: class.to_string(),
                capability: name.to_string(),
                points,
            });
        }
        total += points;
    }
    if (total - maximum).abs() > TOLERANCE {
        return Err(GradeTableError::ContributionTotal {
            class: class.to_string(),
            expected: maximum,
            actual: total,
        });
    }
    Ok(())
}

fn propagator(name: &str, module: &str, model: &str, points: f64) -> PropagatorEntry {
    PropagatorEntry {
        name: name.to_string(),
        test_filter: format!("tests::propagators::{module}"),
        model: model.to_string(),
        points,
    }
}

fn strategy(name: &str, module: &str, points: f64) -> StrategyEntry {
    StrategyEntry {
        name: name.to_string(),
        test_filter: format!("tests::{module}"),
        points,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn enable_propagators(propagators: &[String]) -> Vec<String> {
    propagators
        .iter()
        .flat_map(|p| ["-G".to_string(), p.clone()])
        .collect()
}

/// A grade table whose totals have been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidGradeTable {
    table: GradeTable,
}

impl ValidGradeTable {
    pub fn table(&self) -> &GradeTable {
        &self.table
    }

    pub fn maximum(&self) -> f64 {
        self.table.maximum
    }

    /// Share of a strategy's points earned by one (model, propagator set)
    /// evaluation: split evenly over the models, then over the model's sets.
    pub fn strategy_share(&self, points: f64, model: &str) -> f64 {
        let models = self.table.propagator_sets.len();
        let sets = self
            .table
            .propagator_sets
            .iter()
            .find(|m| m.model == model)
            .map(|m| m.sets.len())
            .unwrap_or(0);
        if models == 0 || sets == 0 {
            return 0.0;
        }
        points / sets as f64 / models as f64
    }

    /// Every evaluation the table asks for, in grading order: propagators,
    /// then conflict analysis, then minimisation.
    pub fn tasks(&self) -> Vec<GradeTask> {
        let table = &self.table;
        let mut tasks = Vec::new();

        for entry in &table.propagators.entries {
            let propagators = vec![entry.name.clone()];
            let mut flags = enable_propagators(&propagators);
            flags.extend(table.propagators.extra_flags.iter().cloned());
            tasks.push(GradeTask {
                class: GradeClass::Propagator,
                capability: entry.name.clone(),
                test_filter: entry.test_filter.clone(),
                model: entry.model.clone(),
                propagators,
                flags,
                points: entry.points,
            });
        }

        for entry in &table.conflict_analysis.entries {
            for ModelSets { model, sets } in &table.propagator_sets {
                for set in sets {
                    let mut flags = enable_propagators(set);
                    flags.extend(["-C".to_string(), entry.name.clone()]);
                    flags.extend(table.conflict_analysis.extra_flags.iter().cloned());
                    tasks.push(GradeTask {
                        class: GradeClass::ConflictAnalysis,
                        capability: entry.name.clone(),
                        test_filter: entry.test_filter.clone(),
                        model: model.clone(),
                        propagators: set.clone(),
                        flags,
                        points: self.strategy_share(entry.points, model),
                    });
                }
            }
        }

        for entry in &table.minimisation.entries {
            for ModelSets { model, sets } in &table.propagator_sets {
                for set in sets {
                    let mut flags = enable_propagators(set);
                    flags.extend([
                        "-C".to_string(),
                        table.baseline_conflict_analysis.clone(),
                        "-M".to_string(),
                        entry.name.clone(),
                    ]);
                    flags.extend(table.minimisation.extra_flags.iter().cloned());
                    tasks.push(GradeTask {
                        class: GradeClass::Minimisation,
                        capability: entry.name.clone(),
                        test_filter: entry.test_filter.clone(),
                        model: model.clone(),
                        propagators: set.clone(),
                        flags,
                        points: self.strategy_share(entry.points, model),
                    });
                }
            }
        }

        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_validate() {
        for name in ["assignment-1", "assignment-2"] {
            let table = GradeTable::builtin(name).unwrap();
            let valid = table.validate().unwrap();
            assert_eq!(valid.maximum(), 45.0);
        }
        assert!(GradeTable::builtin("assignment-3").is_none());
    }

    #[test]
    fn test_mis_totalled_class_is_rejected() {
        let mut table = GradeTable::assignment_1();
        table.propagators.entries[0].points = 9.0;
        let err = table.validate().unwrap_err();
        assert_eq!(
            err,
            GradeTableError::ContributionTotal {
                class: "propagators".to_string(),
                expected: 45.0,
                actual: 46.0,
            }
        );
    }

    #[test]
    fn test_table_total_must_match_classes() {
        let mut table = GradeTable::assignment_2();
        table.maximum = 50.0;
        assert!(matches!(
            table.validate(),
            Err(GradeTableError::TableTotal { .. })
        ));
    }

    #[test]
    fn test_duplicate_capability_is_rejected() {
        let mut table = GradeTable::assignment_2();
        table.minimisation.entries[1].name = "recursive".to_string();
        assert!(matches!(
            table.validate(),
            Err(GradeTableError::DuplicateCapability { .. })
        ));
    }

    #[test]
    fn test_strategies_need_propagator_sets() {
        let mut table = GradeTable::assignment_2();
        table.propagator_sets.push(ModelSets::new("jobshop", Vec::new()));
        assert!(matches!(
            table.validate(),
            Err(GradeTableError::NoPropagatorSets { model, .. }) if model == "jobshop"
        ));
    }

    #[test]
    fn test_duplicate_model_is_rejected() {
        let mut table = GradeTable::assignment_2();
        let tsp = table.propagator_sets[0].clone();
        table.propagator_sets.push(tsp);
        assert_eq!(
            table.validate().unwrap_err(),
            GradeTableError::DuplicateModel {
                model: "tsp".to_string()
            }
        );
    }

    #[test]
    fn test_strategy_tasks_follow_declared_model_order() {
        let valid = GradeTable::assignment_2().validate().unwrap();
        let models: Vec<_> = valid
            .tasks()
            .into_iter()
            .filter(|t| t.class == GradeClass::ConflictAnalysis && t.capability == "all-decision")
            .map(|t| t.model)
            .collect();
        assert_eq!(models, vec!["tsp", "rcpsp", "rcpsp"]);
    }

    #[test]
    fn test_strategy_shares_split_over_models_and_sets() {
        let valid = GradeTable::assignment_2().validate().unwrap();
        // tsp has one set, rcpsp two; two models.
        assert!((valid.strategy_share(5.0, "tsp") - 2.5).abs() < 1e-12);
        assert!((valid.strategy_share(5.0, "rcpsp") - 1.25).abs() < 1e-12);
        assert_eq!(valid.strategy_share(5.0, "jobshop"), 0.0);
    }

    #[test]
    fn test_assignment_2_task_flags() {
        let valid = GradeTable::assignment_2().validate().unwrap();
        let tasks = valid.tasks();
        // 6 propagators + 2 strategies * 3 evaluations * 2 classes.
        assert_eq!(tasks.len(), 6 + 6 + 6);

        let element = tasks
            .iter()
            .find(|t| t.class == GradeClass::Propagator && t.capability == "element")
            .unwrap();
        assert_eq!(element.flags, vec!["-G", "element", "-E", "-R"]);
        assert_eq!(element.test_filter, "tests::propagators::element");

        let recursive_tsp = tasks
            .iter()
            .find(|t| {
                t.class == GradeClass::Minimisation && t.capability == "recursive" && t.model == "tsp"
            })
            .unwrap();
        assert_eq!(
            recursive_tsp.flags,
            vec![
                "-G",
                "forward-checking-circuit",
                "-G",
                "all-different",
                "-G",
                "element",
                "-C",
                "unique-implication-point",
                "-M",
                "recursive"
            ]
        );
    }

    #[test]
    fn test_task_points_sum_to_maximum() {
        for table in [GradeTable::assignment_1(), GradeTable::assignment_2()] {
            let valid = table.validate().unwrap();
            let total: f64 = valid.tasks().iter().map(|t| t.points).sum();
            assert!((total - valid.maximum()).abs() < 1e-9, "total was {total}");
        }
    }

    #[test]
    fn test_table_json_roundtrip_with_defaults() {
        let json = r#"{
            "name": "custom",
            "maximum": 4,
            "timeout": 5,
            "propagators": {
                "maximum": 4,
                "entries": [
                    { "name": "element", "test_filter": "tests::propagators::element", "model": "tsp", "points": 4 }
                ]
            }
        }"#;
        let table: GradeTable = serde_json::from_str(json).unwrap();
        assert!(table.conflict_analysis.entries.is_empty());
        assert_eq!(table.baseline_conflict_analysis, "unique-implication-point");
        assert!(!table.explanation_checks);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_propagator_sets_keep_json_order() {
        let json = r#"[
            { "model": "rcpsp", "sets": [["maximum"]] },
            { "model": "tsp", "sets": [["element"]] }
        ]"#;
        let sets: Vec<ModelSets> = serde_json::from_str(json).unwrap();
        let models: Vec<_> = sets.iter().map(|m| m.model.as_str()).collect();
        assert_eq!(models, vec!["rcpsp", "tsp"]);
    }
}

//! Grammar of the solver's text output.
//!
//! A solver log is a sequence of blocks separated by [`SOLUTION_SEPARATOR`].
//! Every block the solver terminated with a separator is one reported
//! solution. Text after the last separator is unterminated trailing output
//! (usually final statistics and a verdict line) and never counts as a
//! solution. A log with an [`OPTIMALITY_PROVEN`] line proved its last
//! solution optimal; anything printed after that line is ignored. Lines
//! starting with `%%` are statistics, lines starting with `_` are auxiliary
//! variables, and every other `name = value` line is a solution assignment.
//!
//! Parsing is a pure function of the text.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Printed by the solver after every solution.
pub const SOLUTION_SEPARATOR: &str = "----------";

/// Printed by the solver once optimality of the last solution is proven.
pub const OPTIMALITY_PROVEN: &str = "==========";

/// Prefix of a statistics line.
pub const STATISTIC_PREFIX: &str = "%%";

/// Anywhere in a log, signals that the instance has no solution.
pub const UNSATISFIABLE_TOKEN: &str = "UNSATISFIABLE";

/// Anywhere in a log, signals that the solver gave up without an answer.
pub const UNKNOWN_TOKEN: &str = "UNKNOWN";

/// Statistic carrying the objective value of the reported solution.
pub const OBJECTIVE_STATISTIC: &str = "objective";

/// Satisfiability status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Optimal,
    Satisfiable,
    Unsatisfiable,
    Unknown,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Optimal => "OPTIMAL",
            RunStatus::Satisfiable => "SATISFIABLE",
            RunStatus::Unsatisfiable => "UNSATISFIABLE",
            RunStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPTIMAL" => Ok(RunStatus::Optimal),
            "SATISFIABLE" => Ok(RunStatus::Satisfiable),
            "UNSATISFIABLE" => Ok(RunStatus::Unsatisfiable),
            "UNKNOWN" => Ok(RunStatus::Unknown),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// A numeric statistic value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Integer(i64),
    Float(f64),
}

impl StatValue {
    /// Parse as an integer when possible, otherwise as a float.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(value) = raw.parse::<i64>() {
            return Some(StatValue::Integer(value));
        }
        raw.parse::<f64>().ok().map(StatValue::Float)
    }

    /// Integral value, if the statistic is a whole number.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            StatValue::Integer(value) => Some(value),
            StatValue::Float(value) if value.fract() == 0.0 && value.is_finite() => {
                Some(value as i64)
            }
            StatValue::Float(_) => None,
        }
    }
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Integer(value) => write!(f, "{value}"),
            StatValue::Float(value) => write!(f, "{value}"),
        }
    }
}

/// Statistics by name.
pub type Statistics = BTreeMap<String, StatValue>;

/// Parse every `%% name=value` line of a text. Malformed lines are skipped.
pub fn parse_statistics(text: &str) -> Statistics {
    text.lines()
        .filter_map(parse_statistic_line)
        .collect()
}

fn parse_statistic_line(line: &str) -> Option<(String, StatValue)> {
    let rest = line.trim().strip_prefix(STATISTIC_PREFIX)?;
    let (name, value) = rest.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), StatValue::parse(value)?))
}

/// One reported solution: variable assignments in output order.
///
/// Auxiliary variables (names starting with `_`) are never part of a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionBlock {
    assignments: Vec<(String, String)>,
}

impl SolutionBlock {
    /// Build a block from `(name, value)` pairs, dropping auxiliary names.
    pub fn from_assignments<I, K, V>(assignments: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let assignments = assignments
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| !is_auxiliary(k))
            .collect();
        Self { assignments }
    }

    /// Parse the assignment lines of one block of text.
    pub fn parse(text: &str) -> Self {
        Self::from_assignments(text.lines().filter_map(parse_assignment_line))
    }

    /// Parse a materialised data file back into a block.
    pub fn parse_data_file(text: &str) -> Self {
        Self::parse(text)
    }

    /// Render the block in the verifier's data-file format, one assignment per
    /// line, in output order.
    pub fn to_data_file(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.assignments {
            out.push_str(name);
            out.push_str(" = ");
            out.push_str(value);
            out.push_str(";\n");
        }
        out
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.assignments
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

fn is_auxiliary(name: &str) -> bool {
    name.starts_with('_')
}

fn parse_assignment_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    // Statistics and data-file comments both start with '%'.
    if line.is_empty() || line.starts_with('%') {
        return None;
    }
    let (name, value) = line.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim();
    let value = value.strip_suffix(';').unwrap_or(value).trim_end();
    Some((name.to_string(), value.to_string()))
}

/// Structured result of parsing one run's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,

    /// Statistics of the last non-empty block.
    pub statistics: Statistics,

    /// Reported solutions, in output order.
    pub solutions: Vec<SolutionBlock>,

    /// Whether the log contained the optimality sentinel.
    pub optimality_proven: bool,
}

impl RunOutcome {
    pub fn is_optimal(&self) -> bool {
        self.status == RunStatus::Optimal
    }

    /// Objective of the final reported solution, when it is integral.
    pub fn objective(&self) -> Option<i64> {
        self.statistics
            .get(OBJECTIVE_STATISTIC)
            .and_then(StatValue::as_i64)
    }
}

/// Text preceding the first line that consists of the sentinel alone.
fn text_before_sentinel(log: &str) -> Option<&str> {
    let mut offset = 0;
    for line in log.split_inclusive('\n') {
        if line.trim() == OPTIMALITY_PROVEN {
            return Some(log[..offset].trim_end());
        }
        offset += line.len();
    }
    None
}

/// Parse a solver log.
pub fn parse_log(log: &str) -> RunOutcome {
    let (body, optimality_proven) = match text_before_sentinel(log) {
        Some(body) => (body, true),
        None => (log.trim(), false),
    };

    let segments: Vec<&str> = body.split(SOLUTION_SEPARATOR).collect();
    // The final segment is whatever followed the last separator.
    let terminated = &segments[..segments.len() - 1];

    let statistics = segments
        .iter()
        .rev()
        .find(|segment| !segment.trim().is_empty())
        .map(|segment| parse_statistics(segment))
        .unwrap_or_default();

    let unsatisfiable = log.contains(UNSATISFIABLE_TOKEN);
    let unknown = log.contains(UNKNOWN_TOKEN);

    let solutions = if unsatisfiable || unknown {
        Vec::new()
    } else {
        terminated
            .iter()
            .filter(|segment| !segment.trim().is_empty())
            .map(|segment| SolutionBlock::parse(segment))
            .collect()
    };

    let status = if unsatisfiable {
        RunStatus::Unsatisfiable
    } else if unknown {
        RunStatus::Unknown
    } else if optimality_proven {
        RunStatus::Optimal
    } else if !solutions.is_empty() {
        RunStatus::Satisfiable
    } else {
        RunStatus::Unknown
    };

    RunOutcome {
        status,
        statistics,
        solutions,
        optimality_proven,
    }
}

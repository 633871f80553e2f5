//! Fixed-schema statistics table.
//!
//! One row per run: instance, status, a fixed ordered set of solver and
//! proof-processing statistics, and the proof-checking verdict. Columns a run
//! did not report hold [`PLACEHOLDER`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{HarnessError, Result};
use crate::solution_log::{RunOutcome, RunStatus, StatValue, Statistics};

/// Rendered for schema columns a run did not report.
pub const PLACEHOLDER: &str = "-";

pub const INSTANCE_COLUMN: &str = "instance";
pub const STATUS_COLUMN: &str = "status";
pub const PROOF_CHECKING_COLUMN: &str = "proof_checking";

/// A statistic column and the log names that feed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticColumn {
    pub name: &'static str,

    /// Older solver names for the same statistic.
    pub aliases: &'static [&'static str],
}

impl StatisticColumn {
    const fn plain(name: &'static str) -> Self {
        Self { name, aliases: &[] }
    }

    /// Look the column up in a statistics mapping, preferring the canonical
    /// name over aliases.
    fn lookup(&self, statistics: &Statistics) -> Option<StatValue> {
        statistics.get(self.name).copied().or_else(|| {
            self.aliases
                .iter()
                .find_map(|alias| statistics.get(*alias).copied())
        })
    }
}

/// Statistic columns, in table order.
pub const STATISTIC_COLUMNS: &[StatisticColumn] = &[
    StatisticColumn::plain("objective"),
    StatisticColumn::plain("numberOfDecisions"),
    StatisticColumn::plain("numberOfConflicts"),
    StatisticColumn::plain("numberOfPropagations"),
    StatisticColumn::plain("timeSpentInSolverInMilliseconds"),
    StatisticColumn::plain("averageBacktrackAmount"),
    StatisticColumn::plain("averageSizeOfConflictExplanation"),
    StatisticColumn {
        name: "numberOfLearnedUnitNogoods",
        aliases: &["numberOfLearnedUnitClauses"],
    },
    StatisticColumn {
        name: "averageLearnedNogoodLength",
        aliases: &["averageLearnedClauseLength"],
    },
    StatisticColumn::plain("averageLearnedNogoodLbd"),
    StatisticColumn::plain("nogoodsAfterTrimming"),
    StatisticColumn::plain("numberOfInferences"),
];

/// The full table header.
pub fn header() -> Vec<&'static str> {
    let mut header = vec![INSTANCE_COLUMN, STATUS_COLUMN];
    header.extend(STATISTIC_COLUMNS.iter().map(|c| c.name));
    header.push(PROOF_CHECKING_COLUMN);
    header
}

/// Verdict of the proof checker, derived from its stored exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofCheckStatus {
    Success,
    Failed,
}

impl ProofCheckStatus {
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            ProofCheckStatus::Success
        } else {
            ProofCheckStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProofCheckStatus::Success => "SUCCESS",
            ProofCheckStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ProofCheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flattened table row.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsRow {
    pub instance: String,
    pub status: RunStatus,

    /// Aligned with [`STATISTIC_COLUMNS`].
    pub values: Vec<Option<StatValue>>,

    pub proof_checking: Option<ProofCheckStatus>,
}

impl StatisticsRow {
    /// Flatten a parsed run. Proof-processing statistics override solver
    /// statistics of the same name; names outside the schema are dropped.
    pub fn from_run(
        instance: &str,
        outcome: &RunOutcome,
        process_statistics: Option<&Statistics>,
        checking_exit_code: Option<i32>,
    ) -> Self {
        let mut merged = outcome.statistics.clone();
        if let Some(process) = process_statistics {
            merged.extend(process.iter().map(|(k, v)| (k.clone(), *v)));
        }

        Self {
            instance: instance.to_string(),
            status: outcome.status,
            values: STATISTIC_COLUMNS.iter().map(|c| c.lookup(&merged)).collect(),
            proof_checking: checking_exit_code.map(ProofCheckStatus::from_exit_code),
        }
    }

    /// Value of a statistic column.
    pub fn get(&self, column: &str) -> Option<StatValue> {
        STATISTIC_COLUMNS
            .iter()
            .position(|c| c.name == column)
            .and_then(|idx| self.values[idx])
    }

    /// Cells in header order.
    pub fn to_record(&self) -> Vec<String> {
        let mut record = Vec::with_capacity(self.values.len() + 3);
        record.push(self.instance.clone());
        record.push(self.status.to_string());
        record.extend(self.values.iter().map(|v| match v {
            Some(value) => value.to_string(),
            None => PLACEHOLDER.to_string(),
        }));
        record.push(
            self.proof_checking
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
        );
        record
    }
}

/// Write the table: header, then one record per row.
pub fn write_table(path: &Path, rows: &[StatisticsRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header())?;
    for row in rows {
        writer.write_record(row.to_record())?;
    }
    writer.flush()?;
    Ok(())
}

/// A row read back from a written table, keyed by column name.
pub type TableRecord = BTreeMap<String, String>;

/// Read a statistics table. A missing file is [`HarnessError::StatisticsMissing`].
pub fn read_table(path: &Path) -> Result<Vec<TableRecord>> {
    if !path.is_file() {
        return Err(HarnessError::StatisticsMissing(path.to_path_buf()));
    }

    let malformed = |reason: String| HarnessError::StatisticsMalformed {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::Reader::from_path(path)?;
    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    for required in [INSTANCE_COLUMN, STATUS_COLUMN] {
        if !columns.iter().any(|c| c == required) {
            return Err(malformed(format!("missing column {required}")));
        }
    }

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| malformed(e.to_string()))?;
        records.push(
            columns
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect(),
        );
    }
    Ok(records)
}

/// Instances whose row reports status OPTIMAL.
pub fn optimal_instances(path: &Path) -> Result<Vec<String>> {
    Ok(read_table(path)?
        .into_iter()
        .filter(|record| {
            record.get(STATUS_COLUMN).map(String::as_str) == Some(RunStatus::Optimal.as_str())
        })
        .filter_map(|mut record| record.remove(INSTANCE_COLUMN))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution_log::parse_log;

    #[test]
    fn test_header_layout() {
        let header = header();
        assert_eq!(header[0], "instance");
        assert_eq!(header[1], "status");
        assert_eq!(header[2], "objective");
        assert_eq!(*header.last().unwrap(), "proof_checking");
        assert_eq!(header.len(), STATISTIC_COLUMNS.len() + 3);
    }

    #[test]
    fn test_row_renames_aliases_and_drops_unknown() {
        let outcome = parse_log(
            "x = 1;\n%%  objective=10\n%%  numberOfLearnedUnitClauses=4\n%%  somethingElse=1\n----------\n",
        );
        let row = StatisticsRow::from_run("inst", &outcome, None, None);
        assert_eq!(row.status, RunStatus::Satisfiable);
        assert_eq!(row.get("objective"), Some(StatValue::Integer(10)));
        assert_eq!(
            row.get("numberOfLearnedUnitNogoods"),
            Some(StatValue::Integer(4))
        );
        assert_eq!(row.get("somethingElse"), None);
        assert!(!row.to_record().contains(&"somethingElse".to_string()));
    }

    #[test]
    fn test_row_placeholders_for_missing_columns() {
        let outcome = parse_log("UNSATISFIABLE");
        let record = StatisticsRow::from_run("inst", &outcome, None, None).to_record();
        assert_eq!(record[0], "inst");
        assert_eq!(record[1], "UNSATISFIABLE");
        assert!(record[2..].iter().all(|cell| cell == PLACEHOLDER));
    }

    #[test]
    fn test_process_statistics_merge_and_checking_status() {
        let outcome = parse_log("x = 1;\n%%  objective=3\n----------\n==========");
        let process = crate::solution_log::parse_statistics(
            "%% nogoodsAfterTrimming=7\n%% numberOfInferences=21\n",
        );
        let row = StatisticsRow::from_run("inst", &outcome, Some(&process), Some(0));
        assert_eq!(row.get("nogoodsAfterTrimming"), Some(StatValue::Integer(7)));
        assert_eq!(row.get("numberOfInferences"), Some(StatValue::Integer(21)));
        assert_eq!(row.proof_checking, Some(ProofCheckStatus::Success));

        let failed = StatisticsRow::from_run("inst", &outcome, None, Some(3));
        assert_eq!(failed.proof_checking, Some(ProofCheckStatus::Failed));
        assert_eq!(failed.to_record().last().unwrap(), "FAILED");
    }

    #[test]
    fn test_table_roundtrip_and_optimal_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statistics.csv");
        let rows = vec![
            StatisticsRow::from_run(
                "a",
                &parse_log("x = 1;\n%%  objective=3\n----------\n=========="),
                None,
                None,
            ),
            StatisticsRow::from_run("b", &parse_log("x = 2;\n----------\n"), None, None),
            StatisticsRow::from_run("c", &parse_log("UNKNOWN"), None, None),
        ];
        write_table(&path, &rows).unwrap();

        let records = read_table(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["objective"], "3");
        assert_eq!(records[1]["status"], "SATISFIABLE");
        assert_eq!(records[2]["objective"], PLACEHOLDER);

        assert_eq!(optimal_instances(&path).unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_table(&dir.path().join("statistics.csv")).unwrap_err();
        assert!(matches!(err, HarnessError::StatisticsMissing(_)));
    }

    #[test]
    fn test_ragged_table_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statistics.csv");
        std::fs::write(&path, "instance,status\na,OPTIMAL,extra\n").unwrap();
        let err = read_table(&path).unwrap_err();
        assert!(matches!(err, HarnessError::StatisticsMalformed { .. }));
    }
}

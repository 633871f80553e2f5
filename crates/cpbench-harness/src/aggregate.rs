//! Statistics aggregation: one table row per run.

use std::path::PathBuf;

use tracing::info;

use cpbench_core::layout::STATISTICS_FILE;
use cpbench_core::{
    parse_log, parse_statistics, write_table, ExperimentManifest, Result, RunLayout,
    StatisticsRow,
};

/// Flattens run logs into the experiment's statistics table.
pub struct StatisticsAggregator;

impl StatisticsAggregator {
    /// Path of the statistics table of an experiment.
    pub fn table_path(manifest: &ExperimentManifest) -> PathBuf {
        manifest.directory.join(STATISTICS_FILE)
    }

    /// Row for one run: solver statistics, overridden by proof-processing
    /// statistics when a process log exists, plus the stored proof-checking
    /// exit code.
    pub fn row_for(run: &RunLayout) -> Result<StatisticsRow> {
        let outcome = parse_log(&run.read_output_log()?);
        let process = run.read_process_log()?.map(|log| parse_statistics(&log));
        let checking = run.read_checking_status()?;
        Ok(StatisticsRow::from_run(
            &run.instance(),
            &outcome,
            process.as_ref(),
            checking,
        ))
    }

    /// Write `statistics.csv` for every run of the experiment and return the
    /// rows in instance order.
    pub fn aggregate(manifest: &ExperimentManifest) -> Result<Vec<StatisticsRow>> {
        let rows = manifest
            .list_runs()?
            .iter()
            .map(Self::row_for)
            .collect::<Result<Vec<_>>>()?;

        let path = Self::table_path(manifest);
        write_table(&path, &rows)?;
        info!(rows = rows.len(), table = %path.display(), "statistics written");
        Ok(rows)
    }
}

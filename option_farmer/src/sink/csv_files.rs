use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::{
    models::{clock::RunClock, option::FilteredOption},
    sink::{DataSink, SinkError, encode_csv, ensure_dir, replace_file},
};

pub const UPDATE_SUBDIR: &str = "Updater";

/// Path of the chain discovery file for the run's date.
pub fn chain_file_path(dir: &Path, clock: &RunClock) -> PathBuf {
    dir.join(format!("OptionChain_{}.csv", clock.date_stamp()))
}

/// Path of the update snapshot for the run's minute.
pub fn update_file_path(dir: &Path, clock: &RunClock) -> PathBuf {
    dir.join(UPDATE_SUBDIR)
        .join(format!("OptionContracts_{}.csv", clock.minute_stamp()))
}

/// Rows in file order: symbol, horizon, strike, then calls before puts. Makes
/// the file independent of the order in which workers finished.
fn file_order(rows: &[FilteredOption]) -> Vec<&FilteredOption> {
    let mut ordered: Vec<&FilteredOption> = rows.iter().collect();
    ordered.sort_by(|a, b| {
        a.symbol
            .cmp(&b.symbol)
            .then(a.horizon_days.cmp(&b.horizon_days))
            .then(a.strike.total_cmp(&b.strike))
            .then(a.contract_type.code().cmp(&b.contract_type.code()))
    });
    ordered
}

/// Writes `OptionChain_{YYYYMMDD}.csv`, replacing the whole file.
pub struct ChainFileSink {
    dir: PathBuf,
    clock: RunClock,
}

impl ChainFileSink {
    pub fn new(dir: impl Into<PathBuf>, clock: RunClock) -> Self {
        Self {
            dir: dir.into(),
            clock,
        }
    }

    pub fn path(&self) -> PathBuf {
        chain_file_path(&self.dir, &self.clock)
    }
}

#[async_trait]
impl DataSink for ChainFileSink {
    type Output = PathBuf;

    async fn write(&self, rows: &[FilteredOption]) -> Result<PathBuf, SinkError> {
        ensure_dir(&self.dir).await?;
        let path = self.path();
        let bytes = encode_csv(file_order(rows).into_iter().map(FilteredOption::chain_row))?;
        replace_file(&path, bytes).await?;
        info!(path = %path.display(), rows = rows.len(), "chain file written");
        Ok(path)
    }
}

/// Writes one single-row `{ContractKey}.csv` per contract. When two rows share
/// a key the later one wins.
pub struct ContractFileSink {
    dir: PathBuf,
}

impl ContractFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DataSink for ContractFileSink {
    type Output = Vec<PathBuf>;

    async fn write(&self, rows: &[FilteredOption]) -> Result<Vec<PathBuf>, SinkError> {
        ensure_dir(&self.dir).await?;
        let mut paths: Vec<PathBuf> = Vec::with_capacity(rows.len());
        for row in rows {
            let path = self.dir.join(row.contract_key().file_name());
            let bytes = encode_csv([row.contract_row()])?;
            replace_file(&path, bytes).await?;
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        info!(dir = %self.dir.display(), files = paths.len(), "contract files written");
        Ok(paths)
    }
}

/// Writes `Updater/OptionContracts_{YYYYMMDD}_{HHMM}.csv`.
pub struct UpdateSnapshotSink {
    dir: PathBuf,
    clock: RunClock,
}

impl UpdateSnapshotSink {
    pub fn new(dir: impl Into<PathBuf>, clock: RunClock) -> Self {
        Self {
            dir: dir.into(),
            clock,
        }
    }

    pub fn path(&self) -> PathBuf {
        update_file_path(&self.dir, &self.clock)
    }
}

#[async_trait]
impl DataSink for UpdateSnapshotSink {
    type Output = PathBuf;

    async fn write(&self, rows: &[FilteredOption]) -> Result<PathBuf, SinkError> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            ensure_dir(parent).await?;
        }
        let bytes = encode_csv(file_order(rows).into_iter().map(FilteredOption::contract_row))?;
        replace_file(&path, bytes).await?;
        info!(path = %path.display(), rows = rows.len(), "update snapshot written");
        Ok(path)
    }
}

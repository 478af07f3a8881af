//! Fan-in and persistence: merging worker output, reconciling it against the
//! handoff plan, and writing it to the flat-file and cache sinks.

pub mod csv_files;

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::Serialize;
use snafu::{Backtrace, ResultExt, Snafu};
use tracing::{debug, warn};

use crate::{
    cache::{CacheError, ContractHash, QuoteCache},
    models::{harvest::HarvestResult, option::FilteredOption},
};

pub use csv_files::{ChainFileSink, ContractFileSink, UpdateSnapshotSink};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// File system failure on a sink path.
    #[snafu(display("I/O error on {}: {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// Rows could not be encoded as (or decoded from) CSV.
    #[snafu(display("CSV error: {source}"))]
    Csv {
        source: csv::Error,
        backtrace: Backtrace,
    },

    /// The snapshot could not be rendered as JSON.
    #[snafu(display("Failed to serialize snapshot: {source}"))]
    Json {
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    /// The cache rejected a write.
    #[snafu(display("Cache write failed: {source}"))]
    Cache {
        source: CacheError,
        backtrace: Backtrace,
    },
}

#[async_trait]
pub trait DataSink {
    /// What a successful write reports back, e.g. the path of the file written.
    type Output;

    async fn write(&self, rows: &[FilteredOption]) -> Result<Self::Output, SinkError>;
}

/// Concatenates the rows of successful results, in completion order.
pub fn merge(results: &[HarvestResult]) -> Vec<FilteredOption> {
    results
        .iter()
        .filter(|r| r.is_success())
        .flat_map(|r| r.rows.iter().cloned())
        .collect()
}

/// Expected vs produced option identifiers of a detail or update run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reconciliation {
    pub expected: usize,
    pub produced: usize,
    /// Sorted.
    pub missing: Vec<String>,
}

impl Reconciliation {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compares the identifiers the plan expected with those that made it into
/// `rows`. A gap is logged, never raised.
pub fn reconcile(expected: &BTreeSet<String>, rows: &[FilteredOption]) -> Reconciliation {
    let produced: BTreeSet<&str> = rows.iter().map(|r| r.option_ticker.as_str()).collect();
    let missing: Vec<String> = expected
        .iter()
        .filter(|t| !produced.contains(t.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() {
        warn!(
            expected = expected.len(),
            produced = produced.len(),
            missing = missing.len(),
            "expected option contracts were not produced"
        );
        warn!(tickers = ?missing, "missing option contracts");
    }

    Reconciliation {
        expected: expected.len(),
        produced: produced.len(),
        missing,
    }
}

/// Writes one cache hash per row, keyed by its contract key, as a single
/// batch: either every row lands or none does.
pub async fn mirror_rows(
    cache: &dyn QuoteCache,
    rows: &[FilteredOption],
) -> Result<usize, CacheError> {
    let hashes: Vec<ContractHash> = rows
        .iter()
        .map(|row| ContractHash {
            key: row.contract_key().as_str().to_string(),
            fields: row.cache_fields(),
        })
        .collect();
    cache.write_contract_rows(&hashes).await?;
    debug!(rows = rows.len(), "mirrored rows to cache");
    Ok(rows.len())
}

/// Stores the chain rows as one JSON document under `key`.
pub async fn store_chain_snapshot(
    cache: &dyn QuoteCache,
    key: &str,
    rows: &[FilteredOption],
) -> Result<(), SinkError> {
    let chain: Vec<_> = rows.iter().map(FilteredOption::chain_row).collect();
    let json = serde_json::to_string(&chain).context(JsonSnafu)?;
    cache.write_snapshot(key, &json).await.context(CacheSnafu)
}

/// Encodes rows with a header line.
pub(crate) fn encode_csv<T: Serialize>(
    rows: impl IntoIterator<Item = T>,
) -> Result<Vec<u8>, SinkError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).context(CsvSnafu)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
        .context(CsvSnafu)
}

/// Reads every row of a CSV file with a header line.
pub fn read_csv<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, SinkError> {
    let mut reader = csv::Reader::from_path(path).context(CsvSnafu)?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .context(CsvSnafu)
}

/// Replaces `path` with `bytes`, removing any previous file first.
pub(crate) async fn replace_file(path: &Path, bytes: Vec<u8>) -> Result<(), SinkError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed previous file"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => return Err(source).context(IoSnafu { path }),
    }
    tokio::fs::write(path, bytes).await.context(IoSnafu { path })
}

pub(crate) async fn ensure_dir(dir: &Path) -> Result<(), SinkError> {
    tokio::fs::create_dir_all(dir)
        .await
        .context(IoSnafu { path: dir })
}

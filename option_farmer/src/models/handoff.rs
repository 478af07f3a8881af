//! The chain discovery file read back as input for the detail and update
//! stages.
//!
//! Those stages may run in a different process (or on a different day's
//! schedule) from chain discovery, so everything they need is recovered from
//! the file itself: the symbols, the horizons that were targeted, the ladder
//! half-width, and the option identifiers that were selected per symbol.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::models::{
    atm::{AtmLabel, AtmLabelError},
    option::ChainRow,
};

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("chain file {0} not found; run chain discovery first")]
    Missing(PathBuf),

    #[error("failed to read chain file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Label(#[from] AtmLabelError),

    #[error("chain file {0} has no rows")]
    Empty(PathBuf),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandoffPlan {
    /// Distinct horizons, ascending.
    pub horizons: Vec<u32>,
    /// Largest |ATM offset| seen in the file.
    pub half_width: usize,
    /// Selected option identifiers per symbol, in file order.
    pub expected: IndexMap<String, IndexSet<String>>,
}

impl HandoffPlan {
    pub fn read(path: impl AsRef<Path>) -> Result<Self, HandoffError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HandoffError::Missing(path.to_path_buf()));
        }
        let csv_err = |source| HandoffError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
        let rows: Vec<ChainRow> = reader.deserialize().collect::<Result<_, _>>().map_err(csv_err)?;
        if rows.is_empty() {
            return Err(HandoffError::Empty(path.to_path_buf()));
        }
        Self::from_rows(rows)
    }

    pub fn from_rows(rows: impl IntoIterator<Item = ChainRow>) -> Result<Self, HandoffError> {
        let mut horizons = BTreeSet::new();
        let mut half_width = 0usize;
        let mut expected: IndexMap<String, IndexSet<String>> = IndexMap::new();

        for row in rows {
            horizons.insert(row.horizon_days);
            let label: AtmLabel = row.atm_label.parse()?;
            half_width = half_width.max(label.offset().unsigned_abs() as usize);
            expected.entry(row.symbol).or_default().insert(row.ticker);
        }

        Ok(Self {
            horizons: horizons.into_iter().collect(),
            half_width,
            expected,
        })
    }

    pub fn symbols(&self) -> Vec<String> {
        self.expected.keys().cloned().collect()
    }

    pub fn expected_for(&self, symbol: &str) -> Option<&IndexSet<String>> {
        self.expected.get(symbol)
    }

    /// Every expected option identifier across all symbols.
    pub fn expected_tickers(&self) -> BTreeSet<String> {
        self.expected.values().flatten().cloned().collect()
    }
}

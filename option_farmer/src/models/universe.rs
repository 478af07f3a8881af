//! The symbol universe: the deduplicated set of underlyings one run processes.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("failed to read symbol file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("no symbols loaded")]
    Empty,

    #[error("neither an explicit symbol list nor a symbol file is configured")]
    NoSource,
}

#[derive(Deserialize)]
struct SymbolRecord {
    #[serde(rename = "Symbol")]
    symbol: String,
}

/// Insertion-ordered, deduplicated symbols.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Universe {
    symbols: IndexSet<String>,
}

impl Universe {
    /// Builds a universe from an explicit list. Blank entries are dropped and
    /// symbols are trimmed; the first occurrence of a duplicate wins.
    pub fn from_list<I, S>(symbols: I) -> Result<Self, UniverseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols: IndexSet<String> = symbols
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            return Err(UniverseError::Empty);
        }
        Ok(Self { symbols })
    }

    /// Reads the `Symbol` column of a CSV file.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, UniverseError> {
        let path = path.as_ref();
        let read_err = |source| UniverseError::Read {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::Reader::from_path(path).map_err(read_err)?;
        let records: Vec<SymbolRecord> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .map_err(read_err)?;
        Self::from_list(records.into_iter().map(|r| r.symbol))
    }

    /// Resolves the configured source: a non-empty explicit list wins over the
    /// file.
    pub fn load(list: &[String], file: Option<&Path>) -> Result<Self, UniverseError> {
        if !list.is_empty() {
            return Self::from_list(list);
        }
        match file {
            Some(path) => Self::from_csv(path),
            None => Err(UniverseError::NoSource),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.symbols.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn list_is_trimmed_and_deduplicated_in_order() {
        let u = Universe::from_list(["MSFT", " AAPL", "MSFT", "", "TSLA"]).unwrap();
        assert_eq!(u.into_vec(), vec!["MSFT", "AAPL", "TSLA"]);
    }

    #[test]
    fn empty_list_is_an_error() {
        assert!(matches!(
            Universe::from_list(Vec::<String>::new()),
            Err(UniverseError::Empty)
        ));
    }

    #[test]
    fn reads_symbol_column_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Symbol,Name\nAAPL,Apple\nNVDA,Nvidia\nAAPL,Apple").unwrap();
        let u = Universe::load(&[], Some(file.path())).unwrap();
        assert_eq!(u.len(), 2);
        assert_eq!(u.iter().collect::<Vec<_>>(), vec!["AAPL", "NVDA"]);
    }

    #[test]
    fn explicit_list_wins_over_file() {
        let u = Universe::load(&["SPY".to_string()], Some(Path::new("/does/not/exist.csv"))).unwrap();
        assert_eq!(u.into_vec(), vec!["SPY"]);
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = Universe::load(&[], Some(Path::new("/does/not/exist.csv"))).unwrap_err();
        assert!(matches!(err, UniverseError::Read { .. }));
    }
}

//! Per-symbol harvest outcomes.

use std::fmt;

use crate::models::option::FilteredOption;

/// Why a symbol produced no usable output.
#[derive(Clone, Debug, PartialEq)]
pub enum FailureReason {
    /// No last-trade price for the underlying in the cache.
    PriceUnavailable,
    /// The API rejected the key.
    Auth,
    /// The API call failed or returned nothing usable.
    FetchFailure(String),
    /// Selection produced zero rows.
    EmptyResult,
    /// Records were present but none could be used.
    MalformedData(String),
    /// Mirroring rows into the cache failed.
    Cache(String),
    /// The worker panicked while processing the symbol.
    Panicked(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PriceUnavailable => f.write_str("underlying price unavailable"),
            Self::Auth => f.write_str("authentication failed"),
            Self::FetchFailure(msg) => write!(f, "fetch failed: {msg}"),
            Self::EmptyResult => f.write_str("no contracts selected"),
            Self::MalformedData(msg) => write!(f, "malformed data: {msg}"),
            Self::Cache(msg) => write!(f, "cache write failed: {msg}"),
            Self::Panicked(msg) => write!(f, "worker panicked: {msg}"),
        }
    }
}

/// Outcome of harvesting one symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct HarvestResult {
    pub symbol: String,
    /// Empty whenever `outcome` is a failure.
    pub rows: Vec<FilteredOption>,
    pub outcome: Result<(), FailureReason>,
}

impl HarvestResult {
    pub fn success(symbol: impl Into<String>, rows: Vec<FilteredOption>) -> Self {
        Self {
            symbol: symbol.into(),
            rows,
            outcome: Ok(()),
        }
    }

    pub fn failure(symbol: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            symbol: symbol.into(),
            rows: Vec::new(),
            outcome: Err(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        self.outcome.as_ref().err()
    }
}

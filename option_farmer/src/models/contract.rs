//! Canonical in-memory representation of an option contract as fetched from a
//! market data vendor.
//!
//! Vendor payloads are loose: any identifying field may be absent. The raw
//! record keeps them optional and [`RawContract::terms`] validates them at the
//! point of use, so one bad record never poisons the rest of a symbol's chain.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Call or put.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractType {
    Call,
    Put,
}

impl ContractType {
    /// Parses vendor spellings (`"call"`, `"Call"`, `"PUT"`, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "call" => Some(Self::Call),
            "put" => Some(Self::Put),
            _ => None,
        }
    }

    /// Single-letter code used in contract keys.
    pub fn code(self) -> char {
        match self {
            Self::Call => 'C',
            Self::Put => 'P',
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => f.write_str("Call"),
            Self::Put => f.write_str("Put"),
        }
    }
}

/// Greeks, quote and day-bar fields carried by snapshot (detail) records.
///
/// Every field is optional: vendors omit greeks for illiquid contracts and the
/// day bar before the first trade.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContractMetrics {
    pub implied_volatility: Option<f64>,
    pub open_interest: Option<f64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub vwap: Option<f64>,
}

/// A single vendor contract record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawContract {
    /// Vendor option identifier (e.g. `O:AAPL251017C00150000`).
    pub ticker: Option<String>,
    /// Underlying symbol as reported by the vendor.
    pub underlying: Option<String>,
    /// Expiration date as sent on the wire (`YYYY-MM-DD`).
    pub expiration_date: Option<String>,
    pub strike_price: Option<f64>,
    /// Contract type as sent on the wire (`call` / `put`).
    pub contract_type: Option<String>,
    /// Present only for snapshot records.
    pub metrics: Option<ContractMetrics>,
}

/// The validated identifying fields of a [`RawContract`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContractTerms<'a> {
    pub ticker: &'a str,
    pub expiry: NaiveDate,
    pub strike: f64,
    pub contract_type: ContractType,
}

/// A contract record that lacks (or carries an unusable) required field.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("malformed contract {ticker}: {problem}")]
pub struct MalformedRecord {
    pub ticker: String,
    pub problem: String,
}

impl RawContract {
    /// Validates and returns the identifying fields of this record.
    pub fn terms(&self) -> Result<ContractTerms<'_>, MalformedRecord> {
        let ticker = self
            .ticker
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| self.malformed("missing ticker"))?;

        let raw_expiry = self
            .expiration_date
            .as_deref()
            .ok_or_else(|| self.malformed("missing expiration_date"))?;
        let expiry = NaiveDate::parse_from_str(raw_expiry, "%Y-%m-%d")
            .map_err(|e| self.malformed(format!("bad expiration_date {raw_expiry:?}: {e}")))?;

        let strike = self
            .strike_price
            .filter(|s| s.is_finite())
            .ok_or_else(|| self.malformed("missing strike_price"))?;

        let raw_type = self
            .contract_type
            .as_deref()
            .ok_or_else(|| self.malformed("missing contract_type"))?;
        let contract_type = ContractType::parse(raw_type)
            .ok_or_else(|| self.malformed(format!("unknown contract_type {raw_type:?}")))?;

        Ok(ContractTerms {
            ticker,
            expiry,
            strike,
            contract_type,
        })
    }

    fn malformed(&self, problem: impl Into<String>) -> MalformedRecord {
        MalformedRecord {
            ticker: self.ticker.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
            problem: problem.into(),
        }
    }
}

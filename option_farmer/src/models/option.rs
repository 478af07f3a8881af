//! Output rows: the filtered, labeled options persisted to the sinks.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{
    atm::AtmLabel,
    contract::{ContractMetrics, ContractType},
};

/// Root symbol embedded in OCC-style option identifiers: `O:` + letters with
/// an optional share-class digit, followed by the six-digit expiry.
static ROOT_SYMBOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"O:([A-Z]+[0-9]?)(\d{6})").expect("root symbol pattern is valid"));

/// One selected option, labeled with its horizon and ladder position.
#[derive(Clone, Debug, PartialEq)]
pub struct FilteredOption {
    /// Wall-clock time of the run that produced this row (America/New_York).
    pub as_of: NaiveDateTime,
    pub option_ticker: String,
    /// The harvested underlying symbol.
    pub symbol: String,
    pub contract_type: ContractType,
    pub strike: f64,
    pub expiry: NaiveDate,
    /// Target horizon (days) this row's expiry was selected for.
    pub horizon_days: u32,
    pub atm_label: AtmLabel,
    /// Present in detail and update modes.
    pub metrics: Option<ContractMetrics>,
}

/// Cache key and per-contract file stem:
/// `{rootSymbol}_{C|P}_{expiryYYYYMMDD}_{strike}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractKey(String);

impl ContractKey {
    pub fn new(
        option_ticker: &str,
        fallback_symbol: &str,
        contract_type: ContractType,
        expiry: NaiveDate,
        strike: f64,
    ) -> Self {
        let root = root_symbol(option_ticker).unwrap_or(fallback_symbol);
        // `{}` on f64 drops a trailing `.0` and keeps real fractions (102.5).
        Self(format!(
            "{root}_{}_{}_{strike}",
            contract_type.code(),
            expiry.format("%Y%m%d")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.0)
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extracts the root symbol from an option identifier, if it has one.
pub fn root_symbol(option_ticker: &str) -> Option<&str> {
    ROOT_SYMBOL
        .captures(option_ticker)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Row layout of the chain discovery file (`OptionChain_{YYYYMMDD}.csv`).
///
/// This file doubles as the handoff artifact read by the detail and update
/// stages, so the layout is also deserializable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainRow {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Type")]
    pub contract_type: String,
    #[serde(rename = "Expiry_X")]
    pub horizon_days: u32,
    #[serde(rename = "SP_Price_X")]
    pub strike: f64,
    #[serde(rename = "ATM_X")]
    pub atm_label: String,
    #[serde(rename = "Expiry_Date")]
    pub expiry_date: String,
}

/// Row layout of per-contract files and update snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractRow {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Option_Ticker")]
    pub option_ticker: String,
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Strike_Price")]
    pub strike: f64,
    #[serde(rename = "Expiry")]
    pub expiry: String,
    #[serde(rename = "Contract_Type")]
    pub contract_type: String,
    #[serde(rename = "Expiry_X")]
    pub horizon_days: u32,
    #[serde(rename = "ATM_X")]
    pub atm_label: String,
    #[serde(rename = "IV")]
    pub implied_volatility: Option<f64>,
    #[serde(rename = "Open_interest")]
    pub open_interest: Option<f64>,
    #[serde(rename = "Delta")]
    pub delta: Option<f64>,
    #[serde(rename = "Gamma")]
    pub gamma: Option<f64>,
    #[serde(rename = "Theta")]
    pub theta: Option<f64>,
    #[serde(rename = "Vega")]
    pub vega: Option<f64>,
    #[serde(rename = "Bid")]
    pub bid: Option<f64>,
    #[serde(rename = "Ask")]
    pub ask: Option<f64>,
    #[serde(rename = "Open")]
    pub open: Option<f64>,
    #[serde(rename = "High")]
    pub high: Option<f64>,
    #[serde(rename = "Low")]
    pub low: Option<f64>,
    #[serde(rename = "Close")]
    pub close: Option<f64>,
    #[serde(rename = "Volume")]
    pub volume: Option<f64>,
    #[serde(rename = "VWAP")]
    pub vwap: Option<f64>,
}

impl FilteredOption {
    pub fn contract_key(&self) -> ContractKey {
        ContractKey::new(
            &self.option_ticker,
            &self.symbol,
            self.contract_type,
            self.expiry,
            self.strike,
        )
    }

    pub fn chain_row(&self) -> ChainRow {
        ChainRow {
            date: self.as_of.format("%Y-%m-%d").to_string(),
            time: self.as_of.format("%H:%M").to_string(),
            ticker: self.option_ticker.clone(),
            symbol: self.symbol.clone(),
            contract_type: self.contract_type.to_string(),
            horizon_days: self.horizon_days,
            strike: self.strike,
            atm_label: self.atm_label.to_string(),
            expiry_date: self.expiry.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn contract_row(&self) -> ContractRow {
        let m = self.metrics.clone().unwrap_or_default();
        ContractRow {
            date: self.as_of.format("%Y-%m-%d").to_string(),
            time: self.as_of.format("%H:%M").to_string(),
            option_ticker: self.option_ticker.clone(),
            symbol: self.symbol.clone(),
            strike: self.strike,
            expiry: self.expiry.format("%Y-%m-%d").to_string(),
            contract_type: self.contract_type.to_string(),
            horizon_days: self.horizon_days,
            atm_label: self.atm_label.to_string(),
            implied_volatility: m.implied_volatility,
            open_interest: m.open_interest,
            delta: m.delta,
            gamma: m.gamma,
            theta: m.theta,
            vega: m.vega,
            bid: m.bid,
            ask: m.ask,
            open: m.open,
            high: m.high,
            low: m.low,
            close: m.close,
            volume: m.volume,
            vwap: m.vwap,
        }
    }

    /// Flattens the contract row into cache hash fields. Absent metrics are
    /// omitted rather than written as empty strings.
    pub fn cache_fields(&self) -> Vec<(String, String)> {
        let Ok(Value::Object(map)) = serde_json::to_value(self.contract_row()) else {
            return Vec::new();
        };
        map.into_iter()
            .filter_map(|(name, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((name, s)),
                other => Some((name, other.to_string())),
            })
            .collect()
    }
}

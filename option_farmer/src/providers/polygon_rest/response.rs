//! Wire shapes of Polygon responses. Every field is optional so a partial
//! record survives decoding and is judged later by the selection stage.

use serde::Deserialize;

use crate::models::contract::{ContractMetrics, RawContract};

/// One page of a paginated list endpoint.
#[derive(Deserialize, Debug)]
pub struct PolygonPage<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    pub next_url: Option<String>,
}

/// Response of a single-record endpoint.
#[derive(Deserialize, Debug)]
pub struct PolygonSingle<T> {
    pub results: Option<T>,
}

/// Record of `/v3/reference/options/contracts`.
#[derive(Deserialize, Debug, Default)]
pub struct ReferenceContract {
    pub ticker: Option<String>,
    pub underlying_ticker: Option<String>,
    pub expiration_date: Option<String>,
    pub strike_price: Option<f64>,
    pub contract_type: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SnapshotDetails {
    pub ticker: Option<String>,
    pub expiration_date: Option<String>,
    pub strike_price: Option<f64>,
    pub contract_type: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SnapshotGreeks {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SnapshotQuote {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SnapshotDay {
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub vwap: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SnapshotUnderlying {
    pub ticker: Option<String>,
}

/// Record of `/v3/snapshot/options/{symbol}` and its single-contract variant.
#[derive(Deserialize, Debug, Default)]
pub struct SnapshotContract {
    pub details: Option<SnapshotDetails>,
    pub greeks: Option<SnapshotGreeks>,
    pub implied_volatility: Option<f64>,
    pub open_interest: Option<f64>,
    pub last_quote: Option<SnapshotQuote>,
    pub day: Option<SnapshotDay>,
    pub underlying_asset: Option<SnapshotUnderlying>,
}

impl From<ReferenceContract> for RawContract {
    fn from(c: ReferenceContract) -> Self {
        RawContract {
            ticker: c.ticker,
            underlying: c.underlying_ticker,
            expiration_date: c.expiration_date,
            strike_price: c.strike_price,
            contract_type: c.contract_type,
            metrics: None,
        }
    }
}

impl From<SnapshotContract> for RawContract {
    fn from(c: SnapshotContract) -> Self {
        let details = c.details.unwrap_or_default();
        let greeks = c.greeks.unwrap_or_default();
        let quote = c.last_quote.unwrap_or_default();
        let day = c.day.unwrap_or_default();
        RawContract {
            ticker: details.ticker,
            underlying: c.underlying_asset.and_then(|u| u.ticker),
            expiration_date: details.expiration_date,
            strike_price: details.strike_price,
            contract_type: details.contract_type,
            metrics: Some(ContractMetrics {
                implied_volatility: c.implied_volatility,
                open_interest: c.open_interest,
                delta: greeks.delta,
                gamma: greeks.gamma,
                theta: greeks.theta,
                vega: greeks.vega,
                bid: quote.bid,
                ask: quote.ask,
                open: day.open,
                high: day.high,
                low: day.low,
                close: day.close,
                volume: day.volume,
                vwap: day.vwap,
            }),
        }
    }
}

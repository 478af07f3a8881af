//! Key-value cache access: last-trade prices in, per-contract rows out.
//!
//! Prices are read from the hash `TRADE_US_{symbol}` (field `last`), which an
//! external trade feed keeps current. Selected contracts are mirrored as one
//! hash per [`ContractKey`](crate::models::option::ContractKey).

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCache;
pub use redis_store::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Hash key holding the last trade of `symbol`.
pub fn trade_key(symbol: &str) -> String {
    format!("TRADE_US_{symbol}")
}

/// Key of the whole-chain JSON snapshot for a `YYYYMMDD` date stamp.
pub fn chain_snapshot_key(date_stamp: &str) -> String {
    format!("OptionChain_{date_stamp}")
}

/// Parses a cached price. Anything that is not a finite number is treated as
/// absent.
pub fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|p| p.is_finite())
}

/// One contract row flattened for the cache: the hash key and its fields.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractHash {
    pub key: String,
    pub fields: Vec<(String, String)>,
}

#[async_trait]
pub trait QuoteCache: Send + Sync {
    /// Last traded price of the underlying, `None` when the key, the field or
    /// a usable value is missing.
    async fn read_last(&self, symbol: &str) -> Result<Option<f64>, CacheError>;

    /// Writes every row as hash fields under its key, last writer wins. The
    /// batch is all-or-nothing: on error no row of it is visible.
    async fn write_contract_rows(&self, rows: &[ContractHash]) -> Result<(), CacheError>;

    /// Stores a whole snapshot as a single string value.
    async fn write_snapshot(&self, key: &str, json: &str) -> Result<(), CacheError>;
}

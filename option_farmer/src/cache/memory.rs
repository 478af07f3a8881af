use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::cache::{CacheError, ContractHash, QuoteCache, parse_price, trade_key};

#[derive(Default)]
struct State {
    hashes: HashMap<String, IndexMap<String, String>>,
    strings: HashMap<String, String>,
    rows_written: usize,
    fail_on_row: Option<usize>,
}

/// In-process cache with Redis semantics for the operations the farm uses.
/// Clones share storage, so a test can seed prices and inspect writes made
/// by workers holding their own clone.
#[derive(Clone, Default)]
pub struct MemoryCache {
    state: Arc<Mutex<State>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `TRADE_US_{symbol}` / `last` for each pair.
    pub fn with_prices<'a>(prices: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let cache = Self::new();
        for (symbol, price) in prices {
            cache.set_field(&trade_key(symbol), "last", &price.to_string());
        }
        cache
    }

    /// Makes the batch containing the `n`th contract row written through
    /// this cache (1-based, counted across batches) fail as a whole.
    pub fn fail_on_row(&self, n: usize) {
        self.lock().fail_on_row = Some(n);
    }

    pub fn set_field(&self, key: &str, field: &str, value: &str) {
        self.lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    pub fn hash(&self, key: &str) -> Option<IndexMap<String, String>> {
        self.lock().hashes.get(key).cloned()
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.lock().strings.get(key).cloned()
    }

    /// Hash keys other than trade feeds, sorted.
    pub fn contract_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .hashes
            .keys()
            .filter(|k| !k.starts_with("TRADE_US_"))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl QuoteCache for MemoryCache {
    async fn read_last(&self, symbol: &str) -> Result<Option<f64>, CacheError> {
        Ok(self
            .lock()
            .hashes
            .get(&trade_key(symbol))
            .and_then(|h| h.get("last"))
            .and_then(|v| parse_price(v)))
    }

    async fn write_contract_rows(&self, rows: &[ContractHash]) -> Result<(), CacheError> {
        let mut state = self.lock();
        let first = state.rows_written + 1;
        let last = state.rows_written + rows.len();
        if let Some(n) = state.fail_on_row.filter(|n| (first..=last).contains(n)) {
            return Err(CacheError::Unavailable(format!(
                "injected failure on row {n}"
            )));
        }
        state.rows_written = last;
        for row in rows {
            let hash = state.hashes.entry(row.key.clone()).or_default();
            for (field, value) in &row.fields {
                hash.insert(field.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn write_snapshot(&self, key: &str, json: &str) -> Result<(), CacheError> {
        self.lock().strings.insert(key.to_string(), json.to_string());
        Ok(())
    }
}

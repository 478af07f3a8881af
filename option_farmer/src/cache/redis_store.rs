use async_trait::async_trait;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tracing::debug;

use crate::cache::{CacheError, ContractHash, QuoteCache, parse_price, trade_key};

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/";

/// Redis-backed cache. Each instance owns one multiplexed connection; clone it
/// to share the connection, or [`connect`](Self::connect) again for a new one.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl QuoteCache for RedisCache {
    async fn read_last(&self, symbol: &str) -> Result<Option<f64>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(trade_key(symbol), "last").await?;
        let price = raw.as_deref().and_then(parse_price);
        if raw.is_some() && price.is_none() {
            debug!(symbol, value = ?raw, "cached last price is not a number");
        }
        Ok(price)
    }

    async fn write_contract_rows(&self, rows: &[ContractHash]) -> Result<(), CacheError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for row in rows.iter().filter(|r| !r.fields.is_empty()) {
            pipe.hset_multiple(&row.key, row.fields.as_slice()).ignore();
        }
        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        debug!(rows = rows.len(), "wrote contract rows in one transaction");
        Ok(())
    }

    async fn write_snapshot(&self, key: &str, json: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, json).await?;
        Ok(())
    }
}

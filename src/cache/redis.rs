use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use super::{BalanceCache, CacheError};

const KEY_PREFIX: &str = "balance:";

fn balance_key(id: &str) -> String {
    format!("{KEY_PREFIX}{id}")
}

/// Redis-backed cache, `balance:{id}` -> balance with `SET EX`.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    ttl: Duration,
}

impl RedisCache {
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(RedisCache { manager, ttl })
    }
}

#[async_trait]
impl BalanceCache for RedisCache {
    async fn get(&self, id: &str) -> Result<Option<f64>, CacheError> {
        let mut conn = self.manager.clone();
        let balance: Option<f64> = conn.get(balance_key(id)).await?;
        Ok(balance)
    }

    async fn set(&self, id: &str, balance: f64) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(balance_key(id), balance, self.ttl.as_secs().max(1))
            .await?;
        Ok(())
    }
}

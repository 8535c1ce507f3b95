use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database call timed out after {0:?}")]
    Timeout(Duration),

    #[error("database unavailable: {0}")]
    Unavailable(String),
}

/// Durable record of account balances.
///
/// The in-memory registry is what requests read; the store only receives
/// copies of balances and is consulted to recover accounts missing from
/// memory.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn init_schema(&self) -> Result<(), StoreError>;

    /// Inserts a new row. Returns `false`, leaving the row untouched, when
    /// the id is already stored.
    async fn persist_create(&self, id: &str, balance: f64) -> Result<bool, StoreError>;

    async fn persist_update(&self, id: &str, balance: f64) -> Result<(), StoreError>;

    async fn fetch_balance(&self, id: &str) -> Result<Option<f64>, StoreError>;
}

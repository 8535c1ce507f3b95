use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

use super::api::{AccountStore, StoreError};

/// Store kept in process memory. Stands in for postgres when the database is
/// disabled; tests use it to inject failures and slow writes.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    rows: DashMap<String, f64>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn row(&self, id: &str) -> Option<f64> {
        self.rows.get(id).map(|balance| *balance)
    }

    async fn check(&self) -> Result<(), StoreError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn init_schema(&self) -> Result<(), StoreError> {
        self.check().await
    }

    async fn persist_create(&self, id: &str, balance: f64) -> Result<bool, StoreError> {
        self.check().await?;
        match self.rows.entry(id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(balance);
                Ok(true)
            }
        }
    }

    async fn persist_update(&self, id: &str, balance: f64) -> Result<(), StoreError> {
        self.check().await?;
        self.rows.insert(id.to_string(), balance);
        Ok(())
    }

    async fn fetch_balance(&self, id: &str) -> Result<Option<f64>, StoreError> {
        self.check().await?;
        Ok(self.row(id))
    }
}

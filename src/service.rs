use std::{future::Future, sync::Arc, time::Duration};

use tokio::task::JoinHandle;

use crate::{
    cache::BalanceCache,
    config::Config,
    db::{
        account::Account,
        api::{AccountStore, StoreError},
        registry::Registry,
    },
    error::AppError,
};

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Upper bound on every durable-store call.
    pub store_timeout: Duration,
    pub recover_from_store: bool,
    pub rollback_withdraw_on_persist_failure: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        ServiceOptions {
            store_timeout: Duration::from_secs(5),
            recover_from_store: true,
            rollback_withdraw_on_persist_failure: false,
        }
    }
}

impl From<&Config> for ServiceOptions {
    fn from(config: &Config) -> Self {
        ServiceOptions {
            store_timeout: Duration::from_millis(config.server.request_timeout),
            recover_from_store: config.database.recover_from_store,
            rollback_withdraw_on_persist_failure: config.withdraw.rollback_on_persist_failure,
        }
    }
}

/// Applies balance mutations to the registry and propagates them to the
/// store and cache.
///
/// Deposits are acknowledged as soon as the in-memory balance changes; the
/// store write runs as a detached task whose failure is only logged.
/// Withdrawals wait for the store write, and a failed write is reported to
/// the caller even though the in-memory balance has already moved (unless
/// `rollback_withdraw_on_persist_failure` is set).
pub struct AccountService {
    registry: Arc<Registry>,
    store: Arc<dyn AccountStore>,
    cache: Arc<dyn BalanceCache>,
    options: ServiceOptions,
}

impl AccountService {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<dyn AccountStore>,
        cache: Arc<dyn BalanceCache>,
        options: ServiceOptions,
    ) -> Self {
        AccountService {
            registry,
            store,
            cache,
            options,
        }
    }

    #[cfg(test)]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Writes the row first and only then registers the account, so no
    /// request can reach an account the store has not accepted.
    pub async fn create(&self, id: &str, balance: f64) -> Result<f64, AppError> {
        if self.registry.get(id).is_some() {
            return Err(AppError::AccountExists(id.to_string()));
        }
        match self.bounded(self.store.persist_create(id, balance)).await {
            Ok(true) => {}
            Ok(false) => return Err(AppError::AccountExists(id.to_string())),
            Err(err) => {
                tracing::error!("Error creating account {id} in database: {err}");
                return Err(AppError::StoreUnavailable(err));
            }
        }
        // a concurrent recovery may already have registered the new row
        let account = match self.registry.create(id, balance) {
            Ok(account) => account,
            Err(_) => self.registry.lookup(id)?,
        };
        {
            let _writes = account.lock_writes().await;
            write_cache(self.cache.as_ref(), id, account.balance()).await;
        }
        tracing::info!(
            "Created account {id} with balance {balance:.2}, {} accounts registered",
            self.registry.len()
        );
        Ok(balance)
    }

    pub async fn deposit(&self, id: &str, amount: f64) -> Result<f64, AppError> {
        let account = self.resolve(id).await?;
        let balance = account.deposit(amount)?;
        self.spawn_persist(account);
        Ok(balance)
    }

    pub async fn withdraw(&self, id: &str, amount: f64) -> Result<f64, AppError> {
        let account = self.resolve(id).await?;
        let mut balance = account.withdraw(amount)?;

        let _writes = account.lock_writes().await;
        let snapshot = account.balance();
        if let Err(err) = self.bounded(self.store.persist_update(id, snapshot)).await {
            tracing::error!("Error updating balance in database for account {id}: {err}");
            if self.options.rollback_withdraw_on_persist_failure {
                match account.deposit(amount) {
                    Ok(restored) => {
                        balance = restored;
                        tracing::warn!(
                            "Rolled back withdrawal of {amount:.2} from account {id}, \
                             balance {balance:.2}"
                        );
                    }
                    Err(rollback) => {
                        tracing::error!("Rollback failed for account {id}: {rollback}")
                    }
                }
            }
            return Err(AppError::WithdrawNotPersisted {
                id: id.to_string(),
                source: err,
            });
        }
        write_cache(self.cache.as_ref(), id, snapshot).await;
        Ok(balance)
    }

    pub async fn balance(&self, id: &str) -> Result<f64, AppError> {
        if let Some(account) = self.registry.get(id) {
            return Ok(account.balance());
        }
        match self.cache.get(id).await {
            Ok(Some(balance)) => {
                tracing::debug!("Served balance for account {id} from cache");
                return Ok(balance);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!("Cache read failed for account {id}: {err}"),
        }
        let account = self.recover(id).await?;
        Ok(account.balance())
    }

    /// Finds the account in memory or, failing that, in the store.
    pub async fn resolve(&self, id: &str) -> Result<Arc<Account>, AppError> {
        match self.registry.lookup(id) {
            Ok(account) => Ok(account),
            Err(_) => self.recover(id).await,
        }
    }

    // recover hydrates an account that the store knows but memory does not
    async fn recover(&self, id: &str) -> Result<Arc<Account>, AppError> {
        if !self.options.recover_from_store {
            return Err(AppError::AccountNotFound(id.to_string()));
        }
        match self.bounded(self.store.fetch_balance(id)).await {
            Ok(Some(balance)) => {
                tracing::info!("Recovered account {id} from database with balance {balance:.2}");
                Ok(self.registry.insert_if_absent(id, balance))
            }
            Ok(None) => Err(AppError::AccountNotFound(id.to_string())),
            Err(err) => {
                tracing::warn!("Error reading account {id} from database: {err}");
                Err(AppError::AccountNotFound(id.to_string()))
            }
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timeout = self.options.store_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(timeout))?
    }

    // the balance is read after taking the write lock, so a task that waited
    // behind a slower one still writes the newest value.
    // The returned handle is only awaited by tests.
    fn spawn_persist(&self, account: Arc<Account>) -> JoinHandle<()> {
        let store = self.store.clone();
        let cache = self.cache.clone();
        let timeout = self.options.store_timeout;
        tokio::spawn(async move {
            let _writes = account.lock_writes().await;
            let id = account.id();
            let balance = account.balance();
            match tokio::time::timeout(timeout, store.persist_update(id, balance)).await {
                Ok(Ok(())) => tracing::debug!("Persisted balance {balance:.2} for account {id}"),
                Ok(Err(err)) => {
                    tracing::error!("Error updating balance for account {id}. Error: {err}")
                }
                Err(_) => tracing::error!(
                    "Error updating balance for account {id}. Error: timed out after {timeout:?}"
                ),
            }
            write_cache(cache.as_ref(), id, balance).await;
        })
    }
}

async fn write_cache(cache: &dyn BalanceCache, id: &str, balance: f64) {
    if let Err(err) = cache.set(id, balance).await {
        tracing::warn!("Cache write failed for account {id}: {err}");
    }
}

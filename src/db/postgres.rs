use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

use super::api::{AccountStore, StoreError};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS accounts (\
    id TEXT PRIMARY KEY, \
    balance DOUBLE PRECISION NOT NULL)";

const INSERT_ACCOUNT: &str = "INSERT INTO accounts (id, balance) VALUES ($1, $2) \
    ON CONFLICT (id) DO NOTHING";

const UPSERT_BALANCE: &str = "INSERT INTO accounts (id, balance) VALUES ($1, $2) \
    ON CONFLICT (id) DO UPDATE SET balance = EXCLUDED.balance";

const SELECT_BALANCE: &str = "SELECT balance FROM accounts WHERE id = $1";

#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        PgAccountStore { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn persist_create(&self, id: &str, balance: f64) -> Result<bool, StoreError> {
        let result = sqlx::query(INSERT_ACCOUNT)
            .bind(id)
            .bind(balance)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn persist_update(&self, id: &str, balance: f64) -> Result<(), StoreError> {
        sqlx::query(UPSERT_BALANCE)
            .bind(id)
            .bind(balance)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_balance(&self, id: &str) -> Result<Option<f64>, StoreError> {
        let balance = sqlx::query_scalar::<_, f64>(SELECT_BALANCE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // needs a running postgres: DATABASE_URL=postgres://... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_postgres_round_trip() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PgAccountStore::connect(&url, 2).await.unwrap();
        store.init_schema().await.unwrap();

        let id = format!("pg-test-{}", uuid::Uuid::new_v4());
        assert!(store.persist_create(&id, 100.0).await.unwrap());
        assert!(!store.persist_create(&id, 1.0).await.unwrap());
        assert_eq!(store.fetch_balance(&id).await.unwrap(), Some(100.0));
        store.persist_update(&id, 42.5).await.unwrap();
        assert_eq!(store.fetch_balance(&id).await.unwrap(), Some(42.5));
        assert_eq!(store.fetch_balance("missing-account").await.unwrap(), None);
    }
}

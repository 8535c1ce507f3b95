use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};

use super::account::Account;
use crate::error::AppError;

/// In-memory directory of accounts.
///
/// The map's shard locks only guard insertion and lookup. They are released
/// before the caller touches the returned account, whose balance is guarded
/// by its own lock, so operations on different accounts never wait on each
/// other.
#[derive(Debug, Default)]
pub struct Registry {
    accounts: DashMap<String, Arc<Account>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            accounts: DashMap::new(),
        }
    }

    // create refuses to replace an existing account
    pub fn create(&self, id: &str, balance: f64) -> Result<Arc<Account>, AppError> {
        match self.accounts.entry(id.to_string()) {
            Entry::Occupied(_) => Err(AppError::AccountExists(id.to_string())),
            Entry::Vacant(entry) => {
                let account = Arc::new(Account::new(id, balance));
                entry.insert(account.clone());
                Ok(account)
            }
        }
    }

    // insert_if_absent returns whichever account ends up registered under id
    pub fn insert_if_absent(&self, id: &str, balance: f64) -> Arc<Account> {
        self.accounts
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Account::new(id, balance)))
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Account>> {
        self.accounts.get(id).map(|account| account.clone())
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<Account>, AppError> {
        self.get(id)
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let registry = Registry::new();
        registry.create("123", 100.0).unwrap();
        let account = registry.lookup("123").unwrap();
        assert_eq!(account.balance(), 100.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = Registry::new();
        assert_eq!(registry.len(), 0);
        assert!(matches!(
            registry.lookup("nope"),
            Err(AppError::AccountNotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_lookup_shares_instance() {
        let registry = Registry::new();
        let created = registry.create("a", 0.0).unwrap();
        let first = registry.lookup("a").unwrap();
        let second = registry.lookup("a").unwrap();
        first.deposit(5.0).unwrap();
        assert!(Arc::ptr_eq(&created, &second));
        assert_eq!(second.balance(), 5.0);
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let registry = Registry::new();
        registry.create("a", 10.0).unwrap();
        assert!(matches!(
            registry.create("a", 99.0),
            Err(AppError::AccountExists(_))
        ));
        assert_eq!(registry.lookup("a").unwrap().balance(), 10.0);
    }

    #[test]
    fn test_insert_if_absent_keeps_existing() {
        let registry = Registry::new();
        registry.create("a", 10.0).unwrap();
        let account = registry.insert_if_absent("a", 99.0);
        assert_eq!(account.balance(), 10.0);
        let fresh = registry.insert_if_absent("b", 7.0);
        assert_eq!(fresh.balance(), 7.0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_accounts() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let id = format!("acc-{i}");
                    registry.create(&id, 0.0).unwrap();
                    for _ in 0..100 {
                        registry.lookup(&id).unwrap().deposit(1.0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 16);
        for i in 0..16 {
            assert_eq!(registry.lookup(&format!("acc-{i}")).unwrap().balance(), 100.0);
        }
    }
}

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::error::AppError;

/// A single account. The balance is only touched while holding the
/// account's own lock, and the lock is never held across I/O.
///
/// Store and cache writes for the account take `writes` instead, which is
/// held across the write so that copies of the balance land in the order
/// they were read.
#[derive(Debug)]
pub struct Account {
    id: String,
    balance: Mutex<f64>,
    writes: AsyncMutex<()>,
}

impl Account {
    pub fn new(id: impl Into<String>, balance: f64) -> Self {
        Account {
            id: id.into(),
            balance: Mutex::new(balance),
            writes: AsyncMutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // deposit returns the balance right after the increment and refuses
    // to push it past the largest finite value
    pub fn deposit(&self, amount: f64) -> Result<f64, AppError> {
        let (prior, current) = {
            let mut balance = self.balance.lock();
            let next = *balance + amount;
            if !next.is_finite() {
                return Err(AppError::validation(format!(
                    "deposit of {amount} would overflow the balance of account {}",
                    self.id
                )));
            }
            let prior = *balance;
            *balance = next;
            (prior, next)
        };
        tracing::info!(
            "Deposited: {amount:.2} to account {}. Balance: {prior:.2} -> {current:.2}",
            self.id
        );
        Ok(current)
    }

    // withdraw leaves the balance untouched when funds are insufficient
    pub fn withdraw(&self, amount: f64) -> Result<f64, AppError> {
        let (prior, current) = {
            let mut balance = self.balance.lock();
            if *balance < amount {
                return Err(AppError::InsufficientFunds {
                    id: self.id.clone(),
                    balance: *balance,
                    requested: amount,
                });
            }
            let prior = *balance;
            *balance -= amount;
            (prior, *balance)
        };
        tracing::info!(
            "Withdrew: {amount:.2} from account {}. Balance: {prior:.2} -> {current:.2}",
            self.id
        );
        Ok(current)
    }

    pub fn balance(&self) -> f64 {
        let balance = *self.balance.lock();
        tracing::debug!("Checked balance for account {}: {balance:.2}", self.id);
        balance
    }

    /// Serializes outbound copies of this account's balance.
    pub async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().await
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use rstest::rstest;

    use super::*;

    #[test]
    fn test_deposit_withdraw() {
        let account = Account::new("123", 100.0);
        assert_eq!(account.deposit(50.0).unwrap(), 150.0);
        assert_eq!(account.withdraw(75.0).unwrap(), 75.0);
        assert_eq!(account.balance(), 75.0);
        assert_eq!(account.id(), "123");
    }

    #[test]
    fn test_insufficient_funds_keeps_balance() {
        let account = Account::new("123", 75.0);
        let err = account.withdraw(100.0).unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientFunds { balance, requested, .. }
                if balance == 75.0 && requested == 100.0
        ));
        assert_eq!(account.balance(), 75.0);
    }

    #[test]
    fn test_withdraw_whole_balance() {
        let account = Account::new("a", 10.0);
        assert_eq!(account.withdraw(10.0).unwrap(), 0.0);
        assert!(account.withdraw(0.5).is_err());
    }

    #[test]
    fn test_deposit_overflow_rejected() {
        let account = Account::new("big", 1e308);
        let err = account.deposit(1e308).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(account.balance(), 1e308);
        assert_eq!(account.withdraw(1e308).unwrap(), 0.0);
    }

    // final = initial + deposits - successful withdrawals
    #[rstest]
    #[case(0.0, &[10.0, -5.0, -10.0, 3.0], 8.0)]
    #[case(100.0, &[-150.0, 25.0, -125.0], 0.0)]
    #[case(5.0, &[-6.0, -6.0, -5.0], 0.0)]
    #[case(1.0, &[2.0, 4.0, -8.0, -7.0], 0.0)]
    fn test_sequence_balance(#[case] initial: f64, #[case] ops: &[f64], #[case] expected: f64) {
        let account = Account::new("seq", initial);
        for &op in ops {
            if op >= 0.0 {
                account.deposit(op).unwrap();
            } else {
                let _ = account.withdraw(-op);
            }
        }
        assert_eq!(account.balance(), expected);
    }

    #[test]
    fn test_concurrent_deposits_never_lose_updates() {
        let account = Arc::new(Account::new("hot", 0.0));
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let account = account.clone();
                thread::spawn(move || {
                    account.deposit(1.0).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(account.balance(), 100.0);
    }

    #[test]
    fn test_concurrent_withdrawals_never_overdraw() {
        let account = Arc::new(Account::new("hot", 50.0));
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let account = account.clone();
                thread::spawn(move || account.withdraw(1.0).is_ok())
            })
            .collect();
        let succeeded = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(succeeded, 50);
        assert_eq!(account.balance(), 0.0);
    }
}

//! In-memory account store.
//!
//! Reference implementation used by tests and by deployments that accept
//! losing state on restart. The conditional-write semantics are identical
//! to the file-backed store.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use super::{AccountStore, StoreError};
use crate::account::{Account, AccountId};

/// Thread-safe in-memory store keyed by account id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AccountStore for MemoryStore {
    async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn get_by_owner(&self, owner_key: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.owner_key.eq_ignore_ascii_case(owner_key))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        let mut all: Vec<Account> = accounts.values().cloned().collect();
        all.sort_by_key(|a| a.created_at);
        Ok(all)
    }

    async fn insert(&self, mut account: Account) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts
            .values()
            .any(|a| a.owner_key.eq_ignore_ascii_case(&account.owner_key))
        {
            return Err(StoreError::DuplicateOwner {
                owner_key: account.owner_key,
            });
        }
        let now = Utc::now();
        account.created_at = now;
        account.updated_at = now;
        account.version = 1;
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn compare_and_update(&self, mut account: Account) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().await;
        let stored = accounts
            .get(&account.id)
            .ok_or(StoreError::NotFound { id: account.id })?;
        if stored.version != account.version {
            return Err(StoreError::Conflict {
                id: account.id,
                expected: account.version,
                stored: stored.version,
            });
        }
        account.version += 1;
        account.updated_at = Utc::now();
        accounts.insert(account.id, account.clone());
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Recipient;

    fn sample(owner: &str) -> Account {
        Account::new(
            owner,
            30,
            vec![Recipient::new("A", "a@example.com", 100)],
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn insert_stamps_version_and_rejects_duplicate_owner() {
        let store = MemoryStore::new();
        let stored = store.insert(sample("Owner-One")).await.unwrap();
        assert_eq!(stored.version, 1);

        // Owner uniqueness is case-insensitive.
        let err = store.insert(sample("owner-one")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateOwner { .. }));
    }

    #[tokio::test]
    async fn lookup_by_owner_is_case_insensitive() {
        let store = MemoryStore::new();
        let stored = store.insert(sample("Owner-One")).await.unwrap();
        let found = store.get_by_owner("OWNER-ONE").await.unwrap().unwrap();
        assert_eq!(found.id, stored.id);
    }

    #[tokio::test]
    async fn stale_version_loses_the_race() {
        let store = MemoryStore::new();
        let stored = store.insert(sample("owner-one")).await.unwrap();

        let first = stored.clone();
        let updated = store.compare_and_update(first).await.unwrap();
        assert_eq!(updated.version, 2);

        // A second writer holding the original read now conflicts.
        let err = store.compare_and_update(stored).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: 1,
                stored: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn list_orders_by_creation_time() {
        let store = MemoryStore::new();
        store.insert(sample("owner-one")).await.unwrap();
        store.insert(sample("owner-two")).await.unwrap();
        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at <= all[1].created_at);
    }
}

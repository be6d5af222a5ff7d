//! Account store contract and reference implementations.
//!
//! The store is the single serialization point of the whole system: the
//! version-keyed [`AccountStore::compare_and_update`] is the only mutation
//! path, and its conflict signal is what makes the monitor's race-skipping
//! and the orchestrator's resumability correct without a separate locking
//! service.

mod file;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::account::{Account, AccountId};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors returned by account stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The account does not exist.
    #[error("account not found: {id}")]
    NotFound {
        /// The missing account id.
        id: AccountId,
    },

    /// An account with this owner key already exists.
    #[error("owner key already registered: {owner_key}")]
    DuplicateOwner {
        /// The conflicting owner key.
        owner_key: String,
    },

    /// A compare-and-update lost its race: the stored version moved past
    /// the version the caller read. Another actor already progressed this
    /// account.
    #[error("version conflict for account {id}: expected {expected}, stored {stored}")]
    Conflict {
        /// The contended account id.
        id: AccountId,
        /// The version the caller based its update on.
        expected: u64,
        /// The version actually stored.
        stored: u64,
    },

    /// Underlying I/O failure.
    #[error("store i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted document could not be encoded or decoded.
    #[error("store serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable keyed storage for account records.
///
/// `owner_key` lookups are case-insensitive; implementations keep a
/// lowercase secondary index semantics over the same records.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetches an account by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] / [`StoreError::Serialization`] on
    /// storage failure.
    async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Fetches an account by owner key, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] / [`StoreError::Serialization`] on
    /// storage failure.
    async fn get_by_owner(&self, owner_key: &str) -> Result<Option<Account>, StoreError>;

    /// Lists all accounts, ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] / [`StoreError::Serialization`] on
    /// storage failure.
    async fn list(&self) -> Result<Vec<Account>, StoreError>;

    /// Inserts a new account, stamping `created_at`/`updated_at` and the
    /// initial version. Rejects a second account for the same owner key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateOwner`] if the owner key is taken.
    async fn insert(&self, account: Account) -> Result<Account, StoreError>;

    /// Conditionally replaces an account record. Succeeds only if the
    /// stored version equals `account.version` (the version the caller
    /// read); on success the store bumps the version and `updated_at` and
    /// returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on a lost race and
    /// [`StoreError::NotFound`] if the account vanished.
    async fn compare_and_update(&self, account: Account) -> Result<Account, StoreError>;
}

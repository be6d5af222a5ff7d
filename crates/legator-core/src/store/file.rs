//! File-backed account store.
//!
//! Persists the whole population as one human-readable JSON document,
//! mirroring the store's in-memory map. Every mutation rewrites the
//! document atomically (temp file in the same directory, then rename), so
//! a crash mid-write never leaves a torn database behind.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{AccountStore, StoreError};
use crate::account::{Account, AccountId};

/// On-disk document layout.
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    accounts: Vec<Account>,
}

const DOCUMENT_VERSION: u32 = 1;

/// JSON-file store. All records are held in memory; the file is the
/// durable copy rewritten on every mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl FileStore {
    /// Opens the store at `path`, creating an empty database (and parent
    /// directories) if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be read or created,
    /// or [`StoreError::Serialization`] if an existing file is not a valid
    /// store document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let accounts = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let document: StoreDocument = serde_json::from_str(&contents)?;
                document
                    .accounts
                    .into_iter()
                    .map(|a| (a.id, a))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let empty = HashMap::new();
                write_document(&path, &empty)?;
                empty
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        Ok(Self {
            path,
            accounts: RwLock::new(accounts),
        })
    }

    /// The path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Serializes the map and atomically replaces the backing file.
fn write_document(path: &Path, accounts: &HashMap<AccountId, Account>) -> Result<(), StoreError> {
    let mut all: Vec<Account> = accounts.values().cloned().collect();
    all.sort_by_key(|a| a.created_at);
    let document = StoreDocument {
        version: DOCUMENT_VERSION,
        accounts: all,
    };
    let contents = serde_json::to_vec_pretty(&document)?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(&contents)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[async_trait::async_trait]
impl AccountStore for FileStore {
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
        write_document(&self.path, &accounts)?;
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
        write_document(&self.path, &accounts)?;
        Ok(account)
    }
}

// ============================
// crates/backend-lib/src/storage.rs
// ============================
//! Account storage abstraction with in-memory and flat-file implementations.
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use multiauth_common::{AccountId, AccountSummary, Guard};
use serde::{Deserialize, Serialize};
use tokio::{fs as tokio_fs, sync::Mutex};

use crate::error::AppError;

/// A registered account within one guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub guard: Guard,
    pub name: String,
    /// Normalised (trimmed, lowercase) address; unique within the guard
    pub email: String,
    /// PHC-format scrypt hash
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Public view without the password hash
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            guard: self.guard,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Trait for account storage backends
///
/// Callers pass emails already normalised. Implementations must make the
/// uniqueness check and the insert in `insert_account` a single atomic step.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Look an account up by email within a guard
    async fn find_account(&self, guard: Guard, email: &str) -> Result<Option<Account>, AppError>;

    /// Look an account up by id within a guard
    async fn find_account_by_id(
        &self,
        guard: Guard,
        id: AccountId,
    ) -> Result<Option<Account>, AppError>;

    /// Persist a new account, failing with `DuplicateEmail` on conflict
    async fn insert_account(&self, account: Account) -> Result<(), AppError>;
}

/// Volatile storage, handy for tests and single-process deployments
#[derive(Clone, Default)]
pub struct MemoryStorage {
    accounts: Arc<DashMap<(Guard, String), Account>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts across all guards
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn find_account(&self, guard: Guard, email: &str) -> Result<Option<Account>, AppError> {
        Ok(self
            .accounts
            .get(&(guard, email.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn find_account_by_id(
        &self,
        guard: Guard,
        id: AccountId,
    ) -> Result<Option<Account>, AppError> {
        Ok(self
            .accounts
            .iter()
            .find(|entry| entry.key().0 == guard && entry.value().id == id)
            .map(|entry| entry.value().clone()))
    }

    async fn insert_account(&self, account: Account) -> Result<(), AppError> {
        match self.accounts.entry((account.guard, account.email.clone())) {
            Entry::Occupied(_) => Err(AppError::DuplicateEmail),
            Entry::Vacant(slot) => {
                slot.insert(account);
                Ok(())
            }
        }
    }
}

/// Flat-file implementation of the Storage trait
///
/// Layout: `<root>/<guard>/accounts.json`, a JSON array of accounts. Writers
/// are serialised and replace the file through a rename so readers never
/// see a half-written document.
#[derive(Clone)]
pub struct FlatFileStorage {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        for guard in Guard::ALL {
            fs::create_dir_all(root.join(guard.as_str()))?;
        }
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn accounts_path(&self, guard: Guard) -> PathBuf {
        self.root.join(guard.as_str()).join("accounts.json")
    }

    async fn read_accounts(&self, guard: Guard) -> Result<Vec<Account>, AppError> {
        let path = self.accounts_path(guard);
        if !tokio_fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }

        let content = tokio_fs::read_to_string(&path).await?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_accounts(&self, guard: Guard, accounts: &[Account]) -> Result<(), AppError> {
        let path = self.accounts_path(guard);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(accounts)?;
        tokio_fs::write(&tmp, json).await?;
        tokio_fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FlatFileStorage {
    async fn find_account(&self, guard: Guard, email: &str) -> Result<Option<Account>, AppError> {
        let accounts = self.read_accounts(guard).await?;
        Ok(accounts.into_iter().find(|a| a.email == email))
    }

    async fn find_account_by_id(
        &self,
        guard: Guard,
        id: AccountId,
    ) -> Result<Option<Account>, AppError> {
        let accounts = self.read_accounts(guard).await?;
        Ok(accounts.into_iter().find(|a| a.id == id))
    }

    async fn insert_account(&self, account: Account) -> Result<(), AppError> {
        let _lock = self.write_lock.lock().await;

        let mut accounts = self.read_accounts(account.guard).await?;
        if accounts.iter().any(|a| a.email == account.email) {
            return Err(AppError::DuplicateEmail);
        }

        let guard = account.guard;
        accounts.push(account);
        self.write_accounts(guard, &accounts).await
    }
}

// ============================
// crates/backend-lib/src/auth/credentials.rs
// ============================
//! Credential store: password hashing on top of account storage.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use multiauth_common::{AccountId, Guard};

use super::password::{hash_password_secure, hash_password_with_cost, verify_password};
use crate::error::AppError;
use crate::storage::{Account, Storage};
use crate::validation::normalize_email;

/// Hashing and lookup of accounts, with bounded storage calls
pub struct CredentialStore<S> {
    storage: S,
    log_n: u8,
    timeout: Duration,
    /// Verified against when an account does not exist
    dummy_hash: Arc<str>,
}

impl<S: Storage> CredentialStore<S> {
    /// `log_n` is the scrypt cost for new hashes, `timeout` bounds each
    /// storage call
    pub fn new(storage: S, log_n: u8, timeout: Duration) -> anyhow::Result<Self> {
        let dummy_hash = hash_password_with_cost("multiauth-dummy-password", log_n)?;
        Ok(Self {
            storage,
            log_n,
            timeout,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "storage call timed out");
                Err(AppError::StoreTimeout(self.timeout))
            }
        }
    }

    /// Look an account up by email
    pub async fn find_by_email(&self, guard: Guard, email: &str) -> Result<Option<Account>, AppError> {
        let email = normalize_email(email);
        self.bounded(self.storage.find_account(guard, &email)).await
    }

    /// Look an account up by id
    pub async fn find_by_id(&self, guard: Guard, id: AccountId) -> Result<Option<Account>, AppError> {
        self.bounded(self.storage.find_account_by_id(guard, id)).await
    }

    /// Hash the password and persist a new account
    pub async fn create(
        &self,
        guard: Guard,
        name: &str,
        email: &str,
        mut plaintext: String,
    ) -> Result<Account, AppError> {
        let email = normalize_email(email);

        // Skip the expensive hash for an obvious duplicate; the insert below
        // still decides races.
        if self.bounded(self.storage.find_account(guard, &email)).await?.is_some() {
            return Err(AppError::DuplicateEmail);
        }

        let log_n = self.log_n;
        let password_hash = tokio::task::spawn_blocking(move || hash_password_secure(&mut plaintext, log_n))
            .await?
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

        let account = Account {
            id: uuid::Uuid::new_v4(),
            guard,
            name: name.trim().to_string(),
            email,
            password_hash,
            created_at: Utc::now(),
        };

        self.bounded(self.storage.insert_account(account.clone())).await?;
        Ok(account)
    }

    /// Check a password against an account's stored hash
    pub async fn verify(&self, account: &Account, plaintext: &str) -> bool {
        Self::verify_hash(account.password_hash.clone(), plaintext.to_string()).await
    }

    /// Spend one verification when there is no account to check against
    pub async fn verify_missing(&self, plaintext: &str) {
        let _ = Self::verify_hash(self.dummy_hash.to_string(), plaintext.to_string()).await;
    }

    async fn verify_hash(hash: String, plaintext: String) -> bool {
        match tokio::task::spawn_blocking(move || verify_password(&hash, &plaintext)).await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::error!(error = %e, "password verification task failed");
                false
            }
        }
    }
}

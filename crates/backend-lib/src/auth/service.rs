// =============
// crates/backend-lib/src/auth/service.rs
// =============
//! This module defines the `AuthService` trait, the surface handlers talk to
use async_trait::async_trait;
use multiauth_common::Guard;
use std::net::IpAddr;

use super::Session;
use crate::error::AppError;
use crate::storage::Account;
use crate::validation::RegisterInput;

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Check the throttle, verify the credentials and issue a session.
    /// A locked key fails with `Throttled` before any lookup happens;
    /// unknown email and wrong password both fail with `InvalidCredentials`.
    async fn login(
        &self,
        guard: Guard,
        email: &str,
        password: &str,
        source: IpAddr,
    ) -> Result<Session, AppError>;

    /// Validate a registration form and create the account
    async fn register(&self, guard: Guard, input: RegisterInput) -> Result<Account, AppError>;

    /// Issue a session for an account without a credential check
    async fn start_session(&self, account: &Account) -> Session;

    /// Revoke a session; unknown tokens are fine
    async fn logout(&self, token: &str);

    /// Resolve a token to its account within `guard`, `None` when not
    /// authenticated
    async fn current_account(&self, guard: Guard, token: &str) -> Result<Option<Account>, AppError>;
}

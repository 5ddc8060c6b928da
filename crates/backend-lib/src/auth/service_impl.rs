use async_trait::async_trait;
use metrics::counter;
use multiauth_common::Guard;
use std::net::IpAddr;
use zeroize::Zeroize;

use super::{
    AuthService, CredentialStore, LoginThrottle, Session, SessionGuard, ThrottleKey, ThrottlePolicy,
};
use crate::config::Settings;
use crate::error::AppError;
use crate::metrics as keys;
use crate::storage::{Account, Storage};
use crate::validation::{validate_login, validate_registration, RegisterInput};

/// Auth service composed of a credential store, a login throttle and a
/// session guard
pub struct DefaultAuth<S> {
    credentials: CredentialStore<S>,
    throttle: LoginThrottle,
    sessions: SessionGuard,
    min_password_length: usize,
}

impl<S: Storage> DefaultAuth<S> {
    pub fn new(
        credentials: CredentialStore<S>,
        throttle: LoginThrottle,
        sessions: SessionGuard,
        min_password_length: usize,
    ) -> Self {
        Self {
            credentials,
            throttle,
            sessions,
            min_password_length,
        }
    }

    /// Wire every collaborator from settings
    pub fn from_settings(storage: S, settings: &Settings) -> anyhow::Result<Self> {
        let credentials = CredentialStore::new(
            storage,
            settings.password.scrypt_log_n,
            settings.store_timeout(),
        )?;
        let throttle = LoginThrottle::new(ThrottlePolicy::from(&settings.throttle));
        let sessions = SessionGuard::new(settings.session.ttl(), settings.session.sliding);
        Ok(Self::new(
            credentials,
            throttle,
            sessions,
            settings.password.min_length,
        ))
    }

    pub fn throttle(&self) -> &LoginThrottle {
        &self.throttle
    }

    pub fn sessions(&self) -> &SessionGuard {
        &self.sessions
    }
}

#[async_trait]
impl<S: Storage> AuthService for DefaultAuth<S> {
    async fn login(
        &self,
        guard: Guard,
        email: &str,
        password: &str,
        source: IpAddr,
    ) -> Result<Session, AppError> {
        validate_login(email, password)?;

        let key = ThrottleKey::new(guard, email, source);
        let attempt = match self.throttle.begin_attempt(&key) {
            Ok(attempt) => attempt,
            Err(retry_after) => {
                counter!(keys::LOGIN_THROTTLED).increment(1);
                tracing::info!(
                    guard = %guard,
                    email = %key.email,
                    source = %source,
                    retry_after_secs = retry_after.as_secs(),
                    "login rejected while locked out"
                );
                return Err(AppError::Throttled { retry_after });
            }
        };

        // Store failures propagate as-is and hand the attempt back
        let account = match self.credentials.find_by_email(guard, email).await {
            Ok(account) => account,
            Err(e) => {
                self.throttle.release_attempt(&key);
                return Err(e);
            }
        };
        let verified = match &account {
            Some(account) => self.credentials.verify(account, password).await,
            None => {
                self.credentials.verify_missing(password).await;
                false
            }
        };

        let account = match account {
            Some(account) if verified => account,
            _ => {
                counter!(keys::LOGIN_FAILURE).increment(1);
                tracing::info!(
                    guard = %guard,
                    email = %key.email,
                    source = %source,
                    failures = attempt.failures,
                    "login failed"
                );
                return Err(AppError::InvalidCredentials);
            }
        };

        self.throttle.record_success(&key);
        let session = self.sessions.issue(&account).await;
        counter!(keys::LOGIN_SUCCESS).increment(1);
        tracing::info!(guard = %guard, account_id = %account.id, source = %source, "login succeeded");
        Ok(session)
    }

    async fn register(&self, guard: Guard, input: RegisterInput) -> Result<Account, AppError> {
        validate_registration(&input, self.min_password_length)?;

        let RegisterInput {
            name,
            email,
            password,
            mut password_confirmation,
        } = input;
        password_confirmation.zeroize();

        let account = self.credentials.create(guard, &name, &email, password).await?;
        counter!(keys::REGISTER).increment(1);
        tracing::info!(guard = %guard, account_id = %account.id, email = %account.email, "account registered");
        Ok(account)
    }

    async fn start_session(&self, account: &Account) -> Session {
        self.sessions.issue(account).await
    }

    async fn logout(&self, token: &str) {
        if self.sessions.revoke(token).await {
            tracing::info!("session revoked");
        }
    }

    async fn current_account(&self, guard: Guard, token: &str) -> Result<Option<Account>, AppError> {
        let Some(session) = self.sessions.validate(guard, token).await else {
            return Ok(None);
        };

        match self.credentials.find_by_id(guard, session.account_id).await? {
            Some(account) => Ok(Some(account)),
            None => {
                // The account is gone; its sessions must not outlive it
                let dropped = self.sessions.revoke_account(guard, session.account_id).await;
                tracing::warn!(
                    guard = %guard,
                    account_id = %session.account_id,
                    dropped,
                    "session pointed at a missing account"
                );
                Ok(None)
            }
        }
    }
}

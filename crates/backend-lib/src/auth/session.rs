// ============================
// crates/backend-lib/src/auth/session.rs
// ============================
//! Session token handling and management.
use metrics::{counter, gauge};
use multiauth_common::{AccountId, Guard};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::RwLock, time::Instant};

use super::token_generator::generate_secure_token;
use crate::metrics as keys;
use crate::storage::Account;

/// Default session TTL (time to live)
pub const SESSION_TTL: Duration = Duration::from_secs(2 * 60 * 60); // 2 hours

/// Session information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub account_id: AccountId,
    pub guard: Guard,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

impl Session {
    /// Time left before the session lapses
    pub fn expires_in(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Issues, validates and revokes sessions for every guard
#[derive(Debug, Clone)]
pub struct SessionGuard {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
    sliding: bool,
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new(SESSION_TTL, true)
    }
}

impl SessionGuard {
    /// Create a new session guard
    pub fn new(ttl: Duration, sliding: bool) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            sliding,
        }
    }

    /// Create a session bound to `account`
    pub async fn issue(&self, account: &Account) -> Session {
        let now = Instant::now();
        let session = Session {
            token: generate_secure_token(),
            account_id: account.id,
            guard: account.guard,
            issued_at: now,
            expires_at: now + self.ttl,
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.token.clone(), session.clone());

        counter!(keys::SESSION_CREATED).increment(1);
        gauge!(keys::SESSION_ACTIVE).set(sessions.len() as f64);

        session
    }

    /// Look a token up for `guard`
    ///
    /// Unknown, expired and foreign-guard tokens all yield `None`. Expired
    /// entries are dropped on the way. With sliding expiry a hit pushes the
    /// expiry forward by the TTL.
    pub async fn validate(&self, guard: Guard, token: &str) -> Option<Session> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        match sessions.get_mut(token) {
            None => return None,
            Some(session) if now < session.expires_at => {
                if session.guard != guard {
                    return None;
                }
                if self.sliding {
                    session.expires_at = now + self.ttl;
                }
                return Some(session.clone());
            }
            Some(_) => {}
        }

        sessions.remove(token);
        counter!(keys::SESSION_EXPIRED).increment(1);
        gauge!(keys::SESSION_ACTIVE).set(sessions.len() as f64);
        None
    }

    /// Delete a session; unknown tokens are ignored
    pub async fn revoke(&self, token: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(token).is_some();
        if removed {
            counter!(keys::SESSION_REVOKED).increment(1);
            gauge!(keys::SESSION_ACTIVE).set(sessions.len() as f64);
        }
        removed
    }

    /// Delete every session of one account
    pub async fn revoke_account(&self, guard: Guard, account_id: AccountId) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !(s.guard == guard && s.account_id == account_id));
        let removed = before - sessions.len();
        if removed > 0 {
            counter!(keys::SESSION_REVOKED).increment(removed as u64);
            gauge!(keys::SESSION_ACTIVE).set(sessions.len() as f64);
        }
        removed
    }

    /// Remove expired sessions, returning how many were dropped
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before_count = sessions.len();

        sessions.retain(|_, session| now < session.expires_at);

        let after_count = sessions.len();
        let removed = before_count - after_count;
        if removed > 0 {
            counter!(keys::SESSION_EXPIRED).increment(removed as u64);
            gauge!(keys::SESSION_ACTIVE).set(after_count as f64);
        }
        removed
    }

    /// Number of stored sessions, expired ones included until swept
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account(guard: Guard) -> Account {
        Account {
            id: uuid::Uuid::new_v4(),
            guard,
            name: "Alice".to_string(),
            email: "alice@x.com".to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let sessions = SessionGuard::default();
        let admin = account(Guard::Admin);
        let session = sessions.issue(&admin).await;

        let found = sessions.validate(Guard::Admin, &session.token).await.unwrap();
        assert_eq!(found.account_id, admin.id);
        assert_eq!(found.guard, Guard::Admin);
        assert!(sessions.validate(Guard::Admin, "invalid_token").await.is_none());
    }

    #[tokio::test]
    async fn test_validate_is_guard_scoped() {
        let sessions = SessionGuard::default();
        let session = sessions.issue(&account(Guard::User)).await;

        assert!(sessions.validate(Guard::Admin, &session.token).await.is_none());
        // A wrong-guard lookup does not destroy the session
        assert!(sessions.validate(Guard::User, &session.token).await.is_some());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let sessions = SessionGuard::default();
        let session = sessions.issue(&account(Guard::Admin)).await;

        assert!(sessions.revoke(&session.token).await);
        assert!(!sessions.revoke(&session.token).await);
        assert!(sessions.validate(Guard::Admin, &session.token).await.is_none());
    }

    #[tokio::test]
    async fn test_revoke_account_drops_all_sessions() {
        let sessions = SessionGuard::default();
        let alice = account(Guard::Admin);
        let bob = account(Guard::Admin);
        sessions.issue(&alice).await;
        sessions.issue(&alice).await;
        let bob_session = sessions.issue(&bob).await;

        assert_eq!(sessions.revoke_account(Guard::Admin, alice.id).await, 2);
        assert_eq!(sessions.active_count().await, 1);
        assert!(sessions.validate(Guard::Admin, &bob_session.token).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_expiry() {
        let sessions = SessionGuard::new(Duration::from_secs(60), false);
        let session = sessions.issue(&account(Guard::Admin)).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(sessions.validate(Guard::Admin, &session.token).await.is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(sessions.validate(Guard::Admin, &session.token).await.is_none());
        // Expired entries are dropped on read
        assert_eq!(sessions.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_expiry() {
        let sessions = SessionGuard::new(Duration::from_secs(60), true);
        let session = sessions.issue(&account(Guard::User)).await;

        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(45)).await;
            let found = sessions.validate(Guard::User, &session.token).await.unwrap();
            assert_eq!(found.expires_in(), Duration::from_secs(60));
        }

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(sessions.validate(Guard::User, &session.token).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let sessions = SessionGuard::new(Duration::from_secs(60), false);
        sessions.issue(&account(Guard::Admin)).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        let fresh = sessions.issue(&account(Guard::Admin)).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(sessions.cleanup_expired().await, 1);
        assert_eq!(sessions.active_count().await, 1);
        assert!(sessions.validate(Guard::Admin, &fresh.token).await.is_some());
    }
}

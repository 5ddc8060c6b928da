// ============================
// crates/backend-lib/src/auth/throttle.rs
// ============================
//! Throttling of failed login attempts.
//!
//! Entries are keyed by guard, normalised email and source address, so both
//! one source walking many accounts and many sources hammering one account
//! pile up failures somewhere. Once a key reaches `max_attempts` failures it
//! is locked; every further failure after a lock lapses locks it again for
//! `multiplier` times longer, capped at `max_lockout`.
//!
//! Logins go through `begin_attempt`, which checks the lock and counts the
//! attempt under one entry guard. A burst of parallel requests therefore
//! gets at most `max_attempts` credential checks before the key locks.

use dashmap::DashMap;
use multiauth_common::Guard;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::ThrottleSettings;
use crate::metrics as keys;

/// Composite throttle key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThrottleKey {
    pub guard: Guard,
    /// Normalised email
    pub email: String,
    pub source: IpAddr,
}

impl ThrottleKey {
    pub fn new(guard: Guard, email: &str, source: IpAddr) -> Self {
        Self {
            guard,
            email: crate::validation::normalize_email(email),
            source,
        }
    }
}

impl fmt::Display for ThrottleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}|{}", self.guard, self.email, self.source)
    }
}

/// Entry in the throttle map
#[derive(Debug, Clone)]
struct ThrottleEntry {
    /// Number of failed attempts since the entry was (re)started
    failures: u32,
    /// Time of the first counted failure
    first_failure: Instant,
    /// Time of the last failed attempt
    last_failure: Instant,
    /// When the current lockout lapses
    locked_until: Option<Instant>,
}

impl ThrottleEntry {
    fn new(now: Instant) -> Self {
        Self {
            failures: 0,
            first_failure: now,
            last_failure: now,
            locked_until: None,
        }
    }

    fn is_locked(&self, now: Instant) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    fn remaining_lock(&self, now: Instant) -> Option<Duration> {
        self.locked_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    /// Whether the counted failures have aged out
    ///
    /// The threshold window runs from the first failure. Once a key has been
    /// locked the window follows the last failure instead, so the backoff
    /// keeps growing while failures keep arriving.
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        if self.is_locked(now) {
            return false;
        }
        let anchor = if self.locked_until.is_some() {
            self.last_failure
        } else {
            self.first_failure
        };
        now.duration_since(anchor) > window
    }
}

/// Lockout policy
#[derive(Debug, Clone)]
pub struct ThrottlePolicy {
    pub max_attempts: u32,
    pub lockout: Duration,
    pub multiplier: u32,
    pub max_lockout: Duration,
    pub decay_window: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self::from(&ThrottleSettings::default())
    }
}

impl From<&ThrottleSettings> for ThrottlePolicy {
    fn from(settings: &ThrottleSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            lockout: settings.lockout(),
            multiplier: settings.lockout_multiplier,
            max_lockout: settings.max_lockout(),
            decay_window: settings.decay_window(),
        }
    }
}

impl ThrottlePolicy {
    /// Lockout for a key that has just reached `failures` failures
    pub fn backoff(&self, failures: u32) -> Duration {
        let excess = failures.saturating_sub(self.max_attempts);
        let factor = self.multiplier.max(1).checked_pow(excess).unwrap_or(u32::MAX);
        self.lockout
            .checked_mul(factor)
            .unwrap_or(self.max_lockout)
            .min(self.max_lockout)
    }
}

/// Outcome of recording a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub failures: u32,
    /// Set when this failure locked the key
    pub locked_for: Option<Duration>,
}

/// Login throttle shared by every request
#[derive(Debug, Clone)]
pub struct LoginThrottle {
    entries: Arc<DashMap<ThrottleKey, ThrottleEntry>>,
    policy: ThrottlePolicy,
}

impl Default for LoginThrottle {
    fn default() -> Self {
        Self::new(ThrottlePolicy::default())
    }
}

impl LoginThrottle {
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            policy,
        }
    }

    /// Check if a key may attempt a login right now
    pub fn attempt_allowed(&self, key: &ThrottleKey) -> bool {
        self.retry_after(key).is_none()
    }

    /// Remaining lockout for a key, if it is locked
    pub fn retry_after(&self, key: &ThrottleKey) -> Option<Duration> {
        self.entries.get(key)?.remaining_lock(Instant::now())
    }

    /// Reserve a login attempt for a key
    ///
    /// Fails with the remaining lockout when the key is locked. Otherwise the
    /// attempt is counted as a failure up front, under the same entry guard
    /// as the lock check; `record_success` clears it once the credentials
    /// check out.
    pub fn begin_attempt(&self, key: &ThrottleKey) -> Result<FailureOutcome, Duration> {
        let now = Instant::now();
        let outcome = {
            let mut entry = self
                .entries
                .entry(key.clone())
                .or_insert_with(|| ThrottleEntry::new(now));
            if let Some(remaining) = entry.remaining_lock(now) {
                return Err(remaining);
            }
            self.count_failure(&mut *entry, now)
        };

        self.report(key, outcome);
        Ok(outcome)
    }

    /// Give back an attempt reserved by `begin_attempt` that never reached
    /// the credential check
    pub fn release_attempt(&self, key: &ThrottleKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.failures = entry.failures.saturating_sub(1);
            if entry.failures < self.policy.max_attempts {
                entry.locked_until = None;
            }
        }
    }

    /// Record a failed authentication attempt
    pub fn record_failure(&self, key: &ThrottleKey) -> FailureOutcome {
        let now = Instant::now();

        // The entry guard holds the shard lock, so concurrent failures for
        // one key are counted one after another.
        let outcome = {
            let mut entry = self
                .entries
                .entry(key.clone())
                .or_insert_with(|| ThrottleEntry::new(now));
            self.count_failure(&mut *entry, now)
        };

        self.report(key, outcome);
        outcome
    }

    fn count_failure(&self, entry: &mut ThrottleEntry, now: Instant) -> FailureOutcome {
        if entry.failures == 0 || entry.is_stale(now, self.policy.decay_window) {
            *entry = ThrottleEntry::new(now);
        }

        entry.failures = entry.failures.saturating_add(1);
        entry.last_failure = now;

        let mut locked_for = None;
        if entry.failures >= self.policy.max_attempts && !entry.is_locked(now) {
            let backoff = self.policy.backoff(entry.failures);
            entry.locked_until = Some(now + backoff);
            locked_for = Some(backoff);
        }

        FailureOutcome {
            failures: entry.failures,
            locked_for,
        }
    }

    fn report(&self, key: &ThrottleKey, outcome: FailureOutcome) {
        let FailureOutcome { failures, locked_for } = outcome;
        match locked_for {
            Some(backoff) => {
                metrics::counter!(keys::LOCKOUT).increment(1);
                tracing::warn!(
                    guard = %key.guard,
                    email = %key.email,
                    source = %key.source,
                    failures,
                    lockout_secs = backoff.as_secs(),
                    "login locked out after repeated failures"
                );
            }
            None => tracing::debug!(
                guard = %key.guard,
                email = %key.email,
                source = %key.source,
                failures,
                remaining = self.policy.max_attempts.saturating_sub(failures),
                "login attempt counted"
            ),
        }
    }

    /// Record a successful authentication
    pub fn record_success(&self, key: &ThrottleKey) {
        self.entries.remove(key);
    }

    /// Number of failures currently counted for a key
    pub fn failures(&self, key: &ThrottleKey) -> u32 {
        self.entries.get(key).map_or(0, |e| e.failures)
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries that are unlocked and past the decay window
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let decay_window = self.policy.decay_window;
        let before = self.entries.len();

        self.entries
            .retain(|_, entry| entry.failures > 0 && !entry.is_stale(now, decay_window));

        before.saturating_sub(self.entries.len())
    }
}

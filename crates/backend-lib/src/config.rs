// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use multiauth_common::Guard;
use serde::{Deserialize, Serialize};

/// Prefix for environment overrides, e.g. `MULTIAUTH_THROTTLE__MAX_ATTEMPTS=3`
pub const ENV_PREFIX: &str = "MULTIAUTH_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory path (flat-file storage only)
    pub data_dir: PathBuf,
    /// Account storage backend
    pub storage: StorageKind,
    /// Log level
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Take the client address from `x-real-ip` when present
    pub trust_proxy_headers: bool,
    /// Upper bound for a single storage call, in milliseconds
    pub store_timeout_ms: u64,
    pub session: SessionSettings,
    pub throttle: ThrottleSettings,
    pub password: PasswordSettings,
    pub guards: GuardSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Memory,
    FlatFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Session lifetime settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Session TTL in seconds
    pub ttl_secs: u64,
    /// Push the expiry forward on every successful validation
    pub sliding: bool,
    /// Interval of the background sweep in seconds
    pub cleanup_interval_secs: u64,
}

/// Login throttling settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThrottleSettings {
    /// Failed attempts before the key is locked
    pub max_attempts: u32,
    /// First lockout duration in seconds
    pub lockout_secs: u64,
    /// Growth factor for every failure past the threshold
    pub lockout_multiplier: u32,
    /// Ceiling for the lockout duration in seconds
    pub max_lockout_secs: u64,
    /// Failures older than this are forgotten, in seconds
    pub decay_window_secs: u64,
    /// Interval of the background sweep in seconds
    pub cleanup_interval_secs: u64,
}

/// Password policy and hashing cost
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PasswordSettings {
    /// Minimum password length
    pub min_length: usize,
    /// scrypt cost parameter (log2 of N)
    pub scrypt_log_n: u8,
}

/// Per-guard behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardSettings {
    pub admin: GuardConfig,
    pub user: GuardConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuardConfig {
    /// Where clients are sent after logging in or registering
    pub redirect_to: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::from("data"),
            storage: StorageKind::FlatFile,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            trust_proxy_headers: false,
            store_timeout_ms: 2_000,
            session: SessionSettings::default(),
            throttle: ThrottleSettings::default(),
            password: PasswordSettings::default(),
            guards: GuardSettings::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 2 * 60 * 60, // 2 hours
            sliding: true,
            cleanup_interval_secs: 15 * 60,
        }
    }
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_secs: 60,
            lockout_multiplier: 2,
            max_lockout_secs: 15 * 60,
            decay_window_secs: 15 * 60,
            cleanup_interval_secs: 60 * 60,
        }
    }
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            min_length: 6,
            scrypt_log_n: 15,
        }
    }
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            admin: GuardConfig {
                redirect_to: "/admin".to_string(),
            },
            user: GuardConfig {
                redirect_to: "/home".to_string(),
            },
        }
    }
}

impl GuardSettings {
    pub fn get(&self, guard: Guard) -> &GuardConfig {
        match guard {
            Guard::Admin => &self.admin,
            Guard::User => &self.user,
        }
    }
}

impl SessionSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl ThrottleSettings {
    pub fn lockout(&self) -> Duration {
        Duration::from_secs(self.lockout_secs)
    }

    pub fn max_lockout(&self) -> Duration {
        Duration::from_secs(self.max_lockout_secs)
    }

    pub fn decay_window(&self) -> Duration {
        Duration::from_secs(self.decay_window_secs)
    }
}

impl Settings {
    /// Load from `config.toml` in the working directory plus environment
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment().merge(Toml::file("config.toml")))
    }

    /// Load from an explicit TOML file plus environment
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("config file {} does not exist", path.display());
        }
        Self::from_figment(Self::figment().merge(Toml::file(path)))
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            bail!("invalid log level `{}`", self.log_level);
        }
        if self.session.ttl_secs == 0 {
            bail!("session.ttl_secs must be positive");
        }
        if self.throttle.max_attempts == 0 {
            bail!("throttle.max_attempts must be positive");
        }
        if self.throttle.lockout_multiplier == 0 {
            bail!("throttle.lockout_multiplier must be positive");
        }
        if self.throttle.max_lockout_secs < self.throttle.lockout_secs {
            bail!("throttle.max_lockout_secs must not be below throttle.lockout_secs");
        }
        if self.password.min_length < 6 {
            bail!("password.min_length must be at least 6");
        }
        if !(1..=20).contains(&self.password.scrypt_log_n) {
            bail!("password.scrypt_log_n must be between 1 and 20");
        }
        if self.store_timeout_ms == 0 {
            bail!("store_timeout_ms must be positive");
        }
        Ok(())
    }
}

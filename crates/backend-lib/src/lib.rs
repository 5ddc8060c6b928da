// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the multi-guard authentication server.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod router;
pub mod storage;
pub mod validation;

use std::sync::Arc;

use crate::auth::{AuthService, DefaultAuth, LoginThrottle, SessionGuard};
use crate::config::{Settings, StorageKind};
use crate::storage::{FlatFileStorage, MemoryStorage, Storage};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Authentication service
    pub auth: Arc<dyn AuthService>,
    /// Session guard, shared with `auth`
    pub sessions: SessionGuard,
    /// Login throttle, shared with `auth`
    pub throttle: LoginThrottle,
    /// Configuration settings
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Create a new application state over `storage`
    pub fn new<S: Storage + 'static>(storage: S, config: &Settings) -> anyhow::Result<Self> {
        let auth = DefaultAuth::from_settings(storage, config)?;
        // Clones share the same maps, so sweeps here reach the service's state
        let sessions = auth.sessions().clone();
        let throttle = auth.throttle().clone();

        Ok(Self {
            auth: Arc::new(auth),
            sessions,
            throttle,
            settings: Arc::new(config.clone()),
        })
    }

    /// Create a new application state with the storage backend named in
    /// the settings
    pub fn from_settings(config: &Settings) -> anyhow::Result<Self> {
        match config.storage {
            StorageKind::Memory => Self::new(MemoryStorage::new(), config),
            StorageKind::FlatFile => Self::new(FlatFileStorage::new(&config.data_dir)?, config),
        }
    }
}

// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod credentials;
pub mod password;
pub mod session;
pub mod throttle;
pub mod token_generator;
mod service;
mod service_impl;

pub use credentials::CredentialStore;
pub use password::{hash_password_with_cost, verify_password};
pub use session::{Session, SessionGuard, SESSION_TTL};
pub use service::AuthService;
pub use service_impl::DefaultAuth;
pub use throttle::{FailureOutcome, LoginThrottle, ThrottleKey, ThrottlePolicy};

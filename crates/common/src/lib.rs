// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between clients and the multi-guard auth server.
//! This module defines the JSON request/response bodies and supporting types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier type
pub type AccountId = uuid::Uuid;

/// A partition of accounts and sessions with its own identity space
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Guard {
    Admin,
    User,
}

impl Guard {
    /// Every known guard, in a stable order
    pub const ALL: [Guard; 2] = [Guard::Admin, Guard::User];

    pub fn as_str(self) -> &'static str {
        match self {
            Guard::Admin => "admin",
            Guard::User => "user",
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /{guard}/login`
///
/// Absent fields decode as empty strings so they surface as per-field
/// validation messages rather than decode failures.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /{guard}/register`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Body of `POST /{guard}/logout`
///
/// The token may also travel in an `Authorization: Bearer` header, in which
/// case the body can be omitted.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LogoutRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// Response to a successful login
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginResponse {
    /// Opaque bearer token
    pub token: String,
    /// Seconds until the session lapses (pushed forward on use when sliding)
    pub expires_in_secs: u64,
    /// Where the client should go next
    pub redirect_to: String,
}

/// Public view of an account; never carries the password hash
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub id: AccountId,
    pub guard: Guard,
    pub name: String,
    pub email: String,
}

/// Response to a successful registration
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterResponse {
    pub account: AccountSummary,
    pub token: String,
    pub expires_in_secs: u64,
    pub redirect_to: String,
}

/// Response to `GET /{guard}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CurrentResponse {
    pub name: String,
}

/// Error envelope returned by every failing endpoint
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorDetail {
    /// Stable machine-readable code, e.g. `AUTH_002`
    pub code: String,
    pub message: String,
    /// Per-field validation messages, present only for validation failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<std::collections::BTreeMap<String, Vec<String>>>,
}

// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Input validation for registration and login.
//!
//! Rules mirror the registration form: `name` required and at most 255
//! characters, `email` required, well formed and at most 255 characters,
//! `password` required, at least `min_length` characters and confirmed.
//! Uniqueness of the email is left to the storage layer, which can check
//! it atomically.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

const MAX_NAME_LENGTH: usize = 255;
const MAX_EMAIL_LENGTH: usize = 255;
const MAX_PASSWORD_LENGTH: usize = 1024;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

/// Field-keyed validation messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether `field` has at least one message
    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }

    /// `Ok(())` when nothing was recorded
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Registration form as received from the caller
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

impl From<multiauth_common::RegisterRequest> for RegisterInput {
    fn from(req: multiauth_common::RegisterRequest) -> Self {
        Self {
            name: req.name,
            email: req.email,
            password: req.password,
            password_confirmation: req.password_confirmation,
        }
    }
}

/// Canonical form used for storage keys and throttle keys
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_name(name: &str, errors: &mut ValidationErrors) {
    let name = name.trim();
    if name.is_empty() {
        errors.add("name", "The name field is required.");
    } else if name.chars().count() > MAX_NAME_LENGTH {
        errors.add(
            "name",
            format!("The name may not be greater than {MAX_NAME_LENGTH} characters."),
        );
    }
}

fn validate_email(email: &str, errors: &mut ValidationErrors) {
    let email = email.trim();
    if email.is_empty() {
        errors.add("email", "The email field is required.");
        return;
    }

    if !EMAIL_REGEX.is_match(email) {
        errors.add("email", "The email must be a valid email address.");
    }

    if email.chars().count() > MAX_EMAIL_LENGTH {
        errors.add(
            "email",
            format!("The email may not be greater than {MAX_EMAIL_LENGTH} characters."),
        );
    }
}

fn validate_password(password: &str, confirmation: &str, min_length: usize, errors: &mut ValidationErrors) {
    if password.is_empty() {
        errors.add("password", "The password field is required.");
        return;
    }

    let len = password.chars().count();
    if len < min_length {
        errors.add(
            "password",
            format!("The password must be at least {min_length} characters."),
        );
    }

    // scrypt happily accepts huge inputs; refuse them before hashing
    if len > MAX_PASSWORD_LENGTH {
        errors.add(
            "password",
            format!("The password may not be greater than {MAX_PASSWORD_LENGTH} characters."),
        );
    }

    if password != confirmation {
        errors.add("password", "The password confirmation does not match.");
    }
}

/// Validate a registration form, collecting every failing field
pub fn validate_registration(input: &RegisterInput, min_password_length: usize) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    validate_name(&input.name, &mut errors);
    validate_email(&input.email, &mut errors);
    validate_password(
        &input.password,
        &input.password_confirmation,
        min_password_length,
        &mut errors,
    );
    errors.into_result()
}

/// Validate login input; only presence is checked so nothing leaks about
/// which accounts exist
pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if email.trim().is_empty() {
        errors.add("email", "The email field is required.");
    }
    if password.is_empty() {
        errors.add("password", "The password field is required.");
    } else if password.chars().count() > MAX_PASSWORD_LENGTH {
        errors.add(
            "password",
            format!("The password may not be greater than {MAX_PASSWORD_LENGTH} characters."),
        );
    }
    errors.into_result()
}

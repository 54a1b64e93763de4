//! Registered users.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::UserId;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;
use validator::ValidateEmail;

use crate::error::{ValidationError, check_length, require_text};

const USERNAME_MAX: usize = 150;
const NAME_MAX: usize = 150;
const PHONE_MAX: usize = 20;

/// Letters, digits and `@ . + - _`.
static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("Invalid regex"));

/// Optional leading `+`s, a 1 to 4 digit prefix optionally in parentheses,
/// then digits and `- . /` separators or whitespace.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+*\(?[0-9]{1,4}\)?[-\s./0-9]*$").expect("Invalid regex")
});

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_staff: bool,
    /// Deactivated users keep their data but can no longer authenticate.
    pub is_active: bool,
    /// Opaque bearer token issued at registration.
    pub api_token: String,
    pub created_at: DateTime<Utc>,
}

/// Validated fields for a new user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_staff: bool,
    pub api_token: String,
}

/// Registration request.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInput {
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl UserInput {
    /// Validates the request and issues a fresh API token.
    ///
    /// Users registered this way are never staff.
    pub fn validate(self) -> Result<NewUser, ValidationError> {
        validate_username(&self.username)?;
        check_length("first_name", &self.first_name, Some(NAME_MAX))?;
        check_length("last_name", &self.last_name, Some(NAME_MAX))?;
        validate_optional_email(&self.email)?;
        let phone = normalize_phone(self.phone)?;

        Ok(NewUser {
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone,
            is_staff: false,
            api_token: issue_token(),
        })
    }
}

/// Profile update. Absent fields keep their value; an empty phone clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl UserPatch {
    /// Merges the patch onto `current`, validating changed fields.
    pub fn apply(&self, current: &User) -> Result<User, ValidationError> {
        let mut updated = current.clone();

        if let Some(username) = &self.username {
            validate_username(username)?;
            updated.username = username.clone();
        }
        if let Some(first_name) = &self.first_name {
            check_length("first_name", first_name, Some(NAME_MAX))?;
            updated.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            check_length("last_name", last_name, Some(NAME_MAX))?;
            updated.last_name = last_name.clone();
        }
        if let Some(email) = &self.email {
            validate_optional_email(email)?;
            updated.email = email.clone();
        }
        if let Some(phone) = &self.phone {
            updated.phone = normalize_phone(Some(phone.clone()))?;
        }

        Ok(updated)
    }
}

/// Generates a new opaque API token.
pub fn issue_token() -> String {
    Uuid::new_v4().simple().to_string()
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    require_text("username", username, Some(USERNAME_MAX))?;
    if !USERNAME_RE.is_match(username) {
        return Err(ValidationError::new(
            "username",
            "use letters, digits and @/./+/-/_ only",
        ));
    }
    Ok(())
}

fn validate_optional_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Ok(());
    }
    validate_email(email)
}

/// Checks an email address. The domain must have a top-level part.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let has_tld = email
        .rsplit_once('@')
        .is_some_and(|(_, domain)| domain.contains('.'));
    if !email.validate_email() || !has_tld {
        return Err(ValidationError::new("email", "enter a valid email address"));
    }
    Ok(())
}

fn normalize_phone(phone: Option<String>) -> Result<Option<String>, ValidationError> {
    match phone {
        None => Ok(None),
        Some(phone) if phone.is_empty() => Ok(None),
        Some(phone) => {
            check_length("phone", &phone, Some(PHONE_MAX))?;
            if !is_valid_phone(&phone) {
                return Err(ValidationError::new("phone", "enter a valid phone number"));
            }
            Ok(Some(phone))
        }
    }
}

fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

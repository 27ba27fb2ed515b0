use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result, msg};

/// Basic email format check.
///
/// Requires exactly one @, a non-empty local part without spaces, and a
/// domain with at least one inner dot. Not RFC 5322, just a sanity check.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }

    let local_part = parts[0];
    let domain_part = parts[1];

    if local_part.is_empty() || local_part.contains(' ') {
        return false;
    }

    if domain_part.is_empty() || !domain_part.contains('.') || domain_part.contains(' ') {
        return false;
    }

    !(domain_part.starts_with('.') || domain_part.ends_with('.'))
}

pub fn validate_email_format(email: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(AppError::BadRequest(msg::EMAIL_EMPTY.into()));
    }
    if !is_valid_email(email) {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL_FORMAT.into()));
    }
    Ok(())
}

/// Account that owns business listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
}

impl CreateUser {
    pub fn validate(&self) -> Result<()> {
        validate_email_format(&self.email)?;
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Name is required".into()));
        }
        Ok(())
    }
}

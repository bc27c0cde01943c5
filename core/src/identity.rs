//! Attendee identity derived from an email address.

use std::fmt;

use crate::error::{EventGateError, Result};

/// Characters that cannot appear in a document key.
const RESERVED: [char; 6] = ['.', '#', '$', '/', '[', ']'];

/// Storage key for one attendee: the raw email with every reserved character
/// replaced by `_`. Stable across repeated writes for the same email.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn from_email(email: &str) -> Result<Self> {
        if email.is_empty() {
            return Err(EventGateError::EmptyIdentity);
        }
        Ok(Self(normalize(email)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(email: &str) -> String {
    email
        .chars()
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .collect()
}

/// Gate check before an email is accepted: present, with an `@` and a `.`.
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(EventGateError::InvalidEmail("Email is required".to_string()));
    }
    if !email.contains('@') || !email.contains('.') {
        return Err(EventGateError::InvalidEmail(
            "Please enter a valid email address".to_string(),
        ));
    }
    Ok(())
}

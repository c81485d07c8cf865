//! Identifier value objects.
//!
//! User ids are opaque strings owned by the identity provider. They are
//! validated only for presence and a sane length.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::ValidationError;

const MAX_USER_ID_LEN: usize = 128;

/// Opaque identifier of an end user, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a new UserId, returning error if empty or absurdly long.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("userId"));
        }
        if trimmed.len() > MAX_USER_ID_LEN {
            return Err(ValidationError::invalid_format(
                "userId",
                format!("must be at most {} characters", MAX_USER_ID_LEN),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_accepts_opaque_strings() {
        let id = UserId::new("9b2f0c1e-user").unwrap();
        assert_eq!(id.as_str(), "9b2f0c1e-user");
    }

    #[test]
    fn user_id_trims_whitespace() {
        let id = UserId::new("  U1 ").unwrap();
        assert_eq!(id.as_str(), "U1");
    }

    #[test]
    fn user_id_rejects_empty_string() {
        let result = UserId::new("   ");
        match result {
            Err(ValidationError::EmptyField { field }) => assert_eq!(field, "userId"),
            _ => panic!("Expected EmptyField error"),
        }
    }

    #[test]
    fn user_id_rejects_overlong_values() {
        assert!(UserId::new("x".repeat(200)).is_err());
    }

    #[test]
    fn user_id_displays_correctly() {
        let id = UserId::new("user-456").unwrap();
        assert_eq!(format!("{}", id), "user-456");
    }
}

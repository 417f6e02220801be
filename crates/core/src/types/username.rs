//! Public handle used in profile URLs (`/u/{username}`).

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Username`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsernameError {
    #[error("username must be between {min} and {max} characters")]
    Length { min: usize, max: usize },
    #[error("username must start with a letter")]
    LeadingCharacter,
    #[error("username may only contain letters, digits and underscores")]
    InvalidCharacter,
    #[error("username '{0}' is reserved")]
    Reserved(String),
}

/// Paths that would collide with top-level routes.
const RESERVED: &[&str] = &[
    "admin", "api", "auth", "cart", "checkout", "groups", "health", "orders", "posts", "profile",
    "static", "stores", "users", "wallet", "webhooks",
];

/// A lowercase profile handle.
///
/// 3-30 ASCII characters, letters/digits/underscore, starting with a letter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub const MIN_LENGTH: usize = 3;
    pub const MAX_LENGTH: usize = 30;

    /// Parse a username, lowercasing it first.
    ///
    /// # Errors
    ///
    /// Returns a [`UsernameError`] when the handle is malformed or reserved.
    pub fn parse(input: &str) -> Result<Self, UsernameError> {
        let candidate = input.trim().trim_start_matches('@').to_ascii_lowercase();

        if !(Self::MIN_LENGTH..=Self::MAX_LENGTH).contains(&candidate.len()) {
            return Err(UsernameError::Length {
                min: Self::MIN_LENGTH,
                max: Self::MAX_LENGTH,
            });
        }
        if !candidate.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(UsernameError::LeadingCharacter);
        }
        if !candidate
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(UsernameError::InvalidCharacter);
        }
        if RESERVED.contains(&candidate.as_str()) {
            return Err(UsernameError::Reserved(candidate));
        }

        Ok(Self(candidate))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes() {
        let name = Username::parse(" @Ada_Lovelace ").map(|u| u.to_string());
        assert_eq!(name.as_deref(), Ok("ada_lovelace"));
    }

    #[test]
    fn test_length_bounds() {
        assert!(matches!(
            Username::parse("ab"),
            Err(UsernameError::Length { .. })
        ));
        assert!(Username::parse("abc").is_ok());
        assert!(Username::parse(&"a".repeat(30)).is_ok());
        assert!(Username::parse(&"a".repeat(31)).is_err());
    }

    #[test]
    fn test_character_rules() {
        assert_eq!(
            Username::parse("9lives"),
            Err(UsernameError::LeadingCharacter)
        );
        assert_eq!(
            Username::parse("ada-l"),
            Err(UsernameError::InvalidCharacter)
        );
    }

    #[test]
    fn test_reserved_routes() {
        assert_eq!(
            Username::parse("Admin"),
            Err(UsernameError::Reserved("admin".to_string()))
        );
    }
}

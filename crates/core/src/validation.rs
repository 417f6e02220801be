//! Form field rules shared by posts, comments, groups, stores and products.
//!
//! Uniqueness and referential integrity are the backend's job; these checks
//! only keep obviously bad input from making a round trip.

use thiserror::Error;

/// Longest post body, in characters.
pub const MAX_POST_LENGTH: usize = 2_000;
/// Longest comment, in characters.
pub const MAX_COMMENT_LENGTH: usize = 1_000;
/// Longest name (group, store, product, display name), in characters.
pub const MAX_NAME_LENGTH: usize = 80;
/// Longest free-text description or bio, in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 2_000;

/// Errors from validating a form field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// A trimmed, non-empty field no longer than `max` characters.
///
/// # Errors
///
/// Returns `Required` for blank input and `TooLong` past `max`.
pub fn required<'a>(field: &'static str, value: &'a str, max: usize) -> Result<&'a str, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required(field));
    }
    within(field, value, max)
}

/// A trimmed optional field; blank input becomes `None`.
///
/// # Errors
///
/// Returns `TooLong` past `max`.
pub fn optional<'a>(
    field: &'static str,
    value: Option<&'a str>,
    max: usize,
) -> Result<Option<&'a str>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => within(field, v, max).map(Some),
    }
}

fn within<'a>(field: &'static str, value: &'a str, max: usize) -> Result<&'a str, ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(value)
}

/// URL-safe store handle derived from a name: `"Ada's Shop!"` → `"adas-shop"`.
///
/// # Errors
///
/// Returns `Invalid` when nothing usable remains.
pub fn slugify(name: &str) -> Result<String, ValidationError> {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-').to_string();

    if slug.len() < 3 {
        return Err(ValidationError::Invalid {
            field: "store name",
            reason: "needs at least three letters or digits",
        });
    }
    Ok(slug.chars().take(MAX_NAME_LENGTH).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_trims() {
        assert_eq!(required("body", "  hi  ", 10), Ok("hi"));
        assert_eq!(required("body", "   ", 10), Err(ValidationError::Required("body")));
    }

    #[test]
    fn test_length_counts_characters() {
        // Four characters, twelve bytes
        assert!(required("name", "₦₦₦₦", 4).is_ok());
        assert_eq!(
            required("name", "₦₦₦₦₦", 4),
            Err(ValidationError::TooLong { field: "name", max: 4 })
        );
    }

    #[test]
    fn test_optional_blank_is_none() {
        assert_eq!(optional("bio", Some("  "), 10), Ok(None));
        assert_eq!(optional("bio", None, 10), Ok(None));
        assert_eq!(optional("bio", Some(" hello "), 10), Ok(Some("hello")));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Ada's Shop!").as_deref(), Ok("adas-shop"));
        assert_eq!(slugify("  Lagos -- Fabrics  ").as_deref(), Ok("lagos-fabrics"));
        assert!(slugify("!!").is_err());
    }
}

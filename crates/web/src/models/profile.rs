//! User profiles.

use agora_core::{AccountStatus, UserId, UserRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row in `profiles`. The id is the auth user's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// Display name, falling back to the username.
    #[must_use]
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
    }

    #[must_use]
    pub fn is_banned(&self) -> bool {
        self.status == AccountStatus::Banned
    }
}

/// The slice of a profile embedded next to posts, comments and members.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorRef {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl AuthorRef {
    /// Columns to request when embedding.
    pub const COLUMNS: &'static str = "username,display_name,avatar_url";

    #[must_use]
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_row_defaults() {
        let row = serde_json::json!({
            "id": "6a2f41a3-c54c-fce8-32d2-0324e1c32e22",
            "username": "adaeze",
            "created_at": "2024-03-01T10:00:00Z"
        });
        let profile: Profile = serde_json::from_value(row).unwrap();
        assert_eq!(profile.role, UserRole::Member);
        assert_eq!(profile.status, AccountStatus::Active);
        assert_eq!(profile.name(), "adaeze");
        assert!(!profile.is_banned());
    }

    #[test]
    fn test_blank_display_name_falls_back() {
        let author = AuthorRef {
            username: "tunde".to_string(),
            display_name: Some("  ".to_string()),
            avatar_url: None,
        };
        assert_eq!(author.name(), "tunde");
    }
}

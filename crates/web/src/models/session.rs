//! Session-related types.
//!
//! Types stored in the session for authentication state and flash notices.

use agora_core::{Email, UserId, UserRole};
use serde::{Deserialize, Serialize};

use crate::backend::AuthSession;

/// Seconds before expiry at which an access token is refreshed.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Session-stored user identity plus backend tokens.
///
/// `Debug` is implemented by hand so tokens never reach the logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Email,
    pub username: String,
    pub role: UserRole,
    /// Backend access token (JWT) used for row-level security.
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp at which `access_token` expires.
    pub expires_at: i64,
}

impl std::fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("role", &self.role)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CurrentUser {
    /// Build from a fresh sign-in and the user's profile.
    #[must_use]
    pub fn from_auth(session: &AuthSession, email: Email, username: String, role: UserRole) -> Self {
        Self {
            id: session.user.id,
            email,
            username,
            role,
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            expires_at: session.expires_at(),
        }
    }

    /// Replace tokens after a refresh.
    pub fn update_tokens(&mut self, session: &AuthSession) {
        self.access_token.clone_from(&session.access_token);
        self.refresh_token.clone_from(&session.refresh_token);
        self.expires_at = session.expires_at();
    }

    /// Whether the access token should be refreshed before use.
    #[must_use]
    pub const fn needs_refresh(&self, now: i64) -> bool {
        self.expires_at - REFRESH_MARGIN_SECS <= now
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Severity of a flash notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
    Success,
    Error,
}

/// A one-shot notice shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.level == FlashLevel::Error
    }
}

/// Session keys.
pub mod session_keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the pending flash notice.
    pub const FLASH: &str = "flash";

    /// Key for the shipping address last entered at checkout.
    pub const SHIPPING_ADDRESS: &str = "shipping_address";
}

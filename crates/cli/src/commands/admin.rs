//! Account role management.
//!
//! # Usage
//!
//! ```bash
//! agora-cli admin promote -u ada
//! agora-cli admin promote -u @ada -r seller
//! ```
//!
//! # Environment Variables
//!
//! - `BACKEND_URL` - Managed backend project URL
//! - `BACKEND_ANON_KEY`, `BACKEND_SERVICE_KEY` - API keys; role changes use
//!   the service key

use agora_core::UserRole;
use agora_web::backend::BackendError;
use thiserror::Error;

use super::backend_from_env;

/// Errors from role changes.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Unknown role name.
    #[error("Invalid role: {0}. Valid roles: member, seller, admin")]
    InvalidRole(String),

    /// No account with that username.
    #[error("No user with username: @{0}")]
    UnknownUser(String),

    /// Backend request failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration or client setup failed.
    #[error("{0}")]
    Setup(String),
}

/// Normalise a username argument: trims and drops a leading `@`.
fn handle(username: &str) -> String {
    username.trim().trim_start_matches('@').to_ascii_lowercase()
}

/// Set `username`'s role.
///
/// # Errors
///
/// Returns `InvalidRole`, `UnknownUser`, or backend errors.
pub async fn promote(username: &str, role: &str) -> Result<UserRole, AdminError> {
    let role: UserRole = role
        .parse()
        .map_err(|_| AdminError::InvalidRole(role.to_owned()))?;
    let username = handle(username);

    let backend = backend_from_env().map_err(|e| AdminError::Setup(e.to_string()))?;
    let profile = match backend.profile_by_username(&username).await {
        Ok(profile) => profile,
        Err(BackendError::NotFound(_)) => return Err(AdminError::UnknownUser(username)),
        Err(e) => return Err(e.into()),
    };

    if profile.role == role {
        tracing::info!("@{} already has role {}", profile.username, role);
        return Ok(role);
    }

    let updated = backend.set_role(profile.id, role).await?;
    tracing::info!(
        "Role updated: @{} {} -> {}",
        updated.username,
        profile.role,
        updated.role
    );
    if profile.is_banned() {
        tracing::warn!("@{} is banned; the new role has no effect until unbanned", profile.username);
    }
    Ok(updated.role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_normalises_input() {
        assert_eq!(handle(" @Ada_Lovelace "), "ada_lovelace");
        assert_eq!(handle("ada"), "ada");
    }

    #[tokio::test]
    async fn test_invalid_role_fails_before_connecting() {
        let result = promote("ada", "superuser").await;
        assert!(matches!(result, Err(AdminError::InvalidRole(r)) if r == "superuser"));
    }
}

//! Authentication error types.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] agora_core::EmailError),

    /// Invalid username format.
    #[error("invalid username: {0}")]
    InvalidUsername(#[from] agora_core::UsernameError),

    /// Wrong email or password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Email already registered.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Username already claimed.
    #[error("username taken: {0}")]
    UsernameTaken(String),

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Password and confirmation differ.
    #[error("passwords do not match")]
    PasswordMismatch,

    /// Account suspended by an admin.
    #[error("account is banned")]
    AccountBanned,

    /// Signed in but no profile row exists.
    #[error("profile missing for user {0}")]
    ProfileMissing(String),

    /// Refresh token rejected; the user must sign in again.
    #[error("session expired")]
    SessionExpired,

    /// Backend error.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

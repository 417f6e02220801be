//! Password authentication against the backend's auth service.

use agora_core::UserId;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use super::{Access, BackendClient, BackendError, check_status, read_json};

/// The auth service's view of a user.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens returned by sign-in and refresh.
#[derive(Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: i64,
    /// Absolute expiry as a unix timestamp, when the server sends it.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("user", &self.user)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Unix timestamp at which the access token expires.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp() + self.expires_in)
    }
}

/// Result of a sign-up.
///
/// When the project requires email confirmation no session is issued.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignUpOutcome {
    SignedIn(AuthSession),
    ConfirmationRequired(AuthUser),
}

impl SignUpOutcome {
    #[must_use]
    pub const fn user(&self) -> &AuthUser {
        match self {
            Self::SignedIn(session) => &session.user,
            Self::ConfirmationRequired(user) => user,
        }
    }
}

impl BackendClient {
    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.url())
    }

    /// Create an auth user. `username` is stored in the user's metadata.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when the email is already registered.
    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<SignUpOutcome, BackendError> {
        let response = self
            .request(Method::POST, &self.auth_url("signup"), Access::Anon)
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "username": username },
            }))
            .send()
            .await?;
        read_json(response).await
    }

    /// Exchange email and password for tokens.
    ///
    /// # Errors
    ///
    /// Returns `Api` with code `invalid_grant` for wrong credentials.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let response = self
            .request(
                Method::POST,
                &self.auth_url("token?grant_type=password"),
                Access::Anon,
            )
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        read_json(response).await
    }

    /// Exchange a refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns error if the refresh token was revoked or already used.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        let response = self
            .request(
                Method::POST,
                &self.auth_url("token?grant_type=refresh_token"),
                Access::Anon,
            )
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        read_json(response).await
    }

    /// Revoke the session behind `access_token`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip_all)]
    pub async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let response = self
            .request(
                Method::POST,
                &self.auth_url("logout"),
                Access::User(access_token),
            )
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    /// Look up the user an access token belongs to.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for expired or forged tokens.
    #[instrument(skip_all)]
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, BackendError> {
        let response = self
            .request(Method::GET, &self.auth_url("user"), Access::User(access_token))
            .send()
            .await?;
        read_json(response).await
    }
}

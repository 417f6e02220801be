//! Authentication service.
//!
//! Passwords never touch this server's storage: sign-up and sign-in go to
//! the managed backend's auth API, and the returned tokens are kept in the
//! session as a [`CurrentUser`].

mod error;

pub use error::AuthError;

use agora_core::{AccountStatus, Email, UserRole, Username};
use tracing::{info, instrument, warn};

use crate::backend::{BackendClient, BackendError, SignUpOutcome};
use crate::models::CurrentUser;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Registration form input.
#[derive(Debug)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub confirm_password: &'a str,
}

/// What happened after registering.
#[derive(Debug)]
pub enum Registered {
    /// Signed in straight away.
    SignedIn(CurrentUser),
    /// The backend sent a confirmation email first.
    ConfirmEmail,
}

/// Authentication service.
pub struct AuthService<'a> {
    backend: &'a BackendClient,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(backend: &'a BackendClient) -> Self {
        Self { backend }
    }

    /// Register a new account and its profile.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEmail`, `InvalidUsername`, `WeakPassword` or
    /// `PasswordMismatch` for bad input, and `UserAlreadyExists` or
    /// `UsernameTaken` when either is in use.
    #[instrument(skip_all, fields(username = %form.username))]
    pub async fn register(&self, form: &Registration<'_>) -> Result<Registered, AuthError> {
        let email = Email::parse(form.email)?;
        let username = Username::parse(form.username)?;
        validate_password(form.password)?;
        if form.password != form.confirm_password {
            return Err(AuthError::PasswordMismatch);
        }

        if self.backend.username_taken(username.as_str()).await? {
            return Err(AuthError::UsernameTaken(username.to_string()));
        }

        let outcome = self
            .backend
            .sign_up(email.as_str(), form.password, username.as_str())
            .await
            .map_err(|e| match e {
                BackendError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Backend(other),
            })?;

        self.backend
            .create_profile(outcome.user().id, username.as_str())
            .await
            .map_err(|e| match e {
                BackendError::Conflict(_) => AuthError::UsernameTaken(username.to_string()),
                other => AuthError::Backend(other),
            })?;

        info!(user_id = %outcome.user().id, "Account registered");

        Ok(match outcome {
            SignUpOutcome::SignedIn(session) => Registered::SignedIn(CurrentUser::from_auth(
                &session,
                email,
                username.to_string(),
                UserRole::Member,
            )),
            SignUpOutcome::ConfirmationRequired(_) => Registered::ConfirmEmail,
        })
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` for a wrong email or password and
    /// `AccountBanned` for suspended accounts.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let session = self
            .backend
            .sign_in_with_password(email.as_str(), password)
            .await
            .map_err(|e| match e {
                BackendError::Unauthorized(_) | BackendError::Api { status: 400, .. } => {
                    AuthError::InvalidCredentials
                }
                other => AuthError::Backend(other),
            })?;

        let profile = self
            .backend
            .profile_by_id(session.user.id)
            .await?
            .ok_or_else(|| AuthError::ProfileMissing(session.user.id.to_string()))?;

        if profile.status == AccountStatus::Banned {
            warn!(user_id = %profile.id, "Banned account tried to sign in");
            self.revoke(&session.access_token).await;
            return Err(AuthError::AccountBanned);
        }

        Ok(CurrentUser::from_auth(
            &session,
            email,
            profile.username,
            profile.role,
        ))
    }

    /// Swap an expiring access token for a fresh one, re-checking the
    /// account's role and status.
    ///
    /// # Errors
    ///
    /// Returns `SessionExpired` if the refresh token is rejected and
    /// `AccountBanned` if the account was suspended meanwhile.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn refresh(&self, user: &mut CurrentUser) -> Result<(), AuthError> {
        let session = self
            .backend
            .refresh(&user.refresh_token)
            .await
            .map_err(|e| match e {
                BackendError::Unauthorized(_) | BackendError::Api { status: 400, .. } => {
                    AuthError::SessionExpired
                }
                other => AuthError::Backend(other),
            })?;
        user.update_tokens(&session);

        if let Some(profile) = self.backend.profile_by_id(user.id).await? {
            if profile.is_banned() {
                self.revoke(&user.access_token).await;
                return Err(AuthError::AccountBanned);
            }
            user.role = profile.role;
        }
        Ok(())
    }

    /// Ask the backend whether `user`'s access token is still live.
    ///
    /// Catches tokens revoked elsewhere (sign-out on another device) before
    /// they would expire on their own.
    ///
    /// # Errors
    ///
    /// Returns `SessionExpired` if the token is rejected or belongs to
    /// someone else.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn confirm(&self, user: &CurrentUser) -> Result<(), AuthError> {
        let owner = self
            .backend
            .get_user(&user.access_token)
            .await
            .map_err(|e| match e {
                BackendError::Unauthorized(_) => AuthError::SessionExpired,
                other => AuthError::Backend(other),
            })?;
        if owner.id != user.id {
            warn!(token_owner = %owner.id, "Access token does not match session user");
            return Err(AuthError::SessionExpired);
        }
        Ok(())
    }

    /// Revoke the user's tokens at the backend.
    pub async fn logout(&self, user: &CurrentUser) {
        self.revoke(&user.access_token).await;
        info!(user_id = %user.id, "Signed out");
    }

    async fn revoke(&self, access_token: &str) {
        if let Err(e) = self.backend.sign_out(access_token).await {
            warn!(error = %e, "Failed to revoke backend session");
        }
    }
}

/// Validate password requirements.
///
/// # Errors
///
/// Returns `WeakPassword` when the password is too short, too long, or lacks
/// a letter or a digit.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }

    let has_letter = password.chars().any(char::is_alphabetic);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(AuthError::WeakPassword(
            "Password must contain a letter and a digit".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::tests::client_for;

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short1").is_err());
        assert!(validate_password("allletters").is_err());
        assert!(validate_password("12345678").is_err());
        assert!(validate_password(&"a1".repeat(65)).is_err());
        assert!(validate_password("market2024").is_ok());
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input_before_any_request() {
        // Nothing listens here; every case must fail before a request is made
        let backend = client_for("http://127.0.0.1:9");
        let auth = AuthService::new(&backend);

        let form = Registration {
            email: "not-an-email",
            username: "ada",
            password: "market2024",
            confirm_password: "market2024",
        };
        assert!(matches!(
            auth.register(&form).await,
            Err(AuthError::InvalidEmail(_))
        ));

        let form = Registration {
            email: "ada@example.com",
            username: "9ada",
            ..form
        };
        assert!(matches!(
            auth.register(&form).await,
            Err(AuthError::InvalidUsername(_))
        ));

        let form = Registration {
            username: "ada",
            confirm_password: "market2025",
            ..form
        };
        assert!(matches!(
            auth.register(&form).await,
            Err(AuthError::PasswordMismatch)
        ));
    }

    fn session_user(id: &str, token: &str) -> CurrentUser {
        CurrentUser {
            id: id.parse().unwrap(),
            email: Email::parse("ada@example.com").unwrap(),
            username: "ada".to_string(),
            role: UserRole::Admin,
            access_token: token.to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: i64::MAX,
        }
    }

    #[tokio::test]
    async fn test_confirm_checks_token_with_backend() {
        use axum::http::{HeaderMap, StatusCode, header};
        use axum::{Json, Router, routing::get};

        const OWNER: &str = "9b2f6c1e-7d4a-4c1b-9a33-5e2f1d0c8b7a";
        let router = Router::new().route(
            "/auth/v1/user",
            get(|headers: HeaderMap| async move {
                let bearer = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                if bearer == "Bearer live" {
                    Ok(Json(serde_json::json!({"id": OWNER, "email": "ada@example.com"})))
                } else {
                    Err((StatusCode::UNAUTHORIZED, r#"{"msg":"invalid JWT"}"#))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let backend = client_for(&format!("http://{addr}"));
        let auth = AuthService::new(&backend);

        assert!(auth.confirm(&session_user(OWNER, "live")).await.is_ok());
        assert!(matches!(
            auth.confirm(&session_user(OWNER, "revoked")).await,
            Err(AuthError::SessionExpired)
        ));
        // A live token that belongs to another account
        assert!(matches!(
            auth.confirm(&session_user("0f8fad5b-d9cb-469f-a165-70867728950e", "live"))
                .await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_login_with_malformed_email_is_invalid_credentials() {
        let backend = client_for("http://127.0.0.1:9");
        let result = AuthService::new(&backend).login("nobody", "market2024").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }
}

//! Authentication extractors.
//!
//! The signed-in user lives in the session as a [`CurrentUser`]. Extractors
//! refresh the backend access token shortly before it expires so handlers
//! can always pass `user.access_token` on to row-level-secured queries.

use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tower_sessions::Session;

use crate::error::{clear_sentry_user, set_sentry_user};
use crate::models::{CurrentUser, Flash, session_keys};
use crate::services::{AuthError, AuthService};
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// Page requests without a session are redirected to the login page; API
/// requests get a bare 401.
///
/// # Example
///
/// ```rust,ignore
/// async fn wallet(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, @{}!", user.username)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that requires a signed-in admin.
pub struct RequireAdmin(pub CurrentUser);

/// Extractor that optionally gets the current user.
pub struct OptionalAuth(pub Option<CurrentUser>);

/// Why an authenticated extractor refused the request.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (for API requests).
    Unauthorized,
    /// Signed in, but not an admin.
    Forbidden,
    /// The backend could not confirm the session.
    Unavailable,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/auth/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Forbidden => StatusCode::FORBIDDEN.into_response(),
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        }
    }
}

/// JSON endpoints get a bare 401; pages redirect to the login form.
fn rejection_for(parts: &Parts) -> AuthRejection {
    // Nested routers see their prefix stripped from `parts.uri`
    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map_or_else(|| parts.uri.path(), |uri| uri.0.path());
    if path.starts_with("/api/") {
        AuthRejection::Unauthorized
    } else {
        AuthRejection::RedirectToLogin
    }
}

/// Load the session user, refreshing its tokens when close to expiry.
///
/// A failed refresh (revoked token, banned account) signs the user out.
async fn load_user(session: &Session, state: &AppState) -> Option<CurrentUser> {
    let mut user: CurrentUser = session
        .get(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()?;

    if user.needs_refresh(Utc::now().timestamp()) {
        match AuthService::new(state.backend()).refresh(&mut user).await {
            Ok(()) => {
                if let Err(e) = set_current_user(session, &user).await {
                    tracing::error!(error = %e, "Failed to store refreshed tokens");
                }
            }
            Err(e) => {
                tracing::info!(user_id = %user.id, error = %e, "Session refresh failed, signing out");
                let _ = clear_current_user(session).await;
                let _ = session
                    .insert(session_keys::FLASH, Flash::error(e.to_string()))
                    .await;
                return None;
            }
        }
    }

    set_sentry_user(&user.id, Some(&user.username));
    Some(user)
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AuthRejection::Unauthorized)?;

        load_user(&session, state)
            .await
            .map(Self)
            .ok_or_else(|| rejection_for(parts))
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "Non-admin hit admin route");
            return Err(AuthRejection::Forbidden);
        }

        // Admin actions re-check the token instead of trusting the session
        match AuthService::new(state.backend()).confirm(&user).await {
            Ok(()) => Ok(Self(user)),
            Err(AuthError::SessionExpired) => {
                tracing::info!(user_id = %user.id, "Admin token revoked, signing out");
                if let Some(session) = parts.extensions.get::<Session>() {
                    let _ = clear_current_user(session).await;
                }
                Err(rejection_for(parts))
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not confirm admin session");
                Err(AuthRejection::Unavailable)
            }
        }
    }
}

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>().cloned() {
            Some(session) => load_user(&session, state).await,
            None => None,
        };
        Ok(Self(user))
    }
}

/// Helper to set the current user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    clear_sentry_user();
    Ok(())
}

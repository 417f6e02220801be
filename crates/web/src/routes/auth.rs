//! Authentication route handlers.
//!
//! Sign-in goes through the managed backend's password grant; the tokens
//! it returns are kept in the server-side session as [`CurrentUser`].

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{error, info};

use super::{PageContext, flash_or_fail, redirect_with_success};
use crate::error::AppError;
use crate::filters;
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::services::{AuthService, Registered, Registration};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub username: String,
    pub password: String,
    pub password_confirm: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub ctx: PageContext,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub ctx: PageContext,
}

/// Start a fresh session for `user`.
///
/// The session ID is rotated so a pre-login ID cannot be reused.
async fn sign_in(session: &Session, user: &CurrentUser) -> Result<(), AppError> {
    session
        .cycle_id()
        .await
        .map_err(|e| AppError::Internal(format!("session: {e}")))?;
    set_current_user(session, user)
        .await
        .map_err(|e| AppError::Internal(format!("session: {e}")))
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page. Signed-in users go straight to the feed.
pub async fn login_page(ctx: PageContext) -> Response {
    if ctx.user.is_some() {
        return Redirect::to("/").into_response();
    }
    LoginTemplate { ctx }.into_response()
}

/// Handle login form submission.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let result = match AuthService::new(state.backend())
        .login(&form.email, &form.password)
        .await
    {
        Ok(user) => sign_in(&session, &user).await.map(|()| user),
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(user) => {
            let welcome = format!("Welcome back, @{}", user.username);
            redirect_with_success(&session, "/", &welcome).await
        }
        Err(e) => {
            if !e.is_user_facing() {
                error!(error = %e, "Login failed");
            }
            flash_or_fail(&session, e, "/auth/login").await
        }
    }
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(ctx: PageContext) -> Response {
    if ctx.user.is_some() {
        return Redirect::to("/").into_response();
    }
    RegisterTemplate { ctx }.into_response()
}

/// Handle registration form submission.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Response {
    let registration = Registration {
        email: &form.email,
        username: &form.username,
        password: &form.password,
        confirm_password: &form.password_confirm,
    };

    let registered = AuthService::new(state.backend())
        .register(&registration)
        .await
        .map_err(AppError::from);

    match registered {
        Ok(Registered::SignedIn(user)) => match sign_in(&session, &user).await {
            Ok(()) => {
                info!(user_id = %user.id, "Account created");
                let welcome = format!("Welcome to Agora, @{}", user.username);
                redirect_with_success(&session, "/", &welcome).await
            }
            Err(e) => flash_or_fail(&session, e, "/auth/login").await,
        },
        Ok(Registered::ConfirmEmail) => {
            redirect_with_success(
                &session,
                "/auth/login",
                "Check your email to confirm your account, then sign in",
            )
            .await
        }
        Err(e) => flash_or_fail(&session, e, "/auth/register").await,
    }
}

// =============================================================================
// Logout
// =============================================================================

/// Revoke the backend session and clear ours.
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Response {
    AuthService::new(state.backend()).logout(&user).await;
    if let Err(e) = clear_current_user(&session).await {
        error!(error = %e, "Failed to clear session user");
    }
    redirect_with_success(&session, "/", "Signed out").await
}

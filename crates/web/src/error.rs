//! Unified error handling with Sentry integration.
//!
//! Handlers return `Result<T, AppError>`. Errors the user can act on (bad
//! input, insufficient funds, a taken username) are turned into flash
//! notices by the page handlers via [`AppError::is_user_facing`]; the rest
//! become plain error responses and are captured to Sentry.

use agora_core::cart::CartError;
use agora_core::payments::RoutingError;
use agora_core::shipping::ShippingError;
use agora_core::validation::ValidationError;
use agora_core::wallet::LedgerError;
use agora_core::{MoneyError, UsernameError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::backend::BackendError;
use crate::payments::GatewayError;
use crate::services::auth::AuthError;
use crate::services::media::MediaError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Managed backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Payment gateway call failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Upload rejected or storage failed.
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Shipping error: {0}")]
    Shipping(#[from] ShippingError),

    #[error("Payment routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Wallet error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Amount error: {0}")]
    Money(#[from] MoneyError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Duplicate or concurrent change.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UsernameError> for AppError {
    fn from(err: UsernameError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl AppError {
    /// Whether the user caused this and can fix it, so it should be shown
    /// as a notice rather than an error page.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        match self {
            Self::Backend(err) => matches!(
                err,
                BackendError::NotFound(_) | BackendError::Conflict(_) | BackendError::RateLimited(_)
            ),
            Self::Gateway(err) => matches!(
                err,
                GatewayError::Api { .. } | GatewayError::Mismatch(_) | GatewayError::NotConfigured(_)
            ),
            Self::Auth(err) => !matches!(err, AuthError::Backend(_) | AuthError::ProfileMissing(_)),
            Self::Media(err) => !matches!(err, MediaError::Backend(_)),
            Self::Internal(_) => false,
            _ => true,
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Backend(err) => match err {
                BackendError::NotFound(_) => StatusCode::NOT_FOUND,
                BackendError::Conflict(_) => StatusCode::CONFLICT,
                BackendError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                BackendError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Gateway(err) => match err {
                GatewayError::Signature(_) => StatusCode::UNAUTHORIZED,
                GatewayError::Mismatch(_) => StatusCode::PAYMENT_REQUIRED,
                GatewayError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::SessionExpired => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::AccountBanned => StatusCode::FORBIDDEN,
                AuthError::UserAlreadyExists | AuthError::UsernameTaken(_) => StatusCode::CONFLICT,
                AuthError::Backend(_) | AuthError::ProfileMissing(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::BAD_REQUEST,
            },
            Self::Media(err) => match err {
                MediaError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                MediaError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                MediaError::Empty => StatusCode::BAD_REQUEST,
                MediaError::Backend(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Ledger(LedgerError::InsufficientFunds { .. }) => StatusCode::PAYMENT_REQUIRED,
            Self::Validation(_)
            | Self::Cart(_)
            | Self::Shipping(_)
            | Self::Routing(_)
            | Self::Ledger(_)
            | Self::Money(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the user. Internal details stay in the logs.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend(err) => match err {
                BackendError::NotFound(_) => "That could not be found".to_string(),
                BackendError::Conflict(_) => {
                    "That already exists or was just changed, please try again".to_string()
                }
                BackendError::RateLimited(secs) => {
                    format!("Too many requests, try again in {secs} seconds")
                }
                BackendError::Unauthorized(_) => "Please sign in again".to_string(),
                _ => "Something went wrong, please try again".to_string(),
            },
            Self::Gateway(err) => match err {
                GatewayError::Mismatch(_) => {
                    "Your payment could not be confirmed. You have not been charged twice; contact support if money left your account.".to_string()
                }
                GatewayError::NotConfigured(gateway) => {
                    format!("{gateway} payments are unavailable right now")
                }
                GatewayError::Api { .. } => {
                    "The payment provider declined the request, please try another method"
                        .to_string()
                }
                _ => "Payment provider error, please try again".to_string(),
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid email or password".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::UsernameTaken(name) => format!("@{name} is already taken"),
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::PasswordMismatch => "Passwords do not match".to_string(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::InvalidUsername(e) => capitalize(&e.to_string()),
                AuthError::AccountBanned => "This account has been suspended".to_string(),
                AuthError::SessionExpired => {
                    "Your session expired, please sign in again".to_string()
                }
                AuthError::Backend(_) | AuthError::ProfileMissing(_) => {
                    "Authentication error".to_string()
                }
            },
            Self::Media(MediaError::Backend(_)) => "Upload failed, please try again".to_string(),
            Self::Media(err) => capitalize(&err.to_string()),
            Self::Validation(err) => capitalize(&err.to_string()),
            Self::Cart(err) => capitalize(&err.to_string()),
            Self::Shipping(err) => capitalize(&err.to_string()),
            Self::Routing(err) => capitalize(&err.to_string()),
            Self::Ledger(err) => capitalize(&err.to_string()),
            Self::Money(err) => capitalize(&err.to_string()),
            Self::NotFound(what) => format!("{} not found", capitalize(what)),
            Self::Unauthorized(_) => "Please sign in to continue".to_string(),
            Self::Forbidden(msg) | Self::BadRequest(msg) | Self::Conflict(msg) => msg.clone(),
            Self::RateLimited => "Too many requests, please slow down".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if !self.is_user_facing() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (self.status(), self.user_message()).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, username: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            username: username.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                             - Home feed (signed in) or landing page
//! GET  /health, /health/ready        - Liveness and backend readiness
//!
//! # Posts
//! POST /posts                        - Create post (multipart: body, group_id, media)
//! GET  /posts/{id}                   - Post with comments
//! POST /posts/{id}/like              - Toggle like
//! POST /posts/{id}/comments          - Add comment
//! POST /posts/{id}/delete            - Delete own post
//!
//! # People
//! GET  /u/{username}                 - Profile and posts
//! POST /u/{username}/follow          - Toggle follow
//! GET  /profile/edit, POST           - Edit own profile (multipart: avatar)
//! GET  /users?q=                     - User search
//!
//! # Groups
//! GET  /groups, POST                 - List / create
//! GET  /groups/{id}                  - Group feed and members
//! POST /groups/{id}/join|leave       - Membership
//! POST /groups/{id}/members/{user}/approve
//!
//! # Stores
//! GET  /stores, POST                 - List / open a store
//! GET  /stores/{slug}                - Storefront
//! POST /stores/{slug}/products       - Add product (owner, multipart: image)
//! GET  /products/{id}                - Product page
//!
//! # Cart and checkout
//! GET  /cart, GET /cart/count
//! POST /cart/add|update|remove
//! GET  /checkout, POST /checkout
//! GET  /checkout/callback            - Gateway return
//! GET  /orders, GET /orders/{id}
//! POST /orders/{id}/status           - Store owner advances an order
//!
//! # Wallet
//! GET  /wallet, GET /wallet/callback
//! POST /wallet/fund|withdraw|transfer
//!
//! # Auth
//! GET/POST /auth/login, /auth/register; POST /auth/logout
//!
//! # Admin (admin role)
//! GET  /admin, /admin/users, /admin/orders, /admin/transactions
//! POST /admin/users/{id}/ban|unban|role, /admin/orders/{id}/status
//!
//! # JSON API and webhooks
//! POST /api/shipping/quote
//! GET  /api/payments/verify?reference=
//! POST /webhooks/paystack, /webhooks/flutterwave
//! ```

pub mod admin;
pub mod api;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod groups;
pub mod home;
pub mod orders;
pub mod posts;
pub mod profiles;
pub mod stores;
pub mod wallet;
pub mod webhooks;

use std::collections::HashMap;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, OriginalUri, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use tower_sessions::Session;

use crate::error::{AppError, Result};
use crate::middleware::{CspNonce, OptionalAuth, api_rate_limiter, auth_rate_limiter};
use crate::models::{CurrentUser, Flash, session_keys};
use crate::services::media::MAX_VIDEO_BYTES;
use crate::state::AppState;

/// Request body cap for routes that take uploads.
const UPLOAD_BODY_LIMIT: usize = MAX_VIDEO_BYTES + 1024 * 1024;

// =============================================================================
// Page context
// =============================================================================

/// What every rendered page needs: the signed-in user, the pending flash
/// notice (consumed on read), the CSP nonce and the current path.
pub struct PageContext {
    pub user: Option<CurrentUser>,
    pub flash: Option<Flash>,
    pub nonce: String,
    /// Path and query of this page, used as `return_to` by inline forms.
    pub path: String,
}

impl PageContext {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(CurrentUser::is_admin)
    }

    #[must_use]
    pub fn username(&self) -> &str {
        self.user.as_ref().map_or("", |u| u.username.as_str())
    }
}

impl FromRequestParts<AppState> for PageContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let OptionalAuth(user) = OptionalAuth::from_request_parts(parts, state).await?;
        let CspNonce(nonce) = CspNonce::from_request_parts(parts, state).await?;
        let flash = match parts.extensions.get::<Session>() {
            Some(session) => session
                .remove::<Flash>(session_keys::FLASH)
                .await
                .ok()
                .flatten(),
            None => None,
        };
        // Nested routers see their prefix stripped from `parts.uri`
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map_or(&parts.uri, |original| &original.0);
        let path = uri
            .path_and_query()
            .map_or_else(|| "/".to_string(), ToString::to_string);
        Ok(Self {
            user,
            flash,
            nonce,
            path,
        })
    }
}

// =============================================================================
// Flash helpers
// =============================================================================

/// Queue a notice for the next rendered page.
pub async fn set_flash(session: &Session, flash: Flash) {
    if let Err(e) = session.insert(session_keys::FLASH, flash).await {
        tracing::warn!(error = %e, "Failed to store flash notice");
    }
}

/// Redirect to `to` with a success notice.
pub async fn redirect_with_success(session: &Session, to: &str, message: &str) -> Response {
    set_flash(session, Flash::success(message)).await;
    Redirect::to(to).into_response()
}

/// Show a user-facing error as a notice on `back`; anything else becomes
/// the error response.
pub async fn flash_or_fail(session: &Session, err: AppError, back: &str) -> Response {
    if err.is_user_facing() {
        set_flash(session, Flash::error(err.user_message())).await;
        Redirect::to(back).into_response()
    } else {
        err.into_response()
    }
}

/// Settle a form result: success notice and redirect, or [`flash_or_fail`].
pub async fn finish<T>(
    session: &Session,
    result: Result<T>,
    success: &str,
    success_to: &str,
    back: &str,
) -> Response {
    match result {
        Ok(_) => redirect_with_success(session, success_to, success).await,
        Err(e) => flash_or_fail(session, e, back).await,
    }
}

// =============================================================================
// Multipart forms
// =============================================================================

/// A file part from a multipart form.
pub struct FilePart {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Text fields plus at most one non-empty file.
#[derive(Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub file: Option<FilePart>,
}

impl MultipartForm {
    /// Read every part. Empty file inputs (nothing chosen) are skipped.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for malformed or oversized bodies.
    pub async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self> {
        let bad = |e: axum::extract::multipart::MultipartError| AppError::BadRequest(e.body_text());
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(bad)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == file_field {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad)?;
                if !bytes.is_empty() {
                    form.file = Some(FilePart {
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            } else {
                let value = field.text().await.map_err(bad)?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Move the uploaded file out, leaving the text fields readable.
    pub const fn take_file(&mut self) -> Option<FilePart> {
        self.file.take()
    }

    #[must_use]
    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map_or("", String::as_str)
    }

    /// A field, or `None` when missing or blank.
    #[must_use]
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

// =============================================================================
// Routers
// =============================================================================

fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(posts::create))
        .route("/{id}", get(posts::show))
        .route("/{id}/like", post(posts::like))
        .route("/{id}/comments", post(posts::comment))
        .route("/{id}/delete", post(posts::delete))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

fn group_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(groups::index).post(groups::create))
        .route("/{id}", get(groups::show))
        .route("/{id}/join", post(groups::join))
        .route("/{id}/leave", post(groups::leave))
        .route("/{id}/members/{user}/approve", post(groups::approve))
}

fn store_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(stores::index).post(stores::create))
        .route("/{slug}", get(stores::show))
        .route("/{slug}/products", post(stores::add_product))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/count", get(cart::count))
}

fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show).post(checkout::place))
        .route("/callback", get(checkout::callback))
}

fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show))
        .route("/{id}/status", post(orders::update_status))
}

fn wallet_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wallet::show))
        .route("/fund", post(wallet::fund))
        .route("/withdraw", post(wallet::withdraw))
        .route("/transfer", post(wallet::transfer))
        .route("/callback", get(wallet::callback))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(admin::dashboard))
        .route("/users", get(admin::users))
        .route("/users/{id}/ban", post(admin::ban))
        .route("/users/{id}/unban", post(admin::unban))
        .route("/users/{id}/role", post(admin::set_role))
        .route("/orders", get(admin::orders))
        .route("/orders/{id}/status", post(admin::update_order_status))
        .route("/transactions", get(admin::transactions))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/shipping/quote", post(api::shipping_quote))
        .route("/payments/verify", get(api::verify_payment))
}

fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/paystack", post(webhooks::paystack))
        .route("/flutterwave", post(webhooks::flutterwave))
}

/// Create all page, API and webhook routes.
///
/// Rate limiting is applied here so it wraps only the routes it is meant
/// for; session and header middleware is added by [`crate::app`].
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/posts", post_routes())
        .route("/u/{username}", get(profiles::show))
        .route("/u/{username}/follow", post(profiles::follow))
        .route(
            "/profile/edit",
            get(profiles::edit_page)
                .post(profiles::update)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/users", get(profiles::search))
        .nest("/groups", group_routes())
        .nest("/stores", store_routes())
        .route("/products/{id}", get(stores::product))
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .nest("/orders", order_routes())
        .nest("/wallet", wallet_routes())
        .nest("/auth", auth_routes().layer(auth_rate_limiter()))
        .nest("/admin", admin_routes())
        .nest("/api", api_routes().layer(api_rate_limiter()))
        .nest("/webhooks", webhook_routes().layer(api_rate_limiter()))
}

// =============================================================================
// Health
// =============================================================================

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the managed backend is not reachable.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.backend().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Backend not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{Request, header};

    const BOUNDARY: &str = "agora-form-boundary";

    /// A multipart body of `(name, file content type, value)` parts.
    pub async fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Multipart {
        let mut body = String::new();
        for (name, content_type, value) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match content_type {
                Some(ct) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"upload\"\r\nContent-Type: {ct}\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        let request = Request::builder()
            .method("POST")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_text_fields_survive_taking_the_file() {
        let parts = multipart(&[
            ("title", None, "Indigo adire"),
            ("image", Some("image/png"), "PNGDATA"),
            ("digital", None, "on"),
        ])
        .await;
        let mut form = MultipartForm::read(parts, "image").await.unwrap();

        let file = form.take_file().unwrap();
        assert_eq!(file.content_type, "image/png");
        assert_eq!(file.bytes, b"PNGDATA");
        assert!(form.take_file().is_none());

        assert_eq!(form.text("title"), "Indigo adire");
        assert_eq!(form.non_empty("digital"), Some("on"));
        assert_eq!(form.text("missing"), "");
    }

    #[tokio::test]
    async fn test_empty_file_input_is_skipped() {
        let parts = multipart(&[("body", None, "hello"), ("media", Some("image/jpeg"), "")]).await;
        let mut form = MultipartForm::read(parts, "media").await.unwrap();
        assert!(form.take_file().is_none());
        assert_eq!(form.text("body"), "hello");
    }
}

//! Agora web application library.
//!
//! The binary in `main.rs` only loads configuration, sets up Sentry and
//! tracing, and serves [`app`]. Everything else lives here so integration
//! tests can drive the full router.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;

use axum::{
    Router,
    body::Body,
    http::Request,
    middleware::{from_fn, from_fn_with_state},
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Directory served under `/static`, relative to the workspace root.
pub const STATIC_DIR: &str = "crates/web/static";

/// Build the full application router with its middleware stack.
///
/// See [`middleware`] for the layer order.
pub fn app(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.config());

    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = tracing::field::Empty,
        )
    });

    routes::routes()
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(session_layer)
        .layer(from_fn(middleware::csp_nonce_middleware))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::security_headers_middleware,
        ))
        .layer(from_fn(middleware::request_id_middleware))
        .layer(trace_layer)
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::{StatusCode, header};
    use axum::response::Response;
    use tower::ServiceExt;

    /// The full app with a backend address nothing listens on.
    fn test_app() -> Router {
        let config = config::tests::test_config();
        let backend = backend::tests::client_for("http://127.0.0.1:9");
        let gateways = payments::Gateways::new(&config.gateways).unwrap();
        app(AppState::from_parts(config, backend, gateways))
    }

    async fn send(request: Request<Body>) -> Response {
        test_app().oneshot(request).await.unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = send(get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_responses_carry_security_headers() {
        let response = send(get("/health")).await;
        let headers = response.headers();
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert!(headers.contains_key(middleware::request_id::REQUEST_ID_HEADER));
        let policy = headers
            .get(header::CONTENT_SECURITY_POLICY)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(policy.contains("'nonce-"));
        assert!(policy.contains("https://checkout.paystack.com"));
    }

    #[tokio::test]
    async fn test_pages_redirect_anonymous_users_to_login() {
        for uri in ["/wallet", "/cart", "/orders", "/checkout", "/admin"] {
            let response = send(get(uri)).await;
            assert!(response.status().is_redirection(), "{uri}");
            assert_eq!(
                response.headers().get(header::LOCATION).unwrap(),
                "/auth/login",
                "{uri}"
            );
        }
    }

    #[tokio::test]
    async fn test_api_rejects_anonymous_users() {
        let response = send(get("/api/payments/verify?reference=AGR-ORD-x")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_webhook_with_bad_signature_is_refused() {
        let request = Request::post("/webhooks/paystack")
            .header("x-paystack-signature", "deadbeef")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"event":"charge.success","data":{"reference":"AGR-ORD-x"}}"#))
            .unwrap();
        let response = send(request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cart_count_is_zero_when_signed_out() {
        let response = send(get("/cart/count")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

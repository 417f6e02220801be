//! Security headers middleware for XSS, clickjacking, and isolation protection.
//!
//! Starts locked down. The exceptions are media served from the backend's
//! storage bucket, the per-request script nonce, and form posts that
//! redirect to a gateway's hosted checkout.

use axum::{
    extract::{Request, State},
    http::{
        HeaderName, HeaderValue,
        header::{
            CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
        },
    },
    middleware::Next,
    response::Response,
};

use super::csp::CspNonce;
use crate::state::AppState;

/// Hosted checkout origins a form post may redirect to.
const CHECKOUT_ORIGINS: &str = "https://checkout.paystack.com https://checkout.flutterwave.com";

/// Build the `Content-Security-Policy` value.
#[must_use]
pub fn content_security_policy(nonce: Option<&str>, media_origin: &str, https: bool) -> String {
    let script_src = nonce.map_or_else(
        || "'self'".to_string(),
        |nonce| format!("'self' 'nonce-{nonce}'"),
    );
    let mut policy = format!(
        "default-src 'none'; \
         script-src {script_src}; \
         style-src 'self'; \
         font-src 'self'; \
         img-src 'self' data: {media_origin}; \
         media-src 'self' {media_origin}; \
         connect-src 'self'; \
         frame-src 'none'; \
         object-src 'none'; \
         base-uri 'self'; \
         form-action 'self' {CHECKOUT_ORIGINS}; \
         frame-ancestors 'none'"
    );
    if https {
        policy.push_str("; upgrade-insecure-requests");
    }
    policy
}

/// Add security headers to all responses.
///
/// Headers applied:
/// - `X-Frame-Options: DENY`
/// - `X-Content-Type-Options: nosniff`
/// - `Referrer-Policy: no-referrer`
/// - `Content-Security-Policy` (see [`content_security_policy`])
/// - `Permissions-Policy` denying sensitive features
/// - `Cache-Control: no-store, max-age=0`
/// - `Cross-Origin-Opener-Policy: same-origin`
/// - `Cross-Origin-Resource-Policy: same-origin`
/// - `Cross-Origin-Embedder-Policy: credentialless` (backend media carries no CORP header)
/// - `X-DNS-Prefetch-Control: off`
pub async fn security_headers_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let nonce = response.extensions().get::<CspNonce>().cloned();
    let policy = content_security_policy(
        nonce.as_ref().map(CspNonce::value),
        state.backend().url(),
        state.config().is_https(),
    );

    let headers = response.headers_mut();

    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));

    match HeaderValue::from_str(&policy) {
        Ok(value) => {
            headers.insert(CONTENT_SECURITY_POLICY, value);
        }
        Err(e) => {
            tracing::error!(error = %e, "Invalid CSP header, falling back to strict policy");
            headers.insert(
                CONTENT_SECURITY_POLICY,
                HeaderValue::from_static("default-src 'self'; frame-ancestors 'none'"),
            );
        }
    }

    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static(
            "accelerometer=(), \
             ambient-light-sensor=(), \
             autoplay=(), \
             battery=(), \
             browsing-topics=(), \
             camera=(), \
             display-capture=(), \
             document-domain=(), \
             geolocation=(), \
             gyroscope=(), \
             hid=(), \
             idle-detection=(), \
             interest-cohort=(), \
             magnetometer=(), \
             microphone=(), \
             midi=(), \
             payment=(), \
             serial=(), \
             usb=(), \
             xr-spatial-tracking=()",
        ),
    );

    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store, max-age=0"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-embedder-policy"),
        HeaderValue::from_static("credentialless"),
    );
    headers.insert(
        HeaderName::from_static("x-dns-prefetch-control"),
        HeaderValue::from_static("off"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_allows_backend_media_and_nonce() {
        let policy =
            content_security_policy(Some("abc123"), "https://proj.backend.example", true);
        assert!(policy.contains("script-src 'self' 'nonce-abc123';"));
        assert!(policy.contains("img-src 'self' data: https://proj.backend.example;"));
        assert!(policy.contains("media-src 'self' https://proj.backend.example;"));
        assert!(policy.contains("https://checkout.paystack.com"));
        assert!(policy.ends_with("upgrade-insecure-requests"));
    }

    #[test]
    fn test_policy_without_nonce_or_https() {
        let policy = content_security_policy(None, "http://127.0.0.1:54321", false);
        assert!(policy.contains("script-src 'self';"));
        assert!(!policy.contains("upgrade-insecure-requests"));
    }
}

//! Integration tests for Agora.
//!
//! # Running Tests
//!
//! ```bash
//! # Cross-module tests (no server needed)
//! cargo test -p agora-integration-tests
//!
//! # Tests against a running server and backend
//! AGORA_TEST_URL=http://localhost:3000 cargo test -p agora-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `checkout_rules` - cart, shipping, routing and ledger rules together
//! - `order_lifecycle` - order state machine as seen by sellers and admins
//! - `webhook_signatures` - the signing helper against gateway verification
//! - `web_smoke` - HTTP checks against a live server (`#[ignore]`d)

use hmac::{Hmac, Mac};
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use sha2::Sha512;

/// Default server address when `AGORA_TEST_URL` is unset.
pub const DEFAULT_URL: &str = "http://localhost:3000";

/// A cookie-keeping client pointed at a running server.
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
}

impl TestContext {
    /// Build a context from `AGORA_TEST_URL`.
    ///
    /// Redirects are not followed so tests can assert on them.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_env() -> Result<Self, reqwest::Error> {
        let base_url = std::env::var("AGORA_TEST_URL")
            .unwrap_or_else(|_| DEFAULT_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()?;
        Ok(Self { client, base_url })
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get(&self, path: &str) -> Result<Response, reqwest::Error> {
        self.client.get(self.url(path)).send().await
    }

    /// Post a urlencoded form.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Response, reqwest::Error> {
        self.client.post(self.url(path)).form(form).send().await
    }
}

/// Paystack-style signature (hex HMAC-SHA512 of the raw body).
///
/// # Panics
///
/// Never: HMAC accepts keys of any length.
#[must_use]
pub fn paystack_signature(secret: &str, body: &[u8]) -> String {
    #[allow(clippy::expect_used)]
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).expect("HMAC takes any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_hex_sha512() {
        let signature = paystack_signature("sk_test", b"{}");
        assert_eq!(signature.len(), 128);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(signature, paystack_signature("sk_other", b"{}"));
    }
}

//! Paystack client.
//!
//! Hosted checkout via `POST /transaction/initialize`, confirmation via
//! `GET /transaction/verify/{reference}`. Amounts are sent and returned in
//! minor units. Webhooks are signed with HMAC-SHA512 of the raw body using
//! the secret key, hex encoded in `x-paystack-signature`.

use agora_core::payments::{Gateway, PaymentMethod};
use agora_core::{Currency, Money, PaymentStatus};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha512;
use tracing::{debug, instrument};

use super::{CheckoutRequest, GatewayError, VerifiedPayment, constant_time_compare};

/// Paystack API base URL.
const BASE_URL: &str = "https://api.paystack.co";

/// Paystack API client.
#[derive(Clone)]
pub struct PaystackClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: SecretString,
}

/// Paystack wraps every response in `{status, message, data}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: i64,
    currency: Currency,
}

/// The parts of a webhook event the site acts on.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub reference: String,
}

impl PaystackClient {
    /// Create a new Paystack client.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(secret_key: SecretString) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", secret_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| GatewayError::Parse(format!("Invalid Paystack key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            secret_key,
        })
    }

    /// Point the client at another host (a local test server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        base_url.trim_end_matches('/').clone_into(&mut self.base_url);
        self
    }

    /// Start a hosted checkout and return the authorization URL.
    ///
    /// # Errors
    ///
    /// Returns error if the amount does not convert to minor units or the
    /// API rejects the request.
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    pub async fn initialize(&self, request: &CheckoutRequest<'_>) -> Result<String, GatewayError> {
        let body = serde_json::json!({
            "email": request.email,
            "amount": request.amount.to_minor_units()?,
            "currency": request.amount.currency,
            "reference": request.reference.to_string(),
            "callback_url": request.callback_url,
            "channels": [channel(request.method)],
        });

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .json(&body)
            .send()
            .await?;
        let data: InitializeData = read_envelope(response).await?;

        debug!("Paystack checkout initialized");
        Ok(data.authorization_url)
    }

    /// Look up a transaction by reference.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or the response is malformed.
    #[instrument(skip(self))]
    pub async fn verify(&self, reference: &str) -> Result<VerifiedPayment, GatewayError> {
        let response = self
            .client
            .get(format!(
                "{}/transaction/verify/{}",
                self.base_url,
                urlencoding::encode(reference)
            ))
            .send()
            .await?;
        let data: VerifyData = read_envelope(response).await?;

        Ok(VerifiedPayment {
            gateway: Gateway::Paystack,
            reference: data.reference,
            status: status_from(&data.status),
            amount: Money::from_minor_units(data.amount, data.currency),
        })
    }

    /// Check a webhook signature and parse the event.
    ///
    /// # Errors
    ///
    /// Returns `Signature` if the signature does not match and `Parse` if
    /// the body is not a Paystack event.
    pub fn verify_webhook(&self, body: &[u8], signature: &str) -> Result<WebhookEvent, GatewayError> {
        let mut mac = Hmac::<Sha512>::new_from_slice(self.secret_key.expose_secret().as_bytes())
            .map_err(|e| GatewayError::Signature(e.to_string()))?;
        mac.update(body);
        let expected = hex::encode(mac.finalize().into_bytes());

        if !constant_time_compare(expected.as_bytes(), signature.trim().as_bytes()) {
            return Err(GatewayError::Signature("Paystack signature mismatch".to_string()));
        }

        serde_json::from_slice(body).map_err(|e| GatewayError::Parse(e.to_string()))
    }
}

const fn channel(method: PaymentMethod) -> &'static str {
    Gateway::Paystack.channel(method)
}

fn status_from(status: &str) -> PaymentStatus {
    match status {
        "success" => PaymentStatus::Succeeded,
        "abandoned" => PaymentStatus::Abandoned,
        "failed" | "reversed" => PaymentStatus::Failed,
        // ongoing, pending, processing, queued
        _ => PaymentStatus::Pending,
    }
}

async fn read_envelope<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    let text = response.text().await?;

    let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
        if status.is_success() {
            GatewayError::Parse(e.to_string())
        } else {
            GatewayError::Api {
                gateway: Gateway::Paystack,
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            }
        }
    })?;

    if !status.is_success() || !envelope.status {
        return Err(GatewayError::Api {
            gateway: Gateway::Paystack,
            status: status.as_u16(),
            message: envelope.message,
        });
    }

    envelope
        .data
        .ok_or_else(|| GatewayError::Parse("Paystack response has no data".to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use agora_core::payments::{PaymentPurpose, PaymentReference};
    use axum::routing::{get, post};
    use axum::{Json, Router};

    fn client() -> PaystackClient {
        PaystackClient::new(SecretString::from("sk_test_paystack")).unwrap()
    }

    fn sign(body: &[u8]) -> String {
        let mut mac = Hmac::<Sha512>::new_from_slice(b"sk_test_paystack").unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    #[test]
    fn test_webhook_signature_accepted() {
        let body = br#"{"event":"charge.success","data":{"reference":"AGR-ORD-abc"}}"#;
        let event = client().verify_webhook(body, &sign(body)).unwrap();
        assert_eq!(event.event, "charge.success");
        assert_eq!(event.data.reference, "AGR-ORD-abc");
    }

    #[test]
    fn test_webhook_signature_rejected() {
        let body = br#"{"event":"charge.success","data":{"reference":"AGR-ORD-abc"}}"#;
        let tampered = br#"{"event":"charge.success","data":{"reference":"AGR-ORD-xyz"}}"#;
        let result = client().verify_webhook(tampered, &sign(body));
        assert!(matches!(result, Err(GatewayError::Signature(_))));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_from("success"), PaymentStatus::Succeeded);
        assert_eq!(status_from("abandoned"), PaymentStatus::Abandoned);
        assert_eq!(status_from("failed"), PaymentStatus::Failed);
        assert_eq!(status_from("ongoing"), PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_verify_reads_minor_units() {
        let router = Router::new().route(
            "/transaction/verify/{reference}",
            get(|axum::extract::Path(reference): axum::extract::Path<String>| async move {
                Json(serde_json::json!({
                    "status": true,
                    "message": "Verification successful",
                    "data": {
                        "status": "success",
                        "reference": reference,
                        "amount": 1_250_050,
                        "currency": "NGN"
                    }
                }))
            }),
        );
        let base = serve(router).await;

        let verified = client()
            .with_base_url(&base)
            .verify("AGR-ORD-abc")
            .await
            .unwrap();
        assert_eq!(verified.status, PaymentStatus::Succeeded);
        assert_eq!(verified.reference, "AGR-ORD-abc");
        assert_eq!(
            verified.amount,
            Money::parse("12500.50", Currency::NGN).unwrap()
        );
    }

    #[tokio::test]
    async fn test_initialize_sends_minor_units_and_channel() {
        let router = Router::new().route(
            "/transaction/initialize",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["amount"], 900_000);
                assert_eq!(body["channels"][0], "bank_transfer");
                Json(serde_json::json!({
                    "status": true,
                    "message": "Authorization URL created",
                    "data": { "authorization_url": "https://checkout.paystack.com/xyz" }
                }))
            }),
        );
        let base = serve(router).await;

        let reference = PaymentReference::generate(PaymentPurpose::Order);
        let request = CheckoutRequest {
            reference: &reference,
            email: "ada@example.com",
            name: "Ada",
            amount: Money::parse("9000", Currency::NGN).unwrap(),
            method: PaymentMethod::BankTransfer,
            callback_url: "http://localhost:3000/checkout/callback",
        };
        let url = client().with_base_url(&base).initialize(&request).await.unwrap();
        assert_eq!(url, "https://checkout.paystack.com/xyz");
    }

    #[tokio::test]
    async fn test_api_error_surfaces_message() {
        let router = Router::new().route(
            "/transaction/verify/{reference}",
            get(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"status": false, "message": "Transaction reference not found"})),
                )
            }),
        );
        let base = serve(router).await;

        let err = client()
            .with_base_url(&base)
            .verify("AGR-ORD-missing")
            .await
            .unwrap_err();
        assert!(
            matches!(err, GatewayError::Api { status: 400, ref message, .. } if message.contains("not found"))
        );
    }
}

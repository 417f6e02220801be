//! Flutterwave client (v3 API).
//!
//! Hosted checkout via `POST /v3/payments` (amounts in major units),
//! confirmation via `GET /v3/transactions/verify_by_reference?tx_ref=`.
//! Webhooks carry the dashboard-configured secret hash in `verif-hash`.

use agora_core::payments::Gateway;
use agora_core::{Currency, Money, PaymentStatus};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{CheckoutRequest, GatewayError, VerifiedPayment, constant_time_compare};

/// Flutterwave API base URL.
const BASE_URL: &str = "https://api.flutterwave.com/v3";

/// Flutterwave API client.
#[derive(Clone)]
pub struct FlutterwaveClient {
    client: reqwest::Client,
    base_url: String,
    webhook_hash: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaymentLink {
    link: String,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    status: String,
    tx_ref: String,
    amount: Decimal,
    currency: Currency,
}

/// The parts of a webhook event the site acts on.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub tx_ref: String,
    #[serde(default)]
    pub status: String,
}

impl FlutterwaveClient {
    /// Create a new Flutterwave client.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(
        secret_key: &SecretString,
        webhook_hash: Option<SecretString>,
    ) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", secret_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value).map_err(|e| {
                GatewayError::Parse(format!("Invalid Flutterwave key format: {e}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            webhook_hash,
        })
    }

    /// Point the client at another host (a local test server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        base_url.trim_end_matches('/').clone_into(&mut self.base_url);
        self
    }

    /// Create a hosted payment link.
    ///
    /// # Errors
    ///
    /// Returns error if the API rejects the request.
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    pub async fn create_payment(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<String, GatewayError> {
        let body = serde_json::json!({
            "tx_ref": request.reference.to_string(),
            "amount": request.amount.major_string(),
            "currency": request.amount.currency,
            "redirect_url": request.callback_url,
            "payment_options": Gateway::Flutterwave.channel(request.method),
            "customer": {
                "email": request.email,
                "name": request.name,
            },
            "customizations": { "title": "Agora" },
        });

        let response = self
            .client
            .post(format!("{}/payments", self.base_url))
            .json(&body)
            .send()
            .await?;
        let data: PaymentLink = read_envelope(response).await?;

        debug!("Flutterwave payment link created");
        Ok(data.link)
    }

    /// Look up a transaction by our reference.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or the response is malformed.
    #[instrument(skip(self))]
    pub async fn verify_by_reference(
        &self,
        reference: &str,
    ) -> Result<VerifiedPayment, GatewayError> {
        let response = self
            .client
            .get(format!("{}/transactions/verify_by_reference", self.base_url))
            .query(&[("tx_ref", reference)])
            .send()
            .await?;
        let data: TransactionData = read_envelope(response).await?;

        Ok(VerifiedPayment {
            gateway: Gateway::Flutterwave,
            reference: data.tx_ref,
            status: status_from(&data.status),
            amount: Money::new(data.amount.round_dp(2), data.currency),
        })
    }

    /// Check the `verif-hash` header and parse the event.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` without a webhook hash, `Signature` on a
    /// mismatch, and `Parse` for malformed bodies.
    pub fn verify_webhook(&self, body: &[u8], hash: &str) -> Result<WebhookEvent, GatewayError> {
        let expected = self
            .webhook_hash
            .as_ref()
            .ok_or(GatewayError::NotConfigured(Gateway::Flutterwave))?;

        if !constant_time_compare(expected.expose_secret().as_bytes(), hash.trim().as_bytes()) {
            return Err(GatewayError::Signature(
                "Flutterwave verif-hash mismatch".to_string(),
            ));
        }

        serde_json::from_slice(body).map_err(|e| GatewayError::Parse(e.to_string()))
    }
}

fn status_from(status: &str) -> PaymentStatus {
    match status {
        "successful" => PaymentStatus::Succeeded,
        "failed" => PaymentStatus::Failed,
        "cancelled" => PaymentStatus::Abandoned,
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
                gateway: Gateway::Flutterwave,
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            }
        }
    })?;

    if !status.is_success() || envelope.status != "success" {
        return Err(GatewayError::Api {
            gateway: Gateway::Flutterwave,
            status: status.as_u16(),
            message: envelope.message,
        });
    }

    envelope
        .data
        .ok_or_else(|| GatewayError::Parse("Flutterwave response has no data".to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use agora_core::payments::{PaymentMethod, PaymentPurpose, PaymentReference};
    use axum::routing::{get, post};
    use axum::{Json, Router};

    fn client() -> FlutterwaveClient {
        FlutterwaveClient::new(
            &SecretString::from("FLWSECK_TEST-flutterwave"),
            Some(SecretString::from("flw-hash")),
        )
        .unwrap()
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    #[test]
    fn test_webhook_hash() {
        let body = br#"{"event":"charge.completed","data":{"tx_ref":"AGR-WLT-abc","status":"successful"}}"#;
        let event = client().verify_webhook(body, "flw-hash").unwrap();
        assert_eq!(event.data.tx_ref, "AGR-WLT-abc");
        assert_eq!(event.data.status, "successful");

        assert!(matches!(
            client().verify_webhook(body, "wrong"),
            Err(GatewayError::Signature(_))
        ));
    }

    #[test]
    fn test_webhook_without_hash_is_not_configured() {
        let client = FlutterwaveClient::new(&SecretString::from("FLWSECK_TEST-x"), None).unwrap();
        assert!(matches!(
            client.verify_webhook(b"{}", "anything"),
            Err(GatewayError::NotConfigured(Gateway::Flutterwave))
        ));
    }

    #[tokio::test]
    async fn test_verify_by_reference() {
        let router = Router::new().route(
            "/transactions/verify_by_reference",
            get(
                |axum::extract::Query(q): axum::extract::Query<
                    std::collections::HashMap<String, String>,
                >| async move {
                    Json(serde_json::json!({
                        "status": "success",
                        "message": "Transaction fetched successfully",
                        "data": {
                            "status": "successful",
                            "tx_ref": q.get("tx_ref").cloned().unwrap_or_default(),
                            "amount": 150.5,
                            "currency": "KES"
                        }
                    }))
                },
            ),
        );
        let base = serve(router).await;

        let verified = client()
            .with_base_url(&base)
            .verify_by_reference("AGR-ORD-abc")
            .await
            .unwrap();
        assert_eq!(verified.gateway, Gateway::Flutterwave);
        assert_eq!(verified.reference, "AGR-ORD-abc");
        assert_eq!(verified.status, PaymentStatus::Succeeded);
        assert_eq!(verified.amount, Money::parse("150.50", Currency::KES).unwrap());
    }

    #[tokio::test]
    async fn test_create_payment_returns_link() {
        let router = Router::new().route(
            "/payments",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["amount"], "75.00");
                assert_eq!(body["payment_options"], "googlepay");
                Json(serde_json::json!({
                    "status": "success",
                    "message": "Hosted Link",
                    "data": { "link": "https://checkout.flutterwave.com/v3/hosted/pay/abc" }
                }))
            }),
        );
        let base = serve(router).await;

        let reference = PaymentReference::generate(PaymentPurpose::WalletFunding);
        let request = CheckoutRequest {
            reference: &reference,
            email: "ada@example.com",
            name: "Ada",
            amount: Money::parse("75", Currency::USD).unwrap(),
            method: PaymentMethod::GooglePay,
            callback_url: "http://localhost:3000/wallet/callback",
        };
        let link = client()
            .with_base_url(&base)
            .create_payment(&request)
            .await
            .unwrap();
        assert!(link.starts_with("https://checkout.flutterwave.com/"));
    }
}

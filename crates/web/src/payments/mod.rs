//! Payment gateway clients.
//!
//! Both gateways follow the same flow: start a hosted checkout for a
//! [`PaymentReference`], redirect the buyer, then confirm the outcome by
//! asking the gateway about the reference (on the return redirect and on
//! the signed webhook). Nothing from the redirect's query string is trusted.

pub mod flutterwave;
pub mod paystack;

pub use flutterwave::FlutterwaveClient;
pub use paystack::PaystackClient;

use agora_core::payments::{Gateway, PaymentMethod, PaymentReference};
use agora_core::{Money, MoneyError, PaymentStatus};
use thiserror::Error;

use crate::config::GatewayConfig;

/// Errors from payment gateways.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway returned an error response.
    #[error("{gateway} API error: {status} - {message}")]
    Api {
        gateway: Gateway,
        status: u16,
        message: String,
    },

    /// Failed to parse a response or webhook body.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Webhook signature or hash did not match.
    #[error("Invalid signature: {0}")]
    Signature(String),

    /// Verified payment does not match what was charged.
    #[error("Payment mismatch: {0}")]
    Mismatch(String),

    /// No credentials for this gateway.
    #[error("{0} is not configured")]
    NotConfigured(Gateway),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// What a gateway reports about a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub gateway: Gateway,
    pub reference: String,
    pub status: PaymentStatus,
    pub amount: Money,
}

impl VerifiedPayment {
    /// Check a successful payment for exactly `expected`.
    ///
    /// # Errors
    ///
    /// Returns `Mismatch` for a different reference, an unsuccessful status,
    /// or a different amount or currency.
    pub fn ensure_matches(&self, reference: &str, expected: Money) -> Result<(), GatewayError> {
        if self.reference != reference {
            return Err(GatewayError::Mismatch(format!(
                "reference {} does not match {reference}",
                self.reference
            )));
        }
        if self.status != PaymentStatus::Succeeded {
            return Err(GatewayError::Mismatch(format!(
                "payment {reference} is {}",
                self.status
            )));
        }
        if self.amount != expected {
            return Err(GatewayError::Mismatch(format!(
                "paid {} but {expected} was due",
                self.amount
            )));
        }
        Ok(())
    }
}

/// A hosted checkout to start.
#[derive(Debug)]
pub struct CheckoutRequest<'a> {
    pub reference: &'a PaymentReference,
    pub email: &'a str,
    pub name: &'a str,
    pub amount: Money,
    pub method: PaymentMethod,
    /// Where the gateway sends the buyer afterwards.
    pub callback_url: &'a str,
}

/// The configured gateways.
#[derive(Clone, Default)]
pub struct Gateways {
    paystack: Option<PaystackClient>,
    flutterwave: Option<FlutterwaveClient>,
}

impl Gateways {
    /// Build clients for every gateway with credentials.
    ///
    /// # Errors
    ///
    /// Returns error if a client fails to build.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let paystack = config
            .paystack_secret_key
            .clone()
            .map(PaystackClient::new)
            .transpose()?;
        let flutterwave = config
            .flutterwave_secret_key
            .as_ref()
            .map(|key| FlutterwaveClient::new(key, config.flutterwave_webhook_hash.clone()))
            .transpose()?;
        Ok(Self::from_clients(paystack, flutterwave))
    }

    #[must_use]
    pub const fn from_clients(
        paystack: Option<PaystackClient>,
        flutterwave: Option<FlutterwaveClient>,
    ) -> Self {
        Self {
            paystack,
            flutterwave,
        }
    }

    /// Gateways that can take payments, for routing.
    #[must_use]
    pub fn available(&self) -> Vec<Gateway> {
        let mut gateways = Vec::with_capacity(2);
        if self.paystack.is_some() {
            gateways.push(Gateway::Paystack);
        }
        if self.flutterwave.is_some() {
            gateways.push(Gateway::Flutterwave);
        }
        gateways
    }

    /// # Errors
    ///
    /// Returns `NotConfigured` without Paystack credentials.
    pub fn paystack(&self) -> Result<&PaystackClient, GatewayError> {
        self.paystack
            .as_ref()
            .ok_or(GatewayError::NotConfigured(Gateway::Paystack))
    }

    /// # Errors
    ///
    /// Returns `NotConfigured` without Flutterwave credentials.
    pub fn flutterwave(&self) -> Result<&FlutterwaveClient, GatewayError> {
        self.flutterwave
            .as_ref()
            .ok_or(GatewayError::NotConfigured(Gateway::Flutterwave))
    }

    /// Start a hosted checkout and return the URL to send the buyer to.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` or the gateway's error.
    pub async fn start_checkout(
        &self,
        gateway: Gateway,
        request: &CheckoutRequest<'_>,
    ) -> Result<String, GatewayError> {
        match gateway {
            Gateway::Paystack => self.paystack()?.initialize(request).await,
            Gateway::Flutterwave => self.flutterwave()?.create_payment(request).await,
        }
    }

    /// Ask a gateway what happened to a reference.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` or the gateway's error.
    pub async fn verify(
        &self,
        gateway: Gateway,
        reference: &str,
    ) -> Result<VerifiedPayment, GatewayError> {
        match gateway {
            Gateway::Paystack => self.paystack()?.verify(reference).await,
            Gateway::Flutterwave => self.flutterwave()?.verify_by_reference(reference).await,
        }
    }
}

/// Constant-time comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

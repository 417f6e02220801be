//! Payment method routing and payment references.
//!
//! Buyers pick a method (wallet, card, bank transfer, Apple Pay, Google Pay);
//! the router turns that into either an internal wallet debit or a hosted
//! checkout on one of the configured gateways.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::Currency;

/// Errors from routing a payment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("{method} is not available for {currency} payments")]
    Unsupported {
        method: PaymentMethod,
        currency: Currency,
    },
    #[error("no payment gateway is configured")]
    NoGateway,
}

/// How the buyer chose to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Wallet,
    Card,
    BankTransfer,
    ApplePay,
    GooglePay,
}

impl PaymentMethod {
    pub const ALL: [Self; 5] = [
        Self::Wallet,
        Self::Card,
        Self::BankTransfer,
        Self::ApplePay,
        Self::GooglePay,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Card => "card",
            Self::BankTransfer => "bank_transfer",
            Self::ApplePay => "apple_pay",
            Self::GooglePay => "google_pay",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Wallet => "Agora wallet",
            Self::Card => "Debit/credit card",
            Self::BankTransfer => "Bank transfer",
            Self::ApplePay => "Apple Pay",
            Self::GooglePay => "Google Pay",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown payment method: {s}"))
    }
}

/// External payment processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    Paystack,
    Flutterwave,
}

impl Gateway {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paystack => "paystack",
            Self::Flutterwave => "flutterwave",
        }
    }

    #[must_use]
    pub const fn supports_currency(self, currency: Currency) -> bool {
        // Both processors settle in every marketplace currency today.
        matches!(
            currency,
            Currency::NGN | Currency::GHS | Currency::KES | Currency::ZAR | Currency::USD
        )
    }

    #[must_use]
    pub const fn supports_method(self, method: PaymentMethod) -> bool {
        match self {
            Self::Paystack => matches!(
                method,
                PaymentMethod::Card | PaymentMethod::BankTransfer | PaymentMethod::ApplePay
            ),
            Self::Flutterwave => matches!(
                method,
                PaymentMethod::Card
                    | PaymentMethod::BankTransfer
                    | PaymentMethod::ApplePay
                    | PaymentMethod::GooglePay
            ),
        }
    }

    /// Gateway-specific channel name for a method, passed to hosted checkout.
    #[must_use]
    pub const fn channel(self, method: PaymentMethod) -> &'static str {
        match (self, method) {
            (Self::Paystack, PaymentMethod::BankTransfer) => "bank_transfer",
            (Self::Paystack, PaymentMethod::ApplePay) => "apple_pay",
            (Self::Flutterwave, PaymentMethod::BankTransfer) => "banktransfer",
            (Self::Flutterwave, PaymentMethod::ApplePay) => "applepay",
            (Self::Flutterwave, PaymentMethod::GooglePay) => "googlepay",
            _ => "card",
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gateway {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paystack" => Ok(Self::Paystack),
            "flutterwave" => Ok(Self::Flutterwave),
            _ => Err(format!("unknown gateway: {s}")),
        }
    }
}

/// Where a payment is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Wallet,
    Gateway(Gateway),
}

/// Gateways in the order they should be tried for a method and currency.
fn preference(method: PaymentMethod, currency: Currency) -> [Gateway; 2] {
    match (method, currency) {
        (PaymentMethod::GooglePay, _) => [Gateway::Flutterwave, Gateway::Paystack],
        (PaymentMethod::ApplePay, _) | (_, Currency::NGN | Currency::GHS) => {
            [Gateway::Paystack, Gateway::Flutterwave]
        }
        _ => [Gateway::Flutterwave, Gateway::Paystack],
    }
}

/// Pick where a payment should go.
///
/// `available` lists the gateways that have credentials configured.
///
/// # Errors
///
/// Returns `NoGateway` when nothing is configured and `Unsupported` when no
/// configured gateway can take this method in this currency.
pub fn route(
    method: PaymentMethod,
    currency: Currency,
    available: &[Gateway],
) -> Result<Route, RoutingError> {
    if method == PaymentMethod::Wallet {
        return Ok(Route::Wallet);
    }
    if available.is_empty() {
        return Err(RoutingError::NoGateway);
    }

    preference(method, currency)
        .into_iter()
        .find(|g| {
            available.contains(g) && g.supports_method(method) && g.supports_currency(currency)
        })
        .map(Route::Gateway)
        .ok_or(RoutingError::Unsupported { method, currency })
}

/// What a payment reference pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPurpose {
    /// Checkout of an order.
    Order,
    /// Topping up a wallet.
    WalletFunding,
}

impl PaymentPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::WalletFunding => "wallet_funding",
        }
    }

    const fn tag(self) -> &'static str {
        match self {
            Self::Order => "ORD",
            Self::WalletFunding => "WLT",
        }
    }
}

/// Reference sent to a gateway and echoed back on callback and webhook.
///
/// Format: `AGR-<ORD|WLT>-<32 hex chars>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentReference {
    purpose: PaymentPurpose,
    id: Uuid,
}

impl PaymentReference {
    #[must_use]
    pub fn generate(purpose: PaymentPurpose) -> Self {
        Self {
            purpose,
            id: Uuid::new_v4(),
        }
    }

    #[must_use]
    pub const fn purpose(&self) -> PaymentPurpose {
        self.purpose
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AGR-{}-{}", self.purpose.tag(), self.id.simple())
    }
}

impl FromStr for PaymentReference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid payment reference: {s}");
        let rest = s.strip_prefix("AGR-").ok_or_else(invalid)?;
        let (tag, id) = rest.split_once('-').ok_or_else(invalid)?;
        let purpose = match tag {
            "ORD" => PaymentPurpose::Order,
            "WLT" => PaymentPurpose::WalletFunding,
            _ => return Err(invalid()),
        };
        if id.len() != 32 {
            return Err(invalid());
        }
        let id = Uuid::try_parse(id).map_err(|_| invalid())?;
        Ok(Self { purpose, id })
    }
}

impl TryFrom<String> for PaymentReference {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PaymentReference> for String {
    fn from(value: PaymentReference) -> Self {
        value.to_string()
    }
}

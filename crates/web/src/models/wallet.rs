//! Wallets, ledger transactions and gateway payments.

use agora_core::payments::{Gateway, PaymentMethod, PaymentPurpose};
use agora_core::{
    Currency, Money, OrderId, PaymentStatus, TransactionId, TransactionKind, TransactionStatus,
    UserId, WalletId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A row in `wallets`. One wallet per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Decimal,
    pub currency: Currency,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    #[must_use]
    pub const fn balance(&self) -> Money {
        Money::new(self.balance, self.currency)
    }
}

/// A row in `transactions`. Rows are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub kind: TransactionKind,
    #[serde(default)]
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: Currency,
    /// Balance right after this movement.
    pub balance_after: Decimal,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub counterparty_id: Option<UserId>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    #[must_use]
    pub const fn amount(&self) -> Money {
        Money::new(self.amount, self.currency)
    }

    /// `+` for credits, `-` for debits.
    #[must_use]
    pub const fn sign(&self) -> &'static str {
        match self.kind.direction() {
            agora_core::Direction::Credit => "+",
            agora_core::Direction::Debit => "-",
        }
    }
}

/// A row in `payments`: one hosted-checkout attempt at a gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub reference: String,
    pub user_id: UserId,
    pub purpose: PaymentPurpose,
    pub gateway: Gateway,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    #[serde(default)]
    pub order_ids: Vec<OrderId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
    /// Set once the orders are paid or the wallet credited. A succeeded
    /// payment without it is finished by the next settlement attempt.
    #[serde(default)]
    pub fulfilled_at: Option<DateTime<Utc>>,
}

impl Payment {
    #[must_use]
    pub const fn amount(&self) -> Money {
        Money::new(self.amount, self.currency)
    }

    #[must_use]
    pub const fn is_fulfilled(&self) -> bool {
        self.fulfilled_at.is_some()
    }
}

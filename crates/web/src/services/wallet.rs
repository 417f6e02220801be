//! Wallet page: balance, funding, withdrawals and transfers.

use agora_core::payments::{self, PaymentMethod, PaymentPurpose, PaymentReference, Route};
use agora_core::validation::{self, MAX_NAME_LENGTH};
use agora_core::wallet::{self, LedgerError};
use agora_core::{Money, TransactionKind, TransactionStatus, UserId};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::backend::{BackendError, LedgerEntry};
use crate::error::{AppError, Result};
use crate::models::{CurrentUser, Order, Payment, Transaction, Wallet};
use crate::payments::CheckoutRequest;
use crate::state::AppState;

/// Movements listed on the wallet page.
const RECENT_TRANSACTIONS: usize = 50;

/// Balance plus recent movements.
#[derive(Debug, Clone)]
pub struct WalletOverview {
    pub wallet: Wallet,
    pub transactions: Vec<Transaction>,
}

/// Where a withdrawal is paid out to.
#[derive(Debug)]
pub struct Payout<'a> {
    pub bank_name: &'a str,
    pub account_number: &'a str,
}

impl Payout<'_> {
    fn describe(&self) -> Result<String> {
        let bank = validation::required("bank name", self.bank_name, MAX_NAME_LENGTH)?;
        let account = self.account_number.trim();
        if !(6..=20).contains(&account.len()) || !account.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::BadRequest(
                "Account number must be 6 to 20 digits".to_string(),
            ));
        }
        let tail: String = account.chars().skip(account.len() - 4).collect();
        Ok(format!("Withdrawal to {bank} ****{tail}"))
    }
}

/// Wallet service.
pub struct WalletService<'a> {
    state: &'a AppState,
}

impl<'a> WalletService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    fn parse_amount(&self, raw: &str) -> Result<Money> {
        let amount = Money::parse(raw, self.state.config().currency)?;
        if !amount.is_positive() {
            return Err(LedgerError::NonPositive.into());
        }
        Ok(amount)
    }

    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn overview(&self, user: UserId) -> Result<WalletOverview> {
        let backend = self.state.backend();
        let wallet = backend
            .ensure_wallet(user, self.state.config().currency)
            .await?;
        let transactions = backend
            .transactions_for(wallet.id, RECENT_TRANSACTIONS)
            .await?;
        Ok(WalletOverview {
            wallet,
            transactions,
        })
    }

    /// Start a gateway payment that tops up the wallet.
    ///
    /// Returns the hosted checkout URL. The deposit is credited when the
    /// payment is settled.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for the wallet method, `Routing` if no gateway
    /// takes the method, and `Gateway` errors from the provider.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn fund(&self, user: &CurrentUser, amount: &str, method: PaymentMethod) -> Result<String> {
        let amount = self.parse_amount(amount)?;
        let gateway = match payments::route(method, amount.currency, &self.state.gateways().available())? {
            Route::Gateway(gateway) => gateway,
            Route::Wallet => {
                return Err(AppError::BadRequest(
                    "Choose a card, bank transfer or mobile wallet to add funds".to_string(),
                ));
            }
        };

        let reference = PaymentReference::generate(PaymentPurpose::WalletFunding);
        let backend = self.state.backend();
        backend
            .insert_payment(&reference, user.id, gateway, method, amount, &[])
            .await?;

        let callback_url = self.state.config().absolute_url("/wallet/callback");
        let request = CheckoutRequest {
            reference: &reference,
            email: user.email.as_str(),
            name: &user.username,
            amount,
            method,
            callback_url: &callback_url,
        };
        match self.state.gateways().start_checkout(gateway, &request).await {
            Ok(url) => Ok(url),
            Err(e) => {
                backend.fail_payment(&reference.to_string()).await?;
                Err(e.into())
            }
        }
    }

    /// Credit a settled funding payment.
    ///
    /// Keyed by the payment reference, so a repeated settlement credits once.
    /// Returns `None` when the deposit was already recorded.
    ///
    /// # Errors
    ///
    /// Returns error if the wallet cannot be updated.
    #[instrument(skip(self, payment), fields(reference = %payment.reference))]
    pub async fn deposit(&self, payment: &Payment) -> Result<Option<Transaction>> {
        let backend = self.state.backend();
        if backend
            .transaction_exists(&payment.reference, TransactionKind::Deposit)
            .await?
        {
            return Ok(None);
        }

        let amount = payment.amount();
        let description = format!("Wallet top-up via {}", payment.gateway);
        let entry = LedgerEntry {
            kind: TransactionKind::Deposit,
            amount,
            status: TransactionStatus::Completed,
            reference: Some(&payment.reference),
            counterparty: None,
            description: &description,
        };
        let (_, transaction) = backend
            .apply_to_wallet(payment.user_id, entry, |balance| {
                wallet::apply(balance, TransactionKind::Deposit, amount).map_err(AppError::from)
            })
            .await?;
        info!(amount = %amount, "Wallet funded");
        Ok(Some(transaction))
    }

    /// Return a refunded order's total to the buyer's wallet.
    ///
    /// Keyed by order, so refunding the same order twice credits once.
    ///
    /// # Errors
    ///
    /// Returns error if the wallet cannot be updated.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn refund_order(&self, order: &Order) -> Result<Option<Transaction>> {
        let backend = self.state.backend();
        let reference = format!("RFD-{}", order.id.as_uuid().simple());
        if backend
            .transaction_exists(&reference, TransactionKind::Refund)
            .await?
        {
            return Ok(None);
        }

        let amount = order.total();
        let description = format!("Refund, order #{}", order.number());
        let entry = LedgerEntry {
            kind: TransactionKind::Refund,
            amount,
            status: TransactionStatus::Completed,
            reference: Some(&reference),
            counterparty: None,
            description: &description,
        };
        let (_, transaction) = backend
            .apply_to_wallet(order.buyer_id, entry, |balance| {
                wallet::apply(balance, TransactionKind::Refund, amount).map_err(AppError::from)
            })
            .await?;
        info!(reference = %reference, amount = %amount, "Order refunded to wallet");
        Ok(Some(transaction))
    }

    /// Request a payout. The balance is debited now; the withdrawal stays
    /// pending until an operator pays it out.
    ///
    /// # Errors
    ///
    /// Returns `Ledger` errors below the minimum or above the balance.
    #[instrument(skip(self, payout))]
    pub async fn withdraw(&self, user: UserId, amount: &str, payout: &Payout<'_>) -> Result<Transaction> {
        let amount = self.parse_amount(amount)?;
        let description = payout.describe()?;
        let reference = format!("WDR-{}", Uuid::new_v4().simple());

        let entry = LedgerEntry {
            kind: TransactionKind::Withdrawal,
            amount,
            status: TransactionStatus::Pending,
            reference: Some(&reference),
            counterparty: None,
            description: &description,
        };
        let (_, transaction) = self
            .state
            .backend()
            .apply_to_wallet(user, entry, |balance| {
                wallet::check_withdrawal(balance, amount).map_err(AppError::from)
            })
            .await?;
        info!(user_id = %user, amount = %amount, "Withdrawal requested");
        Ok(transaction)
    }

    /// Move money to another user's wallet.
    ///
    /// The sender is debited first; if the recipient cannot be credited the
    /// debit is reversed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown usernames and `Ledger` errors for
    /// self-transfers and insufficient funds.
    #[instrument(skip(self, sender), fields(sender = %sender.id))]
    pub async fn transfer(&self, sender: &CurrentUser, recipient: &str, amount: &str) -> Result<Transaction> {
        let amount = self.parse_amount(amount)?;
        let backend = self.state.backend();

        let handle = recipient.trim().trim_start_matches('@').to_ascii_lowercase();
        let recipient = backend
            .profile_by_username(&handle)
            .await
            .map_err(|e| match e {
                BackendError::NotFound(_) => AppError::NotFound(format!("user @{handle}")),
                other => other.into(),
            })?;
        if recipient.is_banned() {
            return Err(AppError::NotFound(format!("user @{handle}")));
        }

        // Up-front check with current balances; each side is re-checked when applied
        let sender_wallet = backend.ensure_wallet(sender.id, amount.currency).await?;
        let recipient_wallet = backend.ensure_wallet(recipient.id, amount.currency).await?;
        wallet::transfer(
            sender.id,
            sender_wallet.balance(),
            recipient.id,
            recipient_wallet.balance(),
            amount,
        )?;

        let reference = format!("TRF-{}", Uuid::new_v4().simple());
        let out_description = format!("Transfer to @{}", recipient.username);
        let (_, sent) = backend
            .apply_to_wallet(
                sender.id,
                LedgerEntry {
                    kind: TransactionKind::TransferOut,
                    amount,
                    status: TransactionStatus::Completed,
                    reference: Some(&reference),
                    counterparty: Some(recipient.id),
                    description: &out_description,
                },
                |balance| {
                    wallet::apply(balance, TransactionKind::TransferOut, amount)
                        .map_err(AppError::from)
                },
            )
            .await?;

        let in_description = format!("Transfer from @{}", sender.username);
        let received = backend
            .apply_to_wallet(
                recipient.id,
                LedgerEntry {
                    kind: TransactionKind::TransferIn,
                    amount,
                    status: TransactionStatus::Completed,
                    reference: Some(&reference),
                    counterparty: Some(sender.id),
                    description: &in_description,
                },
                |balance| {
                    wallet::apply(balance, TransactionKind::TransferIn, amount)
                        .map_err(AppError::from)
                },
            )
            .await;

        if let Err(e) = received {
            error!(error = %e, reference = %reference, "Transfer credit failed, reversing debit");
            let reversal = format!("Reversal: transfer to @{}", recipient.username);
            backend
                .apply_to_wallet(
                    sender.id,
                    LedgerEntry {
                        kind: TransactionKind::Refund,
                        amount,
                        status: TransactionStatus::Completed,
                        reference: Some(&reference),
                        counterparty: Some(recipient.id),
                        description: &reversal,
                    },
                    |balance| {
                        wallet::apply(balance, TransactionKind::Refund, amount)
                            .map_err(AppError::from)
                    },
                )
                .await?;
            return Err(e);
        }

        info!(reference = %reference, amount = %amount, "Transfer completed");
        Ok(sent)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::config::tests::test_config;
    use crate::payments::Gateways;
    use agora_core::shipping::ShippingAddress;
    use agora_core::{Email, OrderId, StoreId, UserRole};
    use axum::http::Method;
    use rust_decimal::Decimal;
    use serde_json::json;

    async fn state_on(fake: &FakeBackend) -> AppState {
        AppState::from_parts(
            test_config(),
            fake.start().await,
            Gateways::from_clients(None, None),
        )
    }

    fn balance(fake: &FakeBackend, user: UserId) -> Decimal {
        fake.rows_where("wallets", "user_id", &user.to_string())
            .first()
            .map_or(Decimal::ZERO, |w| w["balance"].as_str().unwrap().parse().unwrap())
    }

    fn kinds(fake: &FakeBackend) -> Vec<String> {
        fake.rows("transactions")
            .iter()
            .map(|t| t["kind"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_payout_masks_account_number() {
        let payout = Payout {
            bank_name: " GTBank ",
            account_number: "0123456789",
        };
        assert_eq!(
            payout.describe().ok().as_deref(),
            Some("Withdrawal to GTBank ****6789")
        );
    }

    #[test]
    fn test_payout_rejects_bad_account() {
        for account in ["12345", "01234abcd9", ""] {
            let payout = Payout {
                bank_name: "GTBank",
                account_number: account,
            };
            assert!(matches!(payout.describe(), Err(AppError::BadRequest(_))));
        }
        let payout = Payout {
            bank_name: "  ",
            account_number: "0123456789",
        };
        assert!(matches!(payout.describe(), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_refunding_an_order_twice_credits_once() {
        let fake = FakeBackend::new();
        let state = state_on(&fake).await;
        let buyer = UserId::generate();
        let order: Order = serde_json::from_value(json!({
            "id": OrderId::generate(), "buyer_id": buyer, "store_id": StoreId::generate(),
            "status": "refunded", "currency": "NGN",
            "subtotal": "3000", "shipping_fee": "1200", "total": "4200",
            "shipping_address": ShippingAddress::default(), "payment_method": "wallet",
            "created_at": "2026-03-01T12:00:00Z"
        }))
        .unwrap();

        let wallets = WalletService::new(&state);
        assert!(wallets.refund_order(&order).await.unwrap().is_some());
        assert!(wallets.refund_order(&order).await.unwrap().is_none());

        assert_eq!(kinds(&fake), ["refund"]);
        assert_eq!(balance(&fake, buyer), Decimal::from(4_200));
    }

    #[tokio::test]
    async fn test_transfer_reverses_debit_when_recipient_credit_fails() {
        let fake = FakeBackend::new();
        let sender = CurrentUser {
            id: UserId::generate(),
            email: Email::parse("ada@example.com").unwrap(),
            username: "ada".to_string(),
            role: UserRole::Member,
            access_token: "sender-jwt".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: i64::MAX,
        };
        let recipient = UserId::generate();
        fake.seed("profiles", [json!({ "id": recipient, "username": "bola" })]);
        fake.seed(
            "wallets",
            [json!({ "user_id": sender.id, "balance": "1000", "currency": "NGN" })],
        );
        // Sender debit goes through; the recipient's balance write fails
        fake.fail_after(Method::PATCH, "wallets", 1, 1);
        let state = state_on(&fake).await;

        let result = WalletService::new(&state)
            .transfer(&sender, "@Bola", "250")
            .await;

        assert!(result.is_err());
        assert_eq!(balance(&fake, sender.id), Decimal::from(1_000));
        assert_eq!(balance(&fake, recipient), Decimal::ZERO);
        assert_eq!(kinds(&fake), ["transfer_out", "refund"]);
    }
}

//! `wallets` and `transactions` tables.
//!
//! Balances change only through [`BackendClient::apply_to_wallet`], which
//! writes the new balance with a compare-and-swap on the old one:
//!
//! ```text
//! PATCH /rest/v1/wallets?id=eq.<id>&balance=eq.<old>   {"balance": <new>}
//! ```
//!
//! An empty result means another request moved the balance first; the
//! wallet is re-read and the movement recomputed, up to three times.

use agora_core::{
    Currency, Money, TransactionKind, TransactionStatus, UserId, WalletId,
};
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::{Access, BackendClient, BackendError, Query};
use crate::models::{Transaction, Wallet};

/// Attempts at a compare-and-swap balance update before giving up.
const BALANCE_UPDATE_ATTEMPTS: usize = 3;

/// One movement to record against a wallet.
#[derive(Debug, Clone, Copy)]
pub struct LedgerEntry<'a> {
    pub kind: TransactionKind,
    pub amount: Money,
    pub status: TransactionStatus,
    pub reference: Option<&'a str>,
    pub counterparty: Option<UserId>,
    pub description: &'a str,
}

impl BackendClient {
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn wallet_for(&self, user: UserId) -> Result<Option<Wallet>, BackendError> {
        self.select_optional(&Query::table("wallets").eq("user_id", user), Access::Service)
            .await
    }

    /// A user's wallet, opened with a zero balance on first use.
    ///
    /// # Errors
    ///
    /// Returns error if the wallet can neither be read nor created.
    #[instrument(skip(self))]
    pub async fn ensure_wallet(
        &self,
        user: UserId,
        currency: Currency,
    ) -> Result<Wallet, BackendError> {
        if let Some(wallet) = self.wallet_for(user).await? {
            return Ok(wallet);
        }

        let created = self
            .insert_one::<_, Wallet>(
                "wallets",
                &json!({ "user_id": user, "balance": "0", "currency": currency }),
                Access::Service,
            )
            .await;
        match created {
            Ok(wallet) => Ok(wallet),
            // Opened concurrently by another request
            Err(BackendError::Conflict(_)) => self
                .wallet_for(user)
                .await?
                .ok_or_else(|| BackendError::NotFound("wallets".to_string())),
            Err(e) => Err(e),
        }
    }

    /// Apply a movement to a user's wallet and record it.
    ///
    /// `next_balance` computes the new balance from the current one and may
    /// reject the movement (e.g. insufficient funds); it is called again
    /// after every lost race.
    ///
    /// # Errors
    ///
    /// Returns whatever `next_balance` rejects with, or a `Conflict` once
    /// the retries are used up.
    #[instrument(skip(self, next_balance), fields(kind = %entry.kind, amount = %entry.amount))]
    pub async fn apply_to_wallet<E, F>(
        &self,
        user: UserId,
        entry: LedgerEntry<'_>,
        next_balance: F,
    ) -> Result<(Wallet, Transaction), E>
    where
        F: Fn(Money) -> Result<Money, E>,
        E: From<BackendError>,
    {
        let mut wallet = self.ensure_wallet(user, entry.amount.currency).await?;

        for attempt in 1..=BALANCE_UPDATE_ATTEMPTS {
            let next = next_balance(wallet.balance())?;

            if let Some(updated) = self
                .compare_and_set_balance(wallet.id, wallet.balance, next)
                .await?
            {
                let transaction = self.record_transaction(&updated, &entry).await?;
                return Ok((updated, transaction));
            }

            debug!(attempt, "Wallet balance changed underneath us, re-reading");
            wallet = self
                .wallet_for(user)
                .await?
                .ok_or_else(|| BackendError::NotFound("wallets".to_string()))?;
        }

        warn!(user_id = %user, "Gave up on wallet update after repeated conflicts");
        Err(BackendError::Conflict("wallet is busy, please try again".to_string()).into())
    }

    async fn compare_and_set_balance(
        &self,
        wallet: WalletId,
        expected: rust_decimal::Decimal,
        next: Money,
    ) -> Result<Option<Wallet>, BackendError> {
        let query = Query::table("wallets")
            .eq("id", wallet)
            .eq("balance", expected);
        let rows: Vec<Wallet> = self
            .update(
                &query,
                &json!({ "balance": next.amount.to_string(), "updated_at": chrono::Utc::now() }),
                Access::Service,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn record_transaction(
        &self,
        wallet: &Wallet,
        entry: &LedgerEntry<'_>,
    ) -> Result<Transaction, BackendError> {
        self.insert_one(
            "transactions",
            &json!({
                "wallet_id": wallet.id,
                "kind": entry.kind,
                "status": entry.status,
                "amount": entry.amount.amount.to_string(),
                "currency": entry.amount.currency,
                "balance_after": wallet.balance.to_string(),
                "reference": entry.reference,
                "counterparty_id": entry.counterparty,
                "description": entry.description,
            }),
            Access::Service,
        )
        .await
    }

    /// Recent movements on a wallet, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn transactions_for(
        &self,
        wallet: WalletId,
        limit: usize,
    ) -> Result<Vec<Transaction>, BackendError> {
        let query = Query::table("transactions")
            .eq("wallet_id", wallet)
            .order("created_at", false)
            .limit(limit);
        self.select(&query, Access::Service).await
    }

    /// Whether a movement with this reference and kind was already recorded.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn transaction_exists(
        &self,
        reference: &str,
        kind: TransactionKind,
    ) -> Result<bool, BackendError> {
        let query = Query::table("transactions")
            .select("id")
            .eq("reference", reference)
            .eq("kind", kind);
        Ok(self.count(&query, Access::Service).await? > 0)
    }

    /// Every movement, newest first, for the admin panel.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn list_transactions(
        &self,
        kind: Option<TransactionKind>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Transaction>, BackendError> {
        let mut query = Query::table("transactions")
            .order("created_at", false)
            .offset(offset)
            .limit(limit);
        if let Some(kind) = kind {
            query = query.eq("kind", kind);
        }
        self.select(&query, Access::Service).await
    }
}

//! Wallet ledger rules.
//!
//! The backend stores a balance per wallet and an append-only list of
//! transactions. These functions compute the next balance for a movement;
//! persisting it (with a compare-and-swap on the old balance) is the web
//! crate's job.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{Direction, Money, MoneyError, TransactionKind, UserId};

/// Smallest withdrawal accepted, in major units.
pub const MIN_WITHDRAWAL: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);

/// Errors from ledger movements.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("amount must be greater than zero")]
    NonPositive,
    #[error("insufficient funds: balance {balance}, needed {needed}")]
    InsufficientFunds { balance: Money, needed: Money },
    #[error("minimum withdrawal is {0}")]
    BelowMinimum(Money),
    #[error("cannot transfer to yourself")]
    SelfTransfer,
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Balance after applying a movement of `kind` for `amount`.
///
/// # Errors
///
/// Rejects non-positive amounts, currency mismatches, and debits that would
/// take the balance below zero.
pub fn apply(balance: Money, kind: TransactionKind, amount: Money) -> Result<Money, LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::NonPositive);
    }
    match kind.direction() {
        Direction::Credit => Ok(balance.checked_add(amount)?),
        Direction::Debit => {
            let next = balance.checked_sub(amount)?;
            if next.amount.is_sign_negative() && !next.is_zero() {
                return Err(LedgerError::InsufficientFunds {
                    balance,
                    needed: amount,
                });
            }
            Ok(next)
        }
    }
}

/// Validate a withdrawal request against the minimum and the balance.
///
/// # Errors
///
/// Returns `BelowMinimum` or `InsufficientFunds`.
pub fn check_withdrawal(balance: Money, amount: Money) -> Result<Money, LedgerError> {
    let minimum = Money::new(MIN_WITHDRAWAL, amount.currency);
    if amount.amount < MIN_WITHDRAWAL {
        return Err(LedgerError::BelowMinimum(minimum));
    }
    apply(balance, TransactionKind::Withdrawal, amount)
}

/// Balances of sender and recipient after a transfer.
///
/// # Errors
///
/// Returns `SelfTransfer`, `NonPositive` or `InsufficientFunds`.
pub fn transfer(
    sender: UserId,
    sender_balance: Money,
    recipient: UserId,
    recipient_balance: Money,
    amount: Money,
) -> Result<(Money, Money), LedgerError> {
    if sender == recipient {
        return Err(LedgerError::SelfTransfer);
    }
    let sender_after = apply(sender_balance, TransactionKind::TransferOut, amount)?;
    let recipient_after = apply(recipient_balance, TransactionKind::TransferIn, amount)?;
    Ok((sender_after, recipient_after))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Currency;

    fn ngn(amount: i64) -> Money {
        Money::new(Decimal::from(amount), Currency::NGN)
    }

    #[test]
    fn test_credit_and_debit() {
        assert_eq!(apply(ngn(100), TransactionKind::Deposit, ngn(50)), Ok(ngn(150)));
        assert_eq!(apply(ngn(100), TransactionKind::Purchase, ngn(100)), Ok(ngn(0)));
    }

    #[test]
    fn test_overdraft_rejected() {
        assert_eq!(
            apply(ngn(100), TransactionKind::Purchase, ngn(101)),
            Err(LedgerError::InsufficientFunds {
                balance: ngn(100),
                needed: ngn(101)
            })
        );
    }

    #[test]
    fn test_zero_amount_rejected() {
        assert_eq!(
            apply(ngn(100), TransactionKind::Deposit, ngn(0)),
            Err(LedgerError::NonPositive)
        );
    }

    #[test]
    fn test_currency_must_match() {
        let usd = Money::new(Decimal::ONE, Currency::USD);
        assert!(matches!(
            apply(ngn(100), TransactionKind::Deposit, usd),
            Err(LedgerError::Money(MoneyError::CurrencyMismatch { .. }))
        ));
    }

    #[test]
    fn test_withdrawal_minimum() {
        assert_eq!(
            check_withdrawal(ngn(50_000), ngn(999)),
            Err(LedgerError::BelowMinimum(ngn(1_000)))
        );
        assert_eq!(check_withdrawal(ngn(50_000), ngn(1_000)), Ok(ngn(49_000)));
        assert!(check_withdrawal(ngn(500), ngn(1_000)).is_err());
    }

    #[test]
    fn test_transfer_moves_money() {
        let alice = UserId::generate();
        let bob = UserId::generate();
        assert_eq!(
            transfer(alice, ngn(5_000), bob, ngn(10), ngn(2_000)),
            Ok((ngn(3_000), ngn(2_010)))
        );
        assert_eq!(
            transfer(alice, ngn(5_000), alice, ngn(5_000), ngn(1)),
            Err(LedgerError::SelfTransfer)
        );
    }
}

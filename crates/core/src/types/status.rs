//! Status enums for backend rows.
//!
//! Every enum serializes as the `snake_case` text stored in the managed
//! backend's columns.

use serde::{Deserialize, Serialize};

/// Implements `Display`/`FromStr` using the same spelling as serde.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// The column value for this variant.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!("invalid {}: {s}", stringify!($name))),
                }
            }
        }
    };
}

/// Account role. Sellers may open stores; admins see the admin panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Member,
    Seller,
    Admin,
}

text_enum!(UserRole {
    Member => "member",
    Seller => "seller",
    Admin => "admin",
});

impl UserRole {
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Whether an account may sign in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    Banned,
}

text_enum!(AccountStatus {
    Active => "active",
    Banned => "banned",
});

/// Order lifecycle.
///
/// ```text
/// pending ──► paid ──► shipped ──► delivered
///    │          │         │
///    ▼          ▼         ▼
/// cancelled  refunded  refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

text_enum!(OrderStatus {
    Pending => "pending",
    Paid => "paid",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

impl OrderStatus {
    /// Whether moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid | Self::Cancelled)
                | (Self::Paid, Self::Shipped | Self::Refunded)
                | (Self::Shipped, Self::Delivered | Self::Refunded)
        )
    }

    /// Transitions a store owner may perform on their own orders.
    #[must_use]
    pub const fn seller_may_set(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Paid, Self::Shipped) | (Self::Shipped, Self::Delivered)
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }
}

/// Gateway payment attempt status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
    Abandoned,
}

text_enum!(PaymentStatus {
    Pending => "pending",
    Succeeded => "succeeded",
    Failed => "failed",
    Abandoned => "abandoned",
});

/// Direction of a wallet movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

/// Wallet transaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Wallet funded through a gateway.
    Deposit,
    /// Payout requested to a bank account.
    Withdrawal,
    /// Buyer paid for an order from the wallet.
    Purchase,
    /// Seller credited for an order.
    Sale,
    /// Buyer refunded for an order.
    Refund,
    TransferIn,
    TransferOut,
}

text_enum!(TransactionKind {
    Deposit => "deposit",
    Withdrawal => "withdrawal",
    Purchase => "purchase",
    Sale => "sale",
    Refund => "refund",
    TransferIn => "transfer_in",
    TransferOut => "transfer_out",
});

impl TransactionKind {
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Deposit | Self::Sale | Self::Refund | Self::TransferIn => Direction::Credit,
            Self::Withdrawal | Self::Purchase | Self::TransferOut => Direction::Debit,
        }
    }
}

/// Wallet transaction settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Completed,
    /// Withdrawals wait for an operator to pay out.
    Pending,
    Reversed,
}

text_enum!(TransactionStatus {
    Completed => "completed",
    Pending => "pending",
    Reversed => "reversed",
});

/// Who can see and join a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupVisibility {
    #[default]
    Public,
    /// Joining requires approval by an owner or moderator.
    Private,
}

text_enum!(GroupVisibility {
    Public => "public",
    Private => "private",
});

/// A member's role inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MembershipRole {
    Owner,
    Moderator,
    #[default]
    Member,
}

text_enum!(MembershipRole {
    Owner => "owner",
    Moderator => "moderator",
    Member => "member",
});

impl MembershipRole {
    #[must_use]
    pub const fn can_moderate(self) -> bool {
        matches!(self, Self::Owner | Self::Moderator)
    }
}

/// Whether a membership has been approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Pending,
    #[default]
    Active,
}

text_enum!(MembershipStatus {
    Pending => "pending",
    Active => "active",
});

impl MembershipStatus {
    /// Status a new membership starts in for a group of this visibility.
    #[must_use]
    pub const fn on_join(visibility: GroupVisibility) -> Self {
        match visibility {
            GroupVisibility::Public => Self::Active,
            GroupVisibility::Private => Self::Pending,
        }
    }
}

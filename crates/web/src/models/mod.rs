//! Backend rows and session types.
//!
//! Row structs mirror the managed backend's tables. Embedded relations
//! (`author:profiles(...)`, `store:stores(...)`) arrive as optional nested
//! fields and default to `None` when a query does not ask for them.

pub mod cart;
pub mod group;
pub mod order;
pub mod post;
pub mod profile;
pub mod session;
pub mod store;
pub mod wallet;

pub use cart::CartItem;
pub use group::{Group, Membership};
pub use order::{NewOrder, NewOrderItem, Order, OrderItem};
pub use post::{Comment, MediaKind, Post};
pub use profile::{AuthorRef, Profile};
pub use session::{CurrentUser, Flash, FlashLevel, session_keys};
pub use store::{Product, Store, StoreRef};
pub use wallet::{Payment, Transaction, Wallet};

/// Embedded aggregate, e.g. `likes(count)` → `[{"count": 3}]`.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct CountRow {
    pub count: u64,
}

/// First count in an embedded aggregate, or zero.
#[must_use]
pub fn embedded_count(rows: &[CountRow]) -> u64 {
    rows.first().map_or(0, |r| r.count)
}

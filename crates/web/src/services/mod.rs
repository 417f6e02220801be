//! Page-level operations built on the backend and gateway clients.
//!
//! Handlers stay thin: they parse the form, call one service method and
//! turn the result into a redirect, a flash notice or a rendered page.

pub mod auth;
pub mod checkout;
pub mod feed;
pub mod media;
pub mod settlement;
pub mod wallet;

pub use auth::{AuthError, AuthService, Registered, Registration};
pub use checkout::{CheckoutOutcome, CheckoutService};
pub use feed::{FeedPage, FeedPost, FeedService};
pub use media::{MediaError, MediaService, Uploaded};
pub use settlement::{Settlement, SettlementService};
pub use wallet::{Payout, WalletOverview, WalletService};

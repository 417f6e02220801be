//! Agora Core - Shared types and business rules.
//!
//! This crate provides the types and pure rules used across Agora components:
//! - `web` - The social-commerce site (feed, groups, storefronts, wallet, admin)
//! - `cli` - Operator tooling (admin promotion, catalog seeding, shipping quotes)
//!
//! # Architecture
//!
//! The core crate contains only types and rules - no I/O, no HTTP clients.
//! Everything that talks to the managed backend or a payment gateway lives in
//! the `web` crate and calls into these modules for the arithmetic.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, emails, usernames and statuses
//! - [`cart`] - Cart line validation and totals grouped per store
//! - [`shipping`] - Address validation, shipping zones and per-store fees
//! - [`payments`] - Payment method to gateway routing and payment references
//! - [`wallet`] - Wallet ledger rules (credits, debits, withdrawals, transfers)
//! - [`validation`] - Form field length and presence rules

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod payments;
pub mod shipping;
pub mod types;
pub mod validation;
pub mod wallet;

pub use types::*;

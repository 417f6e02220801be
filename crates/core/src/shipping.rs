//! Shipping address validation and per-store shipping fees.
//!
//! Every store ships its own parcel from its own origin. The fee for a
//! parcel depends on how far the destination is from the store (the
//! [`Zone`]) and on the parcel weight:
//!
//! ```text
//! fee = base[zone] + per_kg[zone] × ceil(max(weight − included_kg, 0))
//! ```
//!
//! A parcel ships free when it has no shippable items or when the store's
//! subtotal reaches the free-shipping threshold.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::CartSummary;
use crate::types::{Currency, Money, MoneyError, StoreId};

/// Errors from quoting a shipment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShippingError {
    #[error("shipping details incomplete: {}", .0.join(", "))]
    IncompleteAddress(Vec<&'static str>),
    #[error("{0} does not ship outside its country")]
    Undeliverable(String),
    #[error("no shipping origin configured for {0}")]
    MissingOrigin(String),
    #[error("rate table is in {rates} but the cart is in {cart}")]
    CurrencyMismatch { rates: Currency, cart: Currency },
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Where a buyer wants their order delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    #[serde(default)]
    pub postal_code: Option<String>,
}

impl ShippingAddress {
    /// Names of every missing or malformed field, in form order.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.full_name.trim().is_empty() {
            missing.push("full name");
        }
        if !is_valid_phone(&self.phone) {
            missing.push("phone");
        }
        if self.line1.trim().is_empty() {
            missing.push("address");
        }
        if self.city.trim().is_empty() {
            missing.push("city");
        }
        if self.state.trim().is_empty() {
            missing.push("state");
        }
        let country = self.country.trim();
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            missing.push("country");
        }
        missing
    }

    /// # Errors
    ///
    /// Returns `IncompleteAddress` listing every field that needs attention.
    pub fn validate(&self) -> Result<(), ShippingError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ShippingError::IncompleteAddress(missing))
        }
    }

    /// Single-line rendering for order summaries.
    #[must_use]
    pub fn one_line(&self) -> String {
        let mut parts = vec![self.line1.trim()];
        if let Some(line2) = self.line2.as_deref().map(str::trim)
            && !line2.is_empty()
        {
            parts.push(line2);
        }
        parts.extend([self.city.trim(), self.state.trim()]);
        let country = self.country.trim().to_ascii_uppercase();
        format!("{}, {country}", parts.join(", "))
    }
}

/// 7-15 digits, optionally prefixed with `+`; spaces and dashes ignored.
fn is_valid_phone(phone: &str) -> bool {
    let trimmed = phone.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let mut count = 0;
    for c in digits.chars() {
        match c {
            '0'..='9' => count += 1,
            ' ' | '-' => {}
            _ => return false,
        }
    }
    (7..=15).contains(&count)
}

/// Where a store ships from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub store_name: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub ships_internationally: bool,
}

/// Distance class between a store and a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    SameCity,
    SameState,
    Domestic,
    International,
}

impl Zone {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SameCity => "Same city",
            Self::SameState => "Same state",
            Self::Domestic => "Nationwide",
            Self::International => "International",
        }
    }
}

fn same_place(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Classify a destination relative to a store's origin.
#[must_use]
pub fn zone(origin: &Origin, destination: &ShippingAddress) -> Zone {
    if !same_place(&origin.country, &destination.country) {
        Zone::International
    } else if !same_place(&origin.state, &destination.state) {
        Zone::Domestic
    } else if !same_place(&origin.city, &destination.city) {
        Zone::SameState
    } else {
        Zone::SameCity
    }
}

/// Base and per-kilogram prices for one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRate {
    pub base: Decimal,
    pub per_kg: Decimal,
}

/// Shipping prices, in major units of `currency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    pub currency: Currency,
    pub same_city: ZoneRate,
    pub same_state: ZoneRate,
    pub domestic: ZoneRate,
    pub international: ZoneRate,
    /// Weight covered by the base price.
    pub included_kg: Decimal,
    /// Store subtotal at or above which the parcel ships free.
    pub free_over: Option<Decimal>,
}

impl RateTable {
    /// Naira rates used when no overrides are configured.
    #[must_use]
    pub fn default_ngn() -> Self {
        Self {
            currency: Currency::NGN,
            same_city: ZoneRate {
                base: Decimal::from(1_500),
                per_kg: Decimal::from(200),
            },
            same_state: ZoneRate {
                base: Decimal::from(2_500),
                per_kg: Decimal::from(300),
            },
            domestic: ZoneRate {
                base: Decimal::from(4_000),
                per_kg: Decimal::from(500),
            },
            international: ZoneRate {
                base: Decimal::from(25_000),
                per_kg: Decimal::from(4_500),
            },
            included_kg: Decimal::ONE,
            free_over: Some(Decimal::from(100_000)),
        }
    }

    #[must_use]
    pub const fn rate(&self, zone: Zone) -> ZoneRate {
        match zone {
            Zone::SameCity => self.same_city,
            Zone::SameState => self.same_state,
            Zone::Domestic => self.domestic,
            Zone::International => self.international,
        }
    }

    /// Fee for one parcel. `store_subtotal` decides free shipping.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` if the subtotal is not in the table currency.
    pub fn fee(
        &self,
        zone: Zone,
        weight_kg: Decimal,
        store_subtotal: Money,
    ) -> Result<Money, ShippingError> {
        if store_subtotal.currency != self.currency {
            return Err(ShippingError::CurrencyMismatch {
                rates: self.currency,
                cart: store_subtotal.currency,
            });
        }
        if weight_kg <= Decimal::ZERO {
            return Ok(Money::zero(self.currency));
        }
        if let Some(threshold) = self.free_over
            && store_subtotal.amount >= threshold
        {
            return Ok(Money::zero(self.currency));
        }

        let rate = self.rate(zone);
        let extra_kg = (weight_kg - self.included_kg).max(Decimal::ZERO).ceil();
        Ok(Money::new(rate.base + rate.per_kg * extra_kg, self.currency))
    }
}

/// The fee for one store's parcel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParcelQuote {
    pub store_id: StoreId,
    pub store_name: String,
    pub zone: Zone,
    pub weight_kg: Decimal,
    pub fee: Money,
}

/// Shipping for a whole cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingQuote {
    pub parcels: Vec<ParcelQuote>,
    pub total: Money,
}

impl ShippingQuote {
    /// `subtotal + shipping`.
    ///
    /// # Errors
    ///
    /// Returns a money error on mismatch or overflow.
    pub fn grand_total(&self, subtotal: Money) -> Result<Money, ShippingError> {
        Ok(subtotal.checked_add(self.total)?)
    }
}

/// Quote shipping for every parcel in the cart.
///
/// # Errors
///
/// Fails on an incomplete address, a store without an origin, a store that
/// cannot reach the destination, or a currency mismatch with the rate table.
pub fn quote(
    summary: &CartSummary,
    origins: &HashMap<StoreId, Origin>,
    destination: &ShippingAddress,
    rates: &RateTable,
) -> Result<ShippingQuote, ShippingError> {
    destination.validate()?;

    let mut parcels = Vec::with_capacity(summary.parcels.len());
    let mut total = Money::zero(rates.currency);

    for parcel in &summary.parcels {
        let origin = origins
            .get(&parcel.store_id)
            .ok_or_else(|| ShippingError::MissingOrigin(parcel.store_name.clone()))?;
        let zone = zone(origin, destination);
        if zone == Zone::International
            && !origin.ships_internationally
            && parcel.requires_shipping()
        {
            return Err(ShippingError::Undeliverable(origin.store_name.clone()));
        }

        let fee = rates.fee(zone, parcel.weight_kg, parcel.subtotal)?;
        total = total.checked_add(fee)?;
        parcels.push(ParcelQuote {
            store_id: parcel.store_id,
            store_name: parcel.store_name.clone(),
            zone,
            weight_kg: parcel.weight_kg,
            fee,
        });
    }

    Ok(ShippingQuote { parcels, total })
}

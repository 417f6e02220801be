//! Cart validation and totals.
//!
//! A cart may hold products from several stores. Each store ships its own
//! parcel, so lines are grouped per store and the grouping feeds
//! [`crate::shipping::quote`].

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CartItemId, Currency, Money, MoneyError, ProductId, StoreId};

/// Maximum quantity of a single product per cart line.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Weight assumed for products listed without one.
pub const DEFAULT_WEIGHT_KG: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Errors from cart validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    #[error("at most {max} of one item per order")]
    QuantityTooLarge { max: u32 },
    #[error("only {available} left of {title}")]
    OutOfStock { title: String, available: u32 },
    #[error("cart contains more than one currency")]
    MixedCurrency,
    #[error("cart is empty")]
    Empty,
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// A cart line joined with its product and store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub store_name: String,
    pub title: String,
    pub unit_price: Money,
    pub quantity: u32,
    /// Weight of one unit in kilograms.
    pub weight_kg: Option<Decimal>,
    /// Digital goods skip shipping.
    pub requires_shipping: bool,
    /// Units in stock, `None` when the store does not track stock.
    pub stock: Option<u32>,
}

impl CartLine {
    /// `unit_price × quantity`.
    ///
    /// # Errors
    ///
    /// Returns `Money` on overflow.
    pub fn line_total(&self) -> Result<Money, CartError> {
        Ok(self.unit_price.times(self.quantity)?)
    }

    /// Total shippable weight of the line.
    #[must_use]
    pub fn shipping_weight(&self) -> Decimal {
        if !self.requires_shipping {
            return Decimal::ZERO;
        }
        self.weight_kg.unwrap_or(DEFAULT_WEIGHT_KG) * Decimal::from(self.quantity)
    }
}

/// Check a requested quantity against the per-line cap and known stock.
///
/// # Errors
///
/// Returns the first rule the quantity breaks.
pub fn validate_quantity(title: &str, quantity: u32, stock: Option<u32>) -> Result<(), CartError> {
    if quantity == 0 {
        return Err(CartError::ZeroQuantity);
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(CartError::QuantityTooLarge {
            max: MAX_LINE_QUANTITY,
        });
    }
    if let Some(available) = stock
        && quantity > available
    {
        return Err(CartError::OutOfStock {
            title: title.to_string(),
            available,
        });
    }
    Ok(())
}

/// All lines from one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreParcel {
    pub store_id: StoreId,
    pub store_name: String,
    pub lines: Vec<CartLine>,
    pub subtotal: Money,
    /// Sum of shippable weight in kilograms.
    pub weight_kg: Decimal,
}

impl StoreParcel {
    #[must_use]
    pub fn requires_shipping(&self) -> bool {
        self.lines.iter().any(|l| l.requires_shipping)
    }
}

/// Validated cart totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub currency: Currency,
    pub parcels: Vec<StoreParcel>,
    pub subtotal: Money,
    pub item_count: u32,
}

impl CartSummary {
    /// Validate lines and compute totals.
    ///
    /// An empty cart yields a zero summary in `fallback_currency`; callers
    /// that need items (checkout) check [`CartSummary::ensure_not_empty`].
    ///
    /// # Errors
    ///
    /// Returns `MixedCurrency`, a quantity error, or a money overflow.
    pub fn build(lines: Vec<CartLine>, fallback_currency: Currency) -> Result<Self, CartError> {
        let currency = lines
            .first()
            .map_or(fallback_currency, |l| l.unit_price.currency);
        if lines.iter().any(|l| l.unit_price.currency != currency) {
            return Err(CartError::MixedCurrency);
        }

        let mut by_store: BTreeMap<StoreId, StoreParcel> = BTreeMap::new();
        let mut subtotal = Money::zero(currency);
        let mut item_count: u32 = 0;

        for line in lines {
            validate_quantity(&line.title, line.quantity, line.stock)?;
            let total = line.line_total()?;
            subtotal = subtotal.checked_add(total)?;
            item_count = item_count.saturating_add(line.quantity);

            let parcel = by_store
                .entry(line.store_id)
                .or_insert_with(|| StoreParcel {
                    store_id: line.store_id,
                    store_name: line.store_name.clone(),
                    lines: Vec::new(),
                    subtotal: Money::zero(currency),
                    weight_kg: Decimal::ZERO,
                });
            parcel.subtotal = parcel.subtotal.checked_add(total)?;
            parcel.weight_kg += line.shipping_weight();
            parcel.lines.push(line);
        }

        Ok(Self {
            currency,
            parcels: by_store.into_values().collect(),
            subtotal,
            item_count,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    /// # Errors
    ///
    /// Returns `CartError::Empty` when there is nothing to buy.
    pub fn ensure_not_empty(&self) -> Result<(), CartError> {
        if self.is_empty() {
            Err(CartError::Empty)
        } else {
            Ok(())
        }
    }

    /// Iterate over every line across parcels.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.parcels.iter().flat_map(|p| p.lines.iter())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub fn naira(amount: &str) -> Money {
        Money::new(amount.parse().unwrap(), Currency::NGN)
    }

    pub fn line(store: StoreId, title: &str, price: &str, qty: u32) -> CartLine {
        CartLine {
            item_id: CartItemId::generate(),
            product_id: ProductId::generate(),
            store_id: store,
            store_name: format!("store-{title}"),
            title: title.to_string(),
            unit_price: naira(price),
            quantity: qty,
            weight_kg: Some("1.5".parse().unwrap()),
            requires_shipping: true,
            stock: None,
        }
    }

    #[test]
    fn test_subtotal_is_sum_of_lines() {
        let a = StoreId::generate();
        let b = StoreId::generate();
        let summary = CartSummary::build(
            vec![
                line(a, "shirt", "4500", 2),
                line(b, "mug", "1200.50", 1),
                line(a, "cap", "3000", 1),
            ],
            Currency::NGN,
        )
        .unwrap();

        assert_eq!(summary.subtotal, naira("13200.50"));
        assert_eq!(summary.item_count, 4);
        assert_eq!(summary.parcels.len(), 2);

        let parcel_sum = summary
            .parcels
            .iter()
            .try_fold(Money::zero(Currency::NGN), |acc, p| acc.checked_add(p.subtotal))
            .unwrap();
        assert_eq!(parcel_sum, summary.subtotal);

        let line_sum = summary
            .lines()
            .try_fold(Money::zero(Currency::NGN), |acc, l| {
                acc.checked_add(l.line_total().unwrap())
            })
            .unwrap();
        assert_eq!(line_sum, summary.subtotal);
    }

    #[test]
    fn test_parcel_weight_ignores_digital_goods() {
        let store = StoreId::generate();
        let mut ebook = line(store, "ebook", "2000", 3);
        ebook.requires_shipping = false;
        let mut unweighed = line(store, "bag", "5000", 2);
        unweighed.weight_kg = None;

        let summary = CartSummary::build(vec![ebook, unweighed], Currency::NGN).unwrap();
        let parcel = summary.parcels.first().unwrap();
        assert_eq!(parcel.weight_kg, "1.0".parse::<Decimal>().unwrap());
        assert!(parcel.requires_shipping());
    }

    #[test]
    fn test_empty_cart() {
        let summary = CartSummary::build(Vec::new(), Currency::GHS).unwrap();
        assert!(summary.is_empty());
        assert_eq!(summary.subtotal, Money::zero(Currency::GHS));
        assert_eq!(summary.ensure_not_empty(), Err(CartError::Empty));
    }

    #[test]
    fn test_mixed_currency_rejected() {
        let store = StoreId::generate();
        let mut usd = line(store, "lamp", "20", 1);
        usd.unit_price.currency = Currency::USD;
        let result = CartSummary::build(vec![line(store, "rug", "100", 1), usd], Currency::NGN);
        assert_eq!(result, Err(CartError::MixedCurrency));
    }

    #[test]
    fn test_quantity_rules() {
        assert_eq!(validate_quantity("x", 0, None), Err(CartError::ZeroQuantity));
        assert_eq!(
            validate_quantity("x", 100, None),
            Err(CartError::QuantityTooLarge { max: 99 })
        );
        assert_eq!(
            validate_quantity("sneakers", 3, Some(2)),
            Err(CartError::OutOfStock {
                title: "sneakers".to_string(),
                available: 2
            })
        );
        assert!(validate_quantity("x", 2, Some(2)).is_ok());
    }
}

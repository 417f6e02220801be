//! Orders and order items.
//!
//! Checkout creates one order per store in the cart. All orders from one
//! checkout share a payment reference and are settled together.

use agora_core::payments::PaymentMethod;
use agora_core::shipping::ShippingAddress;
use agora_core::{Currency, Money, OrderId, OrderStatus, ProductId, StoreId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::StoreRef;

/// A row in `orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub store_id: StoreId,
    pub status: OrderStatus,
    pub currency: Currency,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub store: Option<StoreRef>,
}

impl Order {
    /// Columns for order detail pages.
    pub const DETAIL: &'static str = "*,items:order_items(*),store:stores(id,slug,name)";

    #[must_use]
    pub const fn total(&self) -> Money {
        Money::new(self.total, self.currency)
    }

    #[must_use]
    pub const fn subtotal(&self) -> Money {
        Money::new(self.subtotal, self.currency)
    }

    #[must_use]
    pub const fn shipping_fee(&self) -> Money {
        Money::new(self.shipping_fee, self.currency)
    }

    #[must_use]
    pub fn store_name(&self) -> &str {
        self.store.as_ref().map_or("", |s| s.name.as_str())
    }

    /// Short reference shown to buyers and sellers.
    #[must_use]
    pub fn number(&self) -> String {
        let simple = self.id.as_uuid().simple().to_string();
        simple.chars().take(8).collect::<String>().to_uppercase()
    }
}

/// A row in `order_items`. Title and price are copied at checkout time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub title: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl OrderItem {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Insert payload for `orders`.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub store_id: StoreId,
    pub status: OrderStatus,
    pub currency: Currency,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
}

/// Insert payload for `order_items`.
pub type NewOrderItem = OrderItem;

//! Storefronts and products.

use agora_core::cart::CartLine;
use agora_core::shipping::Origin;
use agora_core::{CartItemId, Currency, Money, ProductId, StoreId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A row in `stores`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub owner_id: UserId,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub city: String,
    pub state: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    #[serde(default)]
    pub ships_internationally: bool,
    #[serde(default)]
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Where this store's parcels ship from.
    #[must_use]
    pub fn origin(&self) -> Origin {
        Origin {
            store_name: self.name.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            country: self.country.clone(),
            ships_internationally: self.ships_internationally,
        }
    }
}

/// The slice of a store embedded next to products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRef {
    pub id: StoreId,
    pub slug: String,
    pub name: String,
}

/// A row in `products`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub currency: Currency,
    /// Units in stock; `None` when the store does not track stock.
    #[serde(default)]
    pub stock: Option<u32>,
    #[serde(default)]
    pub weight_kg: Option<Decimal>,
    #[serde(default = "default_true")]
    pub requires_shipping: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    pub store: Option<StoreRef>,
}

const fn default_true() -> bool {
    true
}

impl Product {
    /// Columns for product pages and cart lines.
    pub const WITH_STORE: &'static str = "*,store:stores(id,slug,name)";

    #[must_use]
    pub const fn price(&self) -> Money {
        Money::new(self.price, self.currency)
    }

    #[must_use]
    pub fn in_stock(&self) -> bool {
        self.active && self.stock.is_none_or(|s| s > 0)
    }

    #[must_use]
    pub fn store_name(&self) -> &str {
        self.store.as_ref().map_or("", |s| s.name.as_str())
    }

    #[must_use]
    pub fn store_slug(&self) -> &str {
        self.store.as_ref().map_or("", |s| s.slug.as_str())
    }

    /// A cart line for `quantity` units of this product.
    #[must_use]
    pub fn cart_line(&self, item_id: CartItemId, quantity: u32) -> CartLine {
        CartLine {
            item_id,
            product_id: self.id,
            store_id: self.store_id,
            store_name: self.store_name().to_string(),
            title: self.title.clone(),
            unit_price: self.price(),
            quantity,
            weight_kg: self.weight_kg,
            requires_shipping: self.requires_shipping,
            stock: self.stock,
        }
    }
}

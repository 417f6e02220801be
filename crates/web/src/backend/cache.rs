//! Cache types for public storefront reads.

use agora_core::{ProductId, StoreId};

use crate::models::{Product, Store};

/// Cache key for stores and products.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Stores,
    Store(String),
    StoreProducts(StoreId),
    Product(ProductId),
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Stores(Vec<Store>),
    Store(Box<Store>),
    Products(Vec<Product>),
    Product(Box<Product>),
}

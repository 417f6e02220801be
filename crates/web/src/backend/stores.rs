//! `stores` and `products` tables.
//!
//! Public reads are cached for five minutes; writes through this client
//! invalidate the affected keys.

use agora_core::{Currency, ProductId, StoreId, UserId};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::cache::{CacheKey, CacheValue};
use super::{Access, BackendClient, BackendError, Query};
use crate::models::{Product, Store};

/// Attempts at a conditional stock update before giving up.
const STOCK_UPDATE_ATTEMPTS: usize = 3;

/// Insert payload for `stores`.
#[derive(Debug, Clone, Serialize)]
pub struct NewStore {
    pub owner_id: UserId,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub ships_internationally: bool,
    pub currency: Currency,
}

/// Insert payload for `products`.
#[derive(Debug, Clone, Serialize)]
pub struct NewProduct {
    pub store_id: StoreId,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: Currency,
    pub stock: Option<u32>,
    pub weight_kg: Option<Decimal>,
    pub requires_shipping: bool,
    pub image_url: Option<String>,
}

impl BackendClient {
    /// All stores, alphabetically.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_stores(&self) -> Result<Vec<Store>, BackendError> {
        if let Some(CacheValue::Stores(stores)) = self.inner.cache.get(&CacheKey::Stores).await {
            debug!("Cache hit for store list");
            return Ok(stores);
        }

        let query = Query::table("stores").order("name", true).limit(200);
        let stores: Vec<Store> = self.select(&query, Access::Anon).await?;
        self.inner
            .cache
            .insert(CacheKey::Stores, CacheValue::Stores(stores.clone()))
            .await;
        Ok(stores)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if no store has this slug.
    #[instrument(skip(self))]
    pub async fn store_by_slug(&self, slug: &str) -> Result<Store, BackendError> {
        let key = CacheKey::Store(slug.to_string());
        if let Some(CacheValue::Store(store)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for store: {}", slug);
            return Ok(*store);
        }

        let store: Store = self
            .select_one(&Query::table("stores").eq("slug", slug), Access::Anon)
            .await?;
        self.inner
            .cache
            .insert(key, CacheValue::Store(Box::new(store.clone())))
            .await;
        Ok(store)
    }

    /// Stores by id, for shipping origins and seller lookups.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn stores_by_ids(&self, ids: &[StoreId]) -> Result<Vec<Store>, BackendError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(&Query::table("stores").in_("id", ids), Access::Anon)
            .await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn stores_owned_by(&self, owner: UserId) -> Result<Vec<Store>, BackendError> {
        let query = Query::table("stores")
            .eq("owner_id", owner)
            .order("name", true);
        self.select(&query, Access::Anon).await
    }

    /// # Errors
    ///
    /// Returns `Conflict` if the slug is taken.
    #[instrument(skip(self, store, access), fields(slug = %store.slug))]
    pub async fn create_store(
        &self,
        store: &NewStore,
        access: Access<'_>,
    ) -> Result<Store, BackendError> {
        let created: Store = self.insert_one("stores", store, access).await?;
        self.inner.cache.invalidate(&CacheKey::Stores).await;
        Ok(created)
    }

    /// Active products of a store, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn products_for_store(&self, store: StoreId) -> Result<Vec<Product>, BackendError> {
        let key = CacheKey::StoreProducts(store);
        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for products of store: {}", store);
            return Ok(products);
        }

        let query = Query::table("products")
            .select(Product::WITH_STORE)
            .eq("store_id", store)
            .eq("active", true)
            .order("created_at", false)
            .limit(200);
        let products: Vec<Product> = self.select(&query, Access::Anon).await?;
        self.inner
            .cache
            .insert(key, CacheValue::Products(products.clone()))
            .await;
        Ok(products)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the product does not exist.
    #[instrument(skip(self))]
    pub async fn product_by_id(&self, id: ProductId) -> Result<Product, BackendError> {
        let key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for product: {}", id);
            return Ok(*product);
        }

        let query = Query::table("products")
            .select(Product::WITH_STORE)
            .eq("id", id);
        let product: Product = self.select_one(&query, Access::Anon).await?;
        self.inner
            .cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// # Errors
    ///
    /// Returns error if the insert is rejected.
    #[instrument(skip(self, product, access), fields(store_id = %product.store_id))]
    pub async fn create_product(
        &self,
        product: &NewProduct,
        access: Access<'_>,
    ) -> Result<Product, BackendError> {
        let created: Product = self.insert_one("products", product, access).await?;
        self.inner
            .cache
            .invalidate(&CacheKey::StoreProducts(product.store_id))
            .await;
        Ok(created)
    }

    /// Take `quantity` units out of a tracked product's stock.
    ///
    /// Untracked products are left alone. Stock never goes below zero.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if concurrent updates keep winning.
    #[instrument(skip(self))]
    pub async fn take_stock(&self, id: ProductId, quantity: u32) -> Result<(), BackendError> {
        for _ in 0..STOCK_UPDATE_ATTEMPTS {
            let query = Query::table("products").eq("id", id);
            let product: Product = self.select_one(&query, Access::Service).await?;
            let Some(stock) = product.stock else {
                return Ok(());
            };

            let next = stock.saturating_sub(quantity);
            let rows: Vec<Product> = self
                .update(
                    &query.eq("stock", stock),
                    &json!({ "stock": next }),
                    Access::Service,
                )
                .await?;
            if !rows.is_empty() {
                self.inner.cache.invalidate(&CacheKey::Product(id)).await;
                self.inner
                    .cache
                    .invalidate(&CacheKey::StoreProducts(product.store_id))
                    .await;
                return Ok(());
            }
            debug!("Stock for {} changed underneath us, retrying", id);
        }
        Err(BackendError::Conflict(format!("stock for product {id} is busy")))
    }
}

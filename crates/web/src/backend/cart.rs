//! `cart_items` table.

use agora_core::{CartItemId, ProductId, UserId};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use super::{Access, BackendClient, BackendError, Query};
use crate::models::CartItem;

#[derive(Deserialize)]
struct QuantityRow {
    quantity: u32,
}

impl BackendClient {
    /// A user's cart with products embedded, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn cart_items(
        &self,
        user: UserId,
        access: Access<'_>,
    ) -> Result<Vec<CartItem>, BackendError> {
        let query = Query::table("cart_items")
            .select(CartItem::WITH_PRODUCT)
            .eq("user_id", user)
            .order("created_at", true);
        self.select(&query, access).await
    }

    /// Total units in a user's cart.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn cart_count(&self, user: UserId, access: Access<'_>) -> Result<u32, BackendError> {
        let query = Query::table("cart_items")
            .select("quantity")
            .eq("user_id", user);
        let rows: Vec<QuantityRow> = self.select(&query, access).await?;
        Ok(rows
            .iter()
            .fold(0u32, |acc, r| acc.saturating_add(r.quantity)))
    }

    /// The cart row for a product, if the user already has one.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn cart_item_for_product(
        &self,
        user: UserId,
        product: ProductId,
        access: Access<'_>,
    ) -> Result<Option<CartItem>, BackendError> {
        let query = Query::table("cart_items")
            .eq("user_id", user)
            .eq("product_id", product);
        self.select_optional(&query, access).await
    }

    /// # Errors
    ///
    /// Returns `Conflict` if the product is already in the cart.
    #[instrument(skip(self, access))]
    pub async fn insert_cart_item(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
        access: Access<'_>,
    ) -> Result<CartItem, BackendError> {
        self.insert_one(
            "cart_items",
            &json!({ "user_id": user, "product_id": product, "quantity": quantity }),
            access,
        )
        .await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the item is not in this user's cart.
    #[instrument(skip(self, access))]
    pub async fn set_cart_quantity(
        &self,
        user: UserId,
        item: CartItemId,
        quantity: u32,
        access: Access<'_>,
    ) -> Result<CartItem, BackendError> {
        let query = Query::table("cart_items")
            .eq("id", item)
            .eq("user_id", user);
        let rows: Vec<CartItem> = self
            .update(&query, &json!({ "quantity": quantity }), access)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("cart_items".to_string()))
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn remove_cart_item(
        &self,
        user: UserId,
        item: CartItemId,
        access: Access<'_>,
    ) -> Result<(), BackendError> {
        let query = Query::table("cart_items")
            .eq("id", item)
            .eq("user_id", user);
        self.delete(&query, access).await
    }

    /// Empty a user's cart.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, access))]
    pub async fn clear_cart(&self, user: UserId, access: Access<'_>) -> Result<(), BackendError> {
        self.delete(&Query::table("cart_items").eq("user_id", user), access)
            .await
    }
}

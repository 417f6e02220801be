//! Cart items.

use agora_core::cart::CartLine;
use agora_core::{CartItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::Product;

/// A row in `cart_items`, optionally with its product embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default, skip_serializing)]
    pub product: Option<Product>,
}

impl CartItem {
    /// Columns for the cart page and checkout.
    pub const WITH_PRODUCT: &'static str = "*,product:products(*,store:stores(id,slug,name))";

    /// The item as a priced cart line; `None` if the product is gone.
    #[must_use]
    pub fn to_line(&self) -> Option<CartLine> {
        self.product
            .as_ref()
            .map(|p| p.cart_line(self.id, self.quantity))
    }
}

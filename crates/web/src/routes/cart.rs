//! Cart route handlers.
//!
//! The cart lives in the backend, one row per product. Adding from a
//! product page works with or without HTMX: HTMX requests get the count
//! badge back with an `HX-Trigger`, plain form posts are redirected.

use agora_core::cart::{self, CartSummary};
use agora_core::{CartItemId, ProductId};
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::HeaderMap,
    response::{AppendHeaders, IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::{PageContext, flash_or_fail, redirect_with_success};
use crate::backend::{Access, BackendError};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::CurrentUser;
use crate::services::CheckoutService;
use crate::state::AppState;

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: ProductId,
    pub quantity: Option<u32>,
}

/// Update cart form data. A quantity of zero removes the line.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub item_id: CartItemId,
    pub quantity: u32,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub item_id: CartItemId,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub ctx: PageContext,
    pub summary: CartSummary,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u32,
}

fn is_htmx(headers: &HeaderMap) -> bool {
    headers.contains_key("hx-request")
}

/// Display the cart grouped by store.
#[instrument(skip(state, user, ctx), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ctx: PageContext,
) -> Result<impl IntoResponse> {
    let summary = CheckoutService::new(&state)
        .summary(user.id, Access::User(&user.access_token))
        .await?;
    Ok(CartShowTemplate { ctx, summary })
}

/// Put a product in the cart, adding to the quantity already there.
async fn add_item(state: &AppState, user: &CurrentUser, form: &AddToCartForm) -> Result<u32> {
    let backend = state.backend();
    let access = Access::User(&user.access_token);
    let product = backend
        .product_by_id(form.product_id)
        .await
        .map_err(|e| match e {
            BackendError::NotFound(_) => AppError::NotFound("product".to_string()),
            other => other.into(),
        })?;
    if !product.in_stock() {
        return Err(AppError::BadRequest(format!(
            "{} is not available right now",
            product.title
        )));
    }

    let wanted = form.quantity.unwrap_or(1);
    match backend
        .cart_item_for_product(user.id, product.id, access)
        .await?
    {
        Some(existing) => {
            let quantity = existing.quantity.saturating_add(wanted);
            cart::validate_quantity(&product.title, quantity, product.stock)?;
            backend
                .set_cart_quantity(user.id, existing.id, quantity, access)
                .await?;
        }
        None => {
            cart::validate_quantity(&product.title, wanted, product.stock)?;
            backend
                .insert_cart_item(user.id, product.id, wanted, access)
                .await?;
        }
    }

    Ok(backend.cart_count(user.id, access).await?)
}

/// Add item to cart.
#[instrument(skip(state, session, user, headers), fields(user_id = %user.id))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    headers: HeaderMap,
    Form(form): Form<AddToCartForm>,
) -> Response {
    let back = format!("/products/{}", form.product_id);
    match add_item(&state, &user, &form).await {
        Ok(count) if is_htmx(&headers) => (
            AppendHeaders([("HX-Trigger", "cart-updated")]),
            CartCountTemplate { count },
        )
            .into_response(),
        Ok(_) => redirect_with_success(&session, "/cart", "Added to your cart").await,
        Err(e) => flash_or_fail(&session, e, &back).await,
    }
}

async fn update_item(state: &AppState, user: &CurrentUser, form: &UpdateCartForm) -> Result<()> {
    let backend = state.backend();
    let access = Access::User(&user.access_token);
    if form.quantity == 0 {
        return Ok(backend.remove_cart_item(user.id, form.item_id, access).await?);
    }

    let items = backend.cart_items(user.id, access).await?;
    let item = items
        .iter()
        .find(|i| i.id == form.item_id)
        .ok_or_else(|| AppError::NotFound("cart item".to_string()))?;
    if let Some(product) = &item.product {
        cart::validate_quantity(&product.title, form.quantity, product.stock)?;
    }
    backend
        .set_cart_quantity(user.id, item.id, form.quantity, access)
        .await?;
    Ok(())
}

/// Update cart item quantity.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<UpdateCartForm>,
) -> Response {
    match update_item(&state, &user, &form).await {
        Ok(()) => redirect_with_success(&session, "/cart", "Cart updated").await,
        Err(e) => flash_or_fail(&session, e, "/cart").await,
    }
}

/// Remove item from cart.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<RemoveFromCartForm>,
) -> Response {
    let result = state
        .backend()
        .remove_cart_item(user.id, form.item_id, Access::User(&user.access_token))
        .await
        .map_err(AppError::from);
    super::finish(&session, result, "Removed from your cart", "/cart", "/cart").await
}

/// Get cart count badge (HTMX). Signed-out visitors always see zero.
pub async fn count(State(state): State<AppState>, OptionalAuth(user): OptionalAuth) -> impl IntoResponse {
    let count = match user {
        Some(user) => state
            .backend()
            .cart_count(user.id, Access::User(&user.access_token))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to count cart items");
                0
            }),
        None => 0,
    };
    CartCountTemplate { count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_htmx_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_htmx(&headers));
        headers.insert("HX-Request", HeaderValue::from_static("true"));
        assert!(is_htmx(&headers));
    }
}

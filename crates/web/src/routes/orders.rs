//! Buyer and seller order pages.

use agora_core::{OrderId, OrderStatus, UserId};
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, instrument};

use super::{PageContext, finish};
use crate::backend::{Access, BackendClient, BackendError};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, Order};
use crate::state::AppState;

/// Status change form data.
#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: OrderStatus,
}

/// Statuses a store owner can move an order to next.
#[must_use]
pub fn seller_next(status: OrderStatus) -> Vec<OrderStatus> {
    [OrderStatus::Shipped, OrderStatus::Delivered]
        .into_iter()
        .filter(|next| status.seller_may_set(*next))
        .collect()
}

/// Move `order` to `next`, failing if someone else changed it first.
///
/// The caller has already checked that the transition is allowed for them.
pub(super) async fn apply_transition(
    backend: &BackendClient,
    order: &Order,
    next: OrderStatus,
    access: Access<'_>,
) -> Result<Order> {
    if !order.status.can_transition_to(next) {
        return Err(AppError::BadRequest(format!(
            "A {} order can't be marked {next}",
            order.status
        )));
    }
    let moved = backend
        .transition_order(order.id, order.status, next, access)
        .await?
        .ok_or_else(|| AppError::Conflict("The order was just changed, please reload".to_string()))?;
    info!(order_id = %order.id, from = %order.status, to = %next, "Order status changed");
    Ok(moved)
}

async fn load_order(backend: &BackendClient, id: OrderId, user: &CurrentUser) -> Result<Order> {
    backend
        .order_by_id(id, Access::User(&user.access_token))
        .await
        .map_err(|e| match e {
            BackendError::NotFound(_) => AppError::NotFound("order".to_string()),
            other => other.into(),
        })
}

async fn owns_store(backend: &BackendClient, user: UserId, order: &Order) -> Result<bool> {
    Ok(backend
        .stores_owned_by(user)
        .await?
        .iter()
        .any(|s| s.id == order.store_id))
}

/// Orders page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/index.html")]
pub struct OrdersTemplate {
    pub ctx: PageContext,
    pub purchases: Vec<Order>,
    pub sales: Vec<Order>,
}

/// The user's purchases and, for store owners, orders to fulfil.
#[instrument(skip(state, user, ctx), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ctx: PageContext,
) -> Result<impl IntoResponse> {
    let backend = state.backend();
    let access = Access::User(&user.access_token);
    let (purchases, stores) = tokio::try_join!(
        backend.orders_for_buyer(user.id, access),
        backend.stores_owned_by(user.id),
    )?;
    let store_ids: Vec<_> = stores.iter().map(|s| s.id).collect();
    let sales = backend.orders_for_stores(&store_ids, access).await?;

    Ok(OrdersTemplate {
        ctx,
        purchases,
        sales,
    })
}

/// Order detail template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/show.html")]
pub struct OrderTemplate {
    pub ctx: PageContext,
    pub order: Order,
    pub is_seller: bool,
    pub next_statuses: Vec<OrderStatus>,
}

/// Display one order to its buyer or its store owner.
#[instrument(skip(state, user, ctx), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ctx: PageContext,
    Path(id): Path<OrderId>,
) -> Result<impl IntoResponse> {
    let backend = state.backend();
    let order = load_order(backend, id, &user).await?;
    let is_seller = owns_store(backend, user.id, &order).await?;
    if !is_seller && order.buyer_id != user.id && !user.is_admin() {
        return Err(AppError::NotFound("order".to_string()));
    }
    let next_statuses = if is_seller {
        seller_next(order.status)
    } else {
        Vec::new()
    };

    Ok(OrderTemplate {
        ctx,
        order,
        is_seller,
        next_statuses,
    })
}

async fn seller_update(
    state: &AppState,
    user: &CurrentUser,
    id: OrderId,
    next: OrderStatus,
) -> Result<Order> {
    let backend = state.backend();
    let order = load_order(backend, id, user).await?;
    if !owns_store(backend, user.id, &order).await? {
        return Err(AppError::Forbidden(
            "Only the store owner can update this order".to_string(),
        ));
    }
    if !order.status.seller_may_set(next) {
        return Err(AppError::BadRequest(format!(
            "A {} order can't be marked {next} from here",
            order.status
        )));
    }
    apply_transition(backend, &order, next, Access::User(&user.access_token)).await
}

/// Store owner advances an order (paid → shipped → delivered).
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn update_status(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
    Form(form): Form<StatusForm>,
) -> Response {
    let back = format!("/orders/{id}");
    let result = seller_update(&state, &user, id, form.status).await;
    let message = format!("Order marked {}", form.status);
    finish(&session, result, &message, &back, &back).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seller_next_statuses() {
        assert_eq!(seller_next(OrderStatus::Paid), vec![OrderStatus::Shipped]);
        assert_eq!(
            seller_next(OrderStatus::Shipped),
            vec![OrderStatus::Delivered]
        );
        assert!(seller_next(OrderStatus::Pending).is_empty());
        assert!(seller_next(OrderStatus::Delivered).is_empty());
        assert!(seller_next(OrderStatus::Refunded).is_empty());
    }
}

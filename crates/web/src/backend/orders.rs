//! `orders` and `order_items` tables.

use agora_core::{OrderId, OrderStatus, StoreId, UserId};
use serde_json::json;
use tracing::instrument;

use super::{Access, BackendClient, BackendError, Query};
use crate::models::{NewOrder, NewOrderItem, Order};

impl BackendClient {
    /// Insert orders and their items.
    ///
    /// # Errors
    ///
    /// Returns error if either insert is rejected.
    #[instrument(skip_all, fields(orders = orders.len(), items = items.len()))]
    pub async fn create_orders(
        &self,
        orders: &[NewOrder],
        items: &[NewOrderItem],
        access: Access<'_>,
    ) -> Result<Vec<Order>, BackendError> {
        let created: Vec<Order> = self.insert("orders", orders, access).await?;
        let _: Vec<serde_json::Value> = self.insert("order_items", items, access).await?;
        Ok(created)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the order does not exist or is hidden.
    pub async fn order_by_id(&self, id: OrderId, access: Access<'_>) -> Result<Order, BackendError> {
        let query = Query::table("orders").select(Order::DETAIL).eq("id", id);
        self.select_one(&query, access).await
    }

    /// A buyer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn orders_for_buyer(
        &self,
        buyer: UserId,
        access: Access<'_>,
    ) -> Result<Vec<Order>, BackendError> {
        let query = Query::table("orders")
            .select(Order::DETAIL)
            .eq("buyer_id", buyer)
            .order("created_at", false)
            .limit(100);
        self.select(&query, access).await
    }

    /// Orders placed with any of `stores`, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn orders_for_stores(
        &self,
        stores: &[StoreId],
        access: Access<'_>,
    ) -> Result<Vec<Order>, BackendError> {
        if stores.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::table("orders")
            .select(Order::DETAIL)
            .in_("store_id", stores)
            .neq("status", OrderStatus::Pending)
            .order("created_at", false)
            .limit(100);
        self.select(&query, access).await
    }

    /// Every order, newest first, optionally with one status.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Order>, BackendError> {
        let mut query = Query::table("orders")
            .select(Order::DETAIL)
            .order("created_at", false)
            .offset(offset)
            .limit(limit);
        if let Some(status) = status {
            query = query.eq("status", status);
        }
        self.select(&query, Access::Service).await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn count_orders(&self, status: Option<OrderStatus>) -> Result<u64, BackendError> {
        let mut query = Query::table("orders").select("id");
        if let Some(status) = status {
            query = query.eq("status", status);
        }
        self.count(&query, Access::Service).await
    }

    /// Move an order from `from` to `to`.
    ///
    /// Returns `None` when the order was no longer in `from`, so two
    /// concurrent transitions cannot both apply.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, access))]
    pub async fn transition_order(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        access: Access<'_>,
    ) -> Result<Option<Order>, BackendError> {
        let query = Query::table("orders").eq("id", id).eq("status", from);
        let rows: Vec<Order> = self
            .update(&query, &json!({ "status": to }), access)
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Mark pending orders paid. Returns only the orders this call moved.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn mark_orders_paid(&self, ids: &[OrderId]) -> Result<Vec<Order>, BackendError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::table("orders")
            .select(Order::DETAIL)
            .in_("id", ids)
            .eq("status", OrderStatus::Pending);
        self.update(&query, &json!({ "status": OrderStatus::Paid }), Access::Service)
            .await
    }

    /// Orders by id, with items, regardless of status.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn orders_by_ids(&self, ids: &[OrderId]) -> Result<Vec<Order>, BackendError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::table("orders").select(Order::DETAIL).in_("id", ids);
        self.select(&query, Access::Service).await
    }

    /// Cancel pending orders after a failed or abandoned payment. Returns
    /// only the orders this call moved.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn cancel_pending_orders(&self, ids: &[OrderId]) -> Result<Vec<Order>, BackendError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::table("orders")
            .in_("id", ids)
            .eq("status", OrderStatus::Pending);
        self.update(
            &query,
            &json!({ "status": OrderStatus::Cancelled }),
            Access::Service,
        )
        .await
    }
}

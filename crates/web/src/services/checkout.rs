//! Cart totals, shipping quotes and order placement.
//!
//! A checkout creates one pending order per store in the cart, all sharing
//! one payment reference. Paying from the wallet settles them on the spot;
//! paying through a gateway records a pending payment and hands back the
//! hosted checkout URL, and [`super::settlement`] finishes the job once the
//! gateway confirms.

use std::collections::HashMap;

use agora_core::cart::CartSummary;
use agora_core::payments::{self, PaymentMethod, PaymentPurpose, PaymentReference, Route};
use agora_core::shipping::{self, Origin, ShippingAddress, ShippingQuote};
use agora_core::wallet;
use agora_core::{
    Money, OrderId, OrderStatus, StoreId, TransactionKind, TransactionStatus, UserId,
};
use tracing::{error, info, instrument, warn};

use crate::backend::{Access, LedgerEntry};
use crate::error::{AppError, Result};
use crate::models::{CurrentUser, NewOrder, NewOrderItem, Order, OrderItem};
use crate::payments::CheckoutRequest;
use crate::state::AppState;

/// What placing an order led to.
#[derive(Debug)]
pub enum CheckoutOutcome {
    /// Paid from the wallet; orders are already marked paid.
    Paid(Vec<OrderId>),
    /// Send the buyer to the gateway's hosted checkout.
    Redirect(String),
}

/// Split a quoted cart into one order per store.
///
/// # Errors
///
/// Returns a money error if a parcel total overflows.
pub fn build_orders(
    buyer: UserId,
    summary: &CartSummary,
    quote: &ShippingQuote,
    address: &ShippingAddress,
    method: PaymentMethod,
    reference: &PaymentReference,
) -> Result<(Vec<NewOrder>, Vec<NewOrderItem>)> {
    let fees: HashMap<StoreId, Money> = quote
        .parcels
        .iter()
        .map(|p| (p.store_id, p.fee))
        .collect();

    let mut orders = Vec::with_capacity(summary.parcels.len());
    let mut items = Vec::new();

    for parcel in &summary.parcels {
        let id = OrderId::generate();
        let fee = fees
            .get(&parcel.store_id)
            .copied()
            .unwrap_or_else(|| Money::zero(summary.currency));
        let total = parcel.subtotal.checked_add(fee)?;

        orders.push(NewOrder {
            id,
            buyer_id: buyer,
            store_id: parcel.store_id,
            status: OrderStatus::Pending,
            currency: summary.currency,
            subtotal: parcel.subtotal.amount,
            shipping_fee: fee.amount,
            total: total.amount,
            shipping_address: address.clone(),
            payment_method: method,
            payment_reference: Some(reference.to_string()),
        });
        items.extend(parcel.lines.iter().map(|line| OrderItem {
            order_id: id,
            product_id: line.product_id,
            title: line.title.clone(),
            unit_price: line.unit_price.amount,
            quantity: line.quantity,
        }));
    }

    Ok((orders, items))
}

/// Checkout service.
pub struct CheckoutService<'a> {
    state: &'a AppState,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// The user's cart as priced lines grouped per store.
    ///
    /// Items whose product has been removed are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Cart` errors for mixed currencies or unavailable quantities.
    pub async fn summary(&self, user: UserId, access: Access<'_>) -> Result<CartSummary> {
        let items = self.state.backend().cart_items(user, access).await?;
        let lines = items.iter().filter_map(crate::models::CartItem::to_line).collect();
        Ok(CartSummary::build(lines, self.state.config().currency)?)
    }

    async fn origins(&self, summary: &CartSummary) -> Result<HashMap<StoreId, Origin>> {
        let ids: Vec<StoreId> = summary.parcels.iter().map(|p| p.store_id).collect();
        let stores = self.state.backend().stores_by_ids(&ids).await?;
        Ok(stores.into_iter().map(|s| (s.id, s.origin())).collect())
    }

    /// Shipping for the user's cart to `address`.
    ///
    /// # Errors
    ///
    /// Returns `Shipping` errors for incomplete addresses or stores that
    /// cannot deliver there.
    #[instrument(skip(self, address, access))]
    pub async fn quote(
        &self,
        user: UserId,
        address: &ShippingAddress,
        access: Access<'_>,
    ) -> Result<(CartSummary, ShippingQuote)> {
        let summary = self.summary(user, access).await?;
        let origins = self.origins(&summary).await?;
        let quote = shipping::quote(&summary, &origins, address, &self.state.config().shipping)?;
        Ok((summary, quote))
    }

    /// Create the orders and start payment.
    ///
    /// # Errors
    ///
    /// Returns `Cart(Empty)` for an empty cart, `Shipping` for a bad
    /// address, `Routing` if no gateway takes the method, and `Ledger` when
    /// the wallet cannot cover the total.
    #[instrument(skip(self, user, address), fields(user_id = %user.id, method = %method))]
    pub async fn place_order(
        &self,
        user: &CurrentUser,
        address: &ShippingAddress,
        method: PaymentMethod,
    ) -> Result<CheckoutOutcome> {
        let access = Access::User(&user.access_token);
        let summary = self.summary(user.id, access).await?;
        summary.ensure_not_empty()?;
        let origins = self.origins(&summary).await?;
        let quote = shipping::quote(&summary, &origins, address, &self.state.config().shipping)?;
        let total = quote.grand_total(summary.subtotal)?;

        let route = payments::route(method, summary.currency, &self.state.gateways().available())?;
        let reference = PaymentReference::generate(PaymentPurpose::Order);
        let (orders, items) = build_orders(user.id, &summary, &quote, address, method, &reference)?;
        let order_ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();

        self.state
            .backend()
            .create_orders(&orders, &items, access)
            .await?;
        info!(reference = %reference, orders = order_ids.len(), total = %total, "Orders created");

        match route {
            Route::Wallet => {
                self.pay_from_wallet(user.id, &reference, total, &order_ids)
                    .await?;
                Ok(CheckoutOutcome::Paid(order_ids))
            }
            Route::Gateway(gateway) => {
                let backend = self.state.backend();
                backend
                    .insert_payment(&reference, user.id, gateway, method, total, &order_ids)
                    .await?;

                let callback_url = self.state.config().absolute_url("/checkout/callback");
                let request = CheckoutRequest {
                    reference: &reference,
                    email: user.email.as_str(),
                    name: &user.username,
                    amount: total,
                    method,
                    callback_url: &callback_url,
                };
                match self.state.gateways().start_checkout(gateway, &request).await {
                    Ok(url) => Ok(CheckoutOutcome::Redirect(url)),
                    Err(e) => {
                        warn!(error = %e, gateway = %gateway, "Could not start hosted checkout");
                        backend.fail_payment(&reference.to_string()).await?;
                        backend.cancel_pending_orders(&order_ids).await?;
                        Err(e.into())
                    }
                }
            }
        }
    }

    async fn pay_from_wallet(
        &self,
        buyer: UserId,
        reference: &PaymentReference,
        total: Money,
        order_ids: &[OrderId],
    ) -> Result<()> {
        let backend = self.state.backend();
        let reference = reference.to_string();
        let entry = LedgerEntry {
            kind: TransactionKind::Purchase,
            amount: total,
            status: TransactionStatus::Completed,
            reference: Some(&reference),
            counterparty: None,
            description: "Marketplace purchase",
        };

        let debit = backend
            .apply_to_wallet(buyer, entry, |balance| {
                wallet::apply(balance, TransactionKind::Purchase, total).map_err(AppError::from)
            })
            .await;
        if let Err(e) = debit {
            backend.cancel_pending_orders(order_ids).await?;
            return Err(e);
        }

        let Err(e) = self.fulfil(buyer, order_ids, &reference).await else {
            return Ok(());
        };

        // Orders still pending were never paid: cancel them and give the money back
        match backend.cancel_pending_orders(order_ids).await {
            Ok(cancelled) if cancelled.is_empty() => {
                error!(error = %e, reference = %reference, "Wallet purchase paid but a seller credit failed");
                sentry::capture_error(&e);
                Ok(())
            }
            Ok(cancelled) => {
                let amount = cancelled
                    .iter()
                    .try_fold(Money::zero(total.currency), |sum, o| sum.checked_add(o.total()))?;
                self.reverse_purchase(buyer, amount, &reference).await?;
                Err(e)
            }
            Err(cancel_error) => {
                error!(error = %cancel_error, reference = %reference, "Could not cancel orders after a failed wallet purchase");
                sentry::capture_error(&cancel_error);
                Err(e)
            }
        }
    }

    async fn reverse_purchase(&self, buyer: UserId, amount: Money, reference: &str) -> Result<()> {
        warn!(reference = %reference, amount = %amount, "Reversing wallet purchase");
        let entry = LedgerEntry {
            kind: TransactionKind::Refund,
            amount,
            status: TransactionStatus::Completed,
            reference: Some(reference),
            counterparty: None,
            description: "Reversal: marketplace purchase",
        };
        self.state
            .backend()
            .apply_to_wallet(buyer, entry, |balance| {
                wallet::apply(balance, TransactionKind::Refund, amount).map_err(AppError::from)
            })
            .await?;
        Ok(())
    }

    /// Mark paid orders, take stock, credit sellers and empty the buyer's
    /// cart.
    ///
    /// Safe to call again for the same orders. Stock is taken only for the
    /// orders this call moved to paid, and each seller credit is keyed by
    /// order, so a retry after a partial failure credits only the sellers
    /// still owed.
    ///
    /// # Errors
    ///
    /// Returns error if the orders cannot be marked paid or a seller cannot
    /// be credited.
    #[instrument(skip(self, order_ids))]
    pub async fn fulfil(
        &self,
        buyer: UserId,
        order_ids: &[OrderId],
        reference: &str,
    ) -> Result<Vec<Order>> {
        let backend = self.state.backend();
        let paid = backend.mark_orders_paid(order_ids).await?;

        for item in paid.iter().flat_map(|o| o.items.iter()) {
            if let Err(e) = backend.take_stock(item.product_id, item.quantity).await {
                warn!(error = %e, product_id = %item.product_id, "Failed to update stock");
            }
        }

        let owed: Vec<Order> = backend
            .orders_by_ids(order_ids)
            .await?
            .into_iter()
            .filter(|o| {
                matches!(
                    o.status,
                    OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Delivered
                )
            })
            .collect();
        let store_ids: Vec<StoreId> = owed.iter().map(|o| o.store_id).collect();
        let owners: HashMap<StoreId, UserId> = backend
            .stores_by_ids(&store_ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s.owner_id))
            .collect();

        let mut failed = None;
        for order in &owed {
            let Some(&seller) = owners.get(&order.store_id) else {
                error!(order_id = %order.id, "Paid order has no store owner to credit");
                continue;
            };
            if let Err(e) = self.credit_sale(buyer, seller, order).await {
                error!(error = %e, order_id = %order.id, seller = %seller, "Failed to credit seller");
                sentry::capture_error(&e);
                failed.get_or_insert(e);
            }
        }

        if let Err(e) = backend.clear_cart(buyer, Access::Service).await {
            warn!(error = %e, "Failed to clear cart after payment");
        }

        if let Some(e) = failed {
            return Err(e);
        }
        info!(reference = %reference, orders = paid.len(), "Orders paid");
        Ok(paid)
    }

    /// Credit a seller for one paid order, once.
    async fn credit_sale(&self, buyer: UserId, seller: UserId, order: &Order) -> Result<()> {
        let backend = self.state.backend();
        let reference = sale_reference(order.id);
        if backend
            .transaction_exists(&reference, TransactionKind::Sale)
            .await?
        {
            return Ok(());
        }

        let description = format!("Sale, order #{}", order.number());
        let amount = order.total();
        let entry = LedgerEntry {
            kind: TransactionKind::Sale,
            amount,
            status: TransactionStatus::Completed,
            reference: Some(&reference),
            counterparty: Some(buyer),
            description: &description,
        };
        backend
            .apply_to_wallet(seller, entry, |balance| {
                wallet::apply(balance, TransactionKind::Sale, amount).map_err(AppError::from)
            })
            .await?;
        Ok(())
    }
}

/// Ledger reference of the seller credit for an order.
#[must_use]
pub fn sale_reference(order: OrderId) -> String {
    format!("SAL-{}", order.as_uuid().simple())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::config::tests::test_config;
    use crate::payments::Gateways;
    use agora_core::cart::CartLine;
    use agora_core::shipping::RateTable;
    use agora_core::{CartItemId, Currency, Email, ProductId, UserRole};
    use axum::http::Method;
    use rust_decimal::Decimal;
    use serde_json::{Value, json};

    fn line(store: StoreId, store_name: &str, price: i64, quantity: u32) -> CartLine {
        CartLine {
            item_id: CartItemId::generate(),
            product_id: ProductId::generate(),
            store_id: store,
            store_name: store_name.to_string(),
            title: format!("{store_name} item"),
            unit_price: Money::new(Decimal::from(price), Currency::NGN),
            quantity,
            weight_kg: Some(Decimal::ONE),
            requires_shipping: true,
            stock: None,
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Ada Obi".to_string(),
            phone: "+2348012345678".to_string(),
            line1: "12 Marina".to_string(),
            city: "Lagos".to_string(),
            state: "Lagos".to_string(),
            country: "NG".to_string(),
            ..ShippingAddress::default()
        }
    }

    fn origin(name: &str, city: &str, state: &str) -> Origin {
        Origin {
            store_name: name.to_string(),
            city: city.to_string(),
            state: state.to_string(),
            country: "NG".to_string(),
            ships_internationally: false,
        }
    }

    #[test]
    fn test_one_order_per_store_totals_match_quote() {
        let (a, b) = (StoreId::generate(), StoreId::generate());
        let summary = CartSummary::build(
            vec![
                line(a, "Adire House", 4_000, 2),
                line(b, "Kano Leather", 12_500, 1),
                line(a, "Adire House", 1_000, 1),
            ],
            Currency::NGN,
        )
        .unwrap();
        let origins = HashMap::from([
            (a, origin("Adire House", "Lagos", "Lagos")),
            (b, origin("Kano Leather", "Kano", "Kano")),
        ]);
        let quote =
            shipping::quote(&summary, &origins, &address(), &RateTable::default_ngn()).unwrap();
        let reference = PaymentReference::generate(PaymentPurpose::Order);

        let (orders, items) = build_orders(
            UserId::generate(),
            &summary,
            &quote,
            &address(),
            PaymentMethod::Card,
            &reference,
        )
        .unwrap();

        assert_eq!(orders.len(), 2);
        assert_eq!(items.len(), 3);

        let order_total: Decimal = orders.iter().map(|o| o.total).sum();
        let grand_total = quote.grand_total(summary.subtotal).unwrap();
        assert_eq!(order_total, grand_total.amount);

        for order in &orders {
            assert_eq!(order.total, order.subtotal + order.shipping_fee);
            assert_eq!(order.status, OrderStatus::Pending);
            assert_eq!(order.payment_reference.as_deref(), Some(reference.to_string().as_str()));
            let items_total: Decimal = items
                .iter()
                .filter(|i| i.order_id == order.id)
                .map(OrderItem::line_total)
                .sum();
            assert_eq!(items_total, order.subtotal);
        }
    }

    /// Two sellers, a buyer with one item from each in their cart.
    struct Market {
        fake: FakeBackend,
        state: AppState,
        buyer: CurrentUser,
        sellers: [UserId; 2],
    }

    async fn market(buyer_balance: &str) -> Market {
        let fake = FakeBackend::new();
        let buyer = CurrentUser {
            id: UserId::generate(),
            email: Email::parse("ada@example.com").unwrap(),
            username: "ada".to_string(),
            role: UserRole::Member,
            access_token: "buyer-jwt".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: i64::MAX,
        };
        let sellers = [UserId::generate(), UserId::generate()];
        let stores = [
            (StoreId::generate(), "adire-house", "Adire House", "Lagos", 4_000),
            (StoreId::generate(), "kano-leather", "Kano Leather", "Kano", 12_500),
        ];

        for ((id, slug, name, city, price), owner) in stores.into_iter().zip(sellers) {
            let store = json!({
                "id": id, "owner_id": owner, "slug": slug, "name": name,
                "city": city, "state": city, "country": "NG", "currency": "NGN"
            });
            fake.seed("stores", [store]);
            fake.seed(
                "cart_items",
                [json!({
                    "id": CartItemId::generate(),
                    "user_id": buyer.id,
                    "product_id": ProductId::generate(),
                    "quantity": 1,
                    "product": {
                        "id": ProductId::generate(), "store_id": id, "title": format!("{name} item"),
                        "price": price.to_string(), "currency": "NGN", "weight_kg": "1",
                        "created_at": "2026-03-01T12:00:00Z",
                        "store": { "id": id, "slug": slug, "name": name }
                    }
                })],
            );
        }
        fake.seed(
            "wallets",
            [json!({ "user_id": buyer.id, "balance": buyer_balance, "currency": "NGN" })],
        );

        let state = AppState::from_parts(
            test_config(),
            fake.start().await,
            Gateways::from_clients(None, None),
        );
        Market {
            fake,
            state,
            buyer,
            sellers,
        }
    }

    fn decimal(value: &Value) -> Decimal {
        value.as_str().unwrap().parse().unwrap()
    }

    fn balance(fake: &FakeBackend, user: UserId) -> Decimal {
        fake.rows_where("wallets", "user_id", &user.to_string())
            .first()
            .map_or(Decimal::ZERO, |w| decimal(&w["balance"]))
    }

    fn ledger(fake: &FakeBackend, kind: TransactionKind) -> Vec<Value> {
        fake.rows_where("transactions", "kind", kind.as_str())
    }

    fn statuses(fake: &FakeBackend) -> Vec<String> {
        fake.rows("orders")
            .iter()
            .map(|o| o["status"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_wallet_checkout_pays_each_seller_and_clears_cart() {
        let m = market("100000").await;
        let outcome = CheckoutService::new(&m.state)
            .place_order(&m.buyer, &address(), PaymentMethod::Wallet)
            .await
            .unwrap();

        let CheckoutOutcome::Paid(order_ids) = outcome else {
            panic!("wallet checkout should settle on the spot");
        };
        assert_eq!(order_ids.len(), 2);
        assert_eq!(statuses(&m.fake), ["paid", "paid"]);

        let orders = m.fake.rows("orders");
        let total: Decimal = orders.iter().map(|o| decimal(&o["total"])).sum();
        assert_eq!(balance(&m.fake, m.buyer.id), Decimal::from(100_000) - total);
        assert_eq!(ledger(&m.fake, TransactionKind::Purchase).len(), 1);

        let sales = ledger(&m.fake, TransactionKind::Sale);
        assert_eq!(sales.len(), 2);
        for order in &orders {
            let id: OrderId = serde_json::from_value(order["id"].clone()).unwrap();
            assert!(sales.iter().any(|t| t["reference"] == sale_reference(id).as_str()));
        }
        let earned: Decimal = m.sellers.iter().map(|s| balance(&m.fake, *s)).sum();
        assert_eq!(earned, total);

        assert!(m.fake.rows("cart_items").is_empty());
    }

    #[tokio::test]
    async fn test_wallet_checkout_short_of_funds_cancels_orders() {
        let m = market("10").await;
        let result = CheckoutService::new(&m.state)
            .place_order(&m.buyer, &address(), PaymentMethod::Wallet)
            .await;

        assert!(matches!(result, Err(AppError::Ledger(_))));
        assert_eq!(statuses(&m.fake), ["cancelled", "cancelled"]);
        assert_eq!(balance(&m.fake, m.buyer.id), Decimal::TEN);
        assert!(m.fake.rows("transactions").is_empty());
        assert_eq!(m.fake.rows("cart_items").len(), 2);
    }

    #[tokio::test]
    async fn test_wallet_checkout_reverses_debit_when_orders_cannot_be_paid() {
        let m = market("100000").await;
        // Marking the orders paid fails; cancelling them afterwards works
        m.fake.fail_next(Method::PATCH, "orders", 1);

        let result = CheckoutService::new(&m.state)
            .place_order(&m.buyer, &address(), PaymentMethod::Wallet)
            .await;

        assert!(result.is_err());
        assert_eq!(statuses(&m.fake), ["cancelled", "cancelled"]);
        assert_eq!(balance(&m.fake, m.buyer.id), Decimal::from(100_000));
        assert_eq!(ledger(&m.fake, TransactionKind::Purchase).len(), 1);
        assert_eq!(ledger(&m.fake, TransactionKind::Refund).len(), 1);
        assert!(ledger(&m.fake, TransactionKind::Sale).is_empty());
        assert_eq!(m.fake.rows("cart_items").len(), 2);
    }

    #[tokio::test]
    async fn test_fulfil_retry_credits_only_sellers_still_owed() {
        let m = market("0").await;
        let stores = m.fake.rows("stores");
        let mut order_ids = Vec::new();
        for store in &stores {
            let id = OrderId::generate();
            order_ids.push(id);
            m.fake.seed(
                "orders",
                [json!({
                    "id": id, "buyer_id": m.buyer.id, "store_id": store["id"],
                    "status": "pending", "currency": "NGN",
                    "subtotal": "5000", "shipping_fee": "1500", "total": "6500",
                    "shipping_address": address(), "payment_method": "card"
                })],
            );
        }
        // The first seller credit loses its balance write
        m.fake.fail_next(Method::PATCH, "wallets", 1);

        let checkout = CheckoutService::new(&m.state);
        let reference = "AGR-ORD-0f8fad5bd9cb469fa16570867728950e";
        assert!(checkout.fulfil(m.buyer.id, &order_ids, reference).await.is_err());
        assert_eq!(statuses(&m.fake), ["paid", "paid"]);
        assert_eq!(ledger(&m.fake, TransactionKind::Sale).len(), 1);

        let paid_now = checkout.fulfil(m.buyer.id, &order_ids, reference).await.unwrap();
        assert!(paid_now.is_empty());
        assert_eq!(ledger(&m.fake, TransactionKind::Sale).len(), 2);
        for seller in m.sellers {
            assert_eq!(balance(&m.fake, seller), Decimal::from(6_500));
        }

        checkout.fulfil(m.buyer.id, &order_ids, reference).await.unwrap();
        assert_eq!(ledger(&m.fake, TransactionKind::Sale).len(), 2);
    }
}

//! Admin panel: accounts, orders and money movements.
//!
//! Every handler requires the admin role. Reads go through the service key
//! so admins see rows that row-level security would hide.

use agora_core::{
    AccountStatus, OrderId, OrderStatus, TransactionKind, TransactionStatus, UserId, UserRole,
};
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use super::orders::apply_transition;
use super::{PageContext, finish};
use crate::backend::{Access, BackendError};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::models::{CurrentUser, Order, Payment, Profile, Transaction};
use crate::services::WalletService;
use crate::state::AppState;

/// Rows per admin list page.
const PAGE_SIZE: usize = 50;

/// `?page=` plus an optional filter value.
///
/// Filters arrive as text so an empty `<select>` value means "all".
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub filter: Option<String>,
}

impl ListQuery {
    /// Zero-based page number.
    fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1) - 1
    }

    fn offset(&self) -> usize {
        self.page().saturating_mul(PAGE_SIZE)
    }

    /// The filter parsed as `T`; blank or unknown values mean no filter.
    fn filter<T: std::str::FromStr>(&self) -> Option<T> {
        self.filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .and_then(|f| f.parse().ok())
    }
}

/// Previous/next page numbers for list templates (1-based).
#[derive(Debug, Clone)]
pub struct Pager {
    pub page: usize,
    pub has_prev: bool,
    pub has_next: bool,
    /// Filter carried over to the previous/next links, e.g. `&filter=paid`.
    pub query: String,
}

impl Pager {
    fn new(query: &ListQuery, rows: usize) -> Self {
        let page = query.page() + 1;
        let filter = query
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| format!("&filter={}", urlencoding::encode(f)))
            .unwrap_or_default();
        Self {
            page,
            has_prev: page > 1,
            has_next: rows == PAGE_SIZE,
            query: filter,
        }
    }
}

// =============================================================================
// Dashboard
// =============================================================================

/// Order counts by status.
#[derive(Debug, Clone, Default)]
pub struct OrderCounts {
    pub total: u64,
    pub awaiting_payment: u64,
    pub to_ship: u64,
    pub in_transit: u64,
}

/// Dashboard template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub ctx: PageContext,
    pub counts: OrderCounts,
    pub payments: Vec<Payment>,
    pub pending_withdrawals: Vec<Transaction>,
}

/// Admin landing page.
#[instrument(skip(state, ctx, _admin))]
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ctx: PageContext,
) -> Result<impl IntoResponse> {
    let backend = state.backend();
    let (total, awaiting_payment, to_ship, in_transit) = tokio::try_join!(
        backend.count_orders(None),
        backend.count_orders(Some(OrderStatus::Pending)),
        backend.count_orders(Some(OrderStatus::Paid)),
        backend.count_orders(Some(OrderStatus::Shipped)),
    )?;
    let (payments, withdrawals) = tokio::try_join!(
        backend.list_payments(None, 0, 10),
        backend.list_transactions(Some(TransactionKind::Withdrawal), 0, PAGE_SIZE),
    )?;
    let pending_withdrawals = withdrawals
        .into_iter()
        .filter(|t| t.status == TransactionStatus::Pending)
        .collect();

    Ok(DashboardTemplate {
        ctx,
        counts: OrderCounts {
            total,
            awaiting_payment,
            to_ship,
            in_transit,
        },
        payments,
        pending_withdrawals,
    })
}

// =============================================================================
// Users
// =============================================================================

/// Users list template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/users.html")]
pub struct UsersTemplate {
    pub ctx: PageContext,
    pub users: Vec<Profile>,
    pub roles: [UserRole; 3],
    pub pager: Pager,
}

/// Every account, newest first.
#[instrument(skip(state, ctx, _admin))]
pub async fn users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ctx: PageContext,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let users = state
        .backend()
        .list_profiles(query.offset(), PAGE_SIZE)
        .await?;
    Ok(UsersTemplate {
        ctx,
        pager: Pager::new(&query, users.len()),
        users,
        roles: [UserRole::Member, UserRole::Seller, UserRole::Admin],
    })
}

fn refuse_self(admin: &CurrentUser, target: UserId, action: &str) -> Result<()> {
    if admin.id == target {
        return Err(AppError::BadRequest(format!("You can't {action} your own account")));
    }
    Ok(())
}

fn missing_user(e: BackendError) -> AppError {
    match e {
        BackendError::NotFound(_) => AppError::NotFound("user".to_string()),
        other => other.into(),
    }
}

async fn set_status(
    state: &AppState,
    admin: &CurrentUser,
    target: UserId,
    status: AccountStatus,
) -> Result<Profile> {
    refuse_self(admin, target, "change the status of")?;
    let profile = state
        .backend()
        .set_account_status(target, status)
        .await
        .map_err(missing_user)?;
    info!(admin = %admin.id, user = %target, status = %status, "Account status changed");
    Ok(profile)
}

/// Suspend an account. Its session is refused on next use.
pub async fn ban(
    State(state): State<AppState>,
    session: Session,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
) -> Response {
    let result = set_status(&state, &admin, id, AccountStatus::Banned).await;
    finish(&session, result, "Account suspended", "/admin/users", "/admin/users").await
}

/// Lift a suspension.
pub async fn unban(
    State(state): State<AppState>,
    session: Session,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
) -> Response {
    let result = set_status(&state, &admin, id, AccountStatus::Active).await;
    finish(&session, result, "Account restored", "/admin/users", "/admin/users").await
}

/// Role change form data.
#[derive(Debug, Deserialize)]
pub struct RoleForm {
    pub role: UserRole,
}

/// Change an account's role.
pub async fn set_role(
    State(state): State<AppState>,
    session: Session,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
    Form(form): Form<RoleForm>,
) -> Response {
    let result = match refuse_self(&admin, id, "change the role of") {
        Ok(()) => state
            .backend()
            .set_role(id, form.role)
            .await
            .map_err(missing_user),
        Err(e) => Err(e),
    };
    if result.is_ok() {
        info!(admin = %admin.id, user = %id, role = %form.role, "Role changed");
    }
    let message = format!("Role set to {}", form.role);
    finish(&session, result, &message, "/admin/users", "/admin/users").await
}

// =============================================================================
// Orders
// =============================================================================

/// Orders list template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/orders.html")]
pub struct AdminOrdersTemplate {
    pub ctx: PageContext,
    pub orders: Vec<Order>,
    pub status: Option<OrderStatus>,
    pub statuses: [OrderStatus; 6],
    pub pager: Pager,
}

impl AdminOrdersTemplate {
    /// Statuses `order` may move to from here.
    #[must_use]
    pub fn next_statuses(&self, order: &Order) -> Vec<OrderStatus> {
        self.statuses
            .into_iter()
            .filter(|next| order.status.can_transition_to(*next))
            .collect()
    }

    #[must_use]
    pub fn is_selected(&self, status: &OrderStatus) -> bool {
        self.status == Some(*status)
    }
}

/// Every order, optionally filtered by status.
#[instrument(skip(state, ctx, _admin))]
pub async fn orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ctx: PageContext,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let status = query.filter::<OrderStatus>();
    let orders = state
        .backend()
        .list_orders(status, query.offset(), PAGE_SIZE)
        .await?;
    Ok(AdminOrdersTemplate {
        ctx,
        pager: Pager::new(&query, orders.len()),
        orders,
        status,
        statuses: [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ],
    })
}

/// Status change form data.
#[derive(Debug, Deserialize)]
pub struct OrderStatusForm {
    pub status: OrderStatus,
}

async fn admin_transition(state: &AppState, id: OrderId, next: OrderStatus) -> Result<Order> {
    let backend = state.backend();
    let order = backend
        .order_by_id(id, Access::Service)
        .await
        .map_err(|e| match e {
            BackendError::NotFound(_) => AppError::NotFound("order".to_string()),
            other => other.into(),
        })?;

    // The buyer is credited before the order moves, so a failed credit leaves
    // the order refundable. The credit is keyed by order; a retry pays once.
    if next == OrderStatus::Refunded {
        if !order.status.can_transition_to(next) {
            return Err(AppError::BadRequest(format!(
                "A {} order can't be marked {next}",
                order.status
            )));
        }
        if let Err(e) = WalletService::new(state).refund_order(&order).await {
            warn!(error = %e, order_id = %order.id, "Wallet credit for refund failed");
            sentry::capture_error(&e);
            return Err(e);
        }
    }
    apply_transition(backend, &order, next, Access::Service).await
}

/// Apply any valid transition to an order.
#[instrument(skip(state, session, admin), fields(admin = %admin.id))]
pub async fn update_order_status(
    State(state): State<AppState>,
    session: Session,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Form(form): Form<OrderStatusForm>,
) -> Response {
    let result = admin_transition(&state, id, form.status).await;
    let message = format!("Order marked {}", form.status);
    finish(&session, result, &message, "/admin/orders", "/admin/orders").await
}

// =============================================================================
// Money
// =============================================================================

/// Transactions and payments template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/transactions.html")]
pub struct TransactionsTemplate {
    pub ctx: PageContext,
    pub transactions: Vec<Transaction>,
    pub payments: Vec<Payment>,
    pub kind: Option<TransactionKind>,
    pub kinds: [TransactionKind; 7],
    pub pager: Pager,
}

impl TransactionsTemplate {
    #[must_use]
    pub fn is_selected(&self, kind: &TransactionKind) -> bool {
        self.kind == Some(*kind)
    }
}

/// Wallet movements (filterable by kind) next to gateway payments.
#[instrument(skip(state, ctx, _admin))]
pub async fn transactions(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ctx: PageContext,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let kind = query.filter::<TransactionKind>();
    let backend = state.backend();
    let (transactions, payments) = tokio::try_join!(
        backend.list_transactions(kind, query.offset(), PAGE_SIZE),
        backend.list_payments(None, 0, PAGE_SIZE),
    )?;
    Ok(TransactionsTemplate {
        ctx,
        pager: Pager::new(&query, transactions.len()),
        transactions,
        payments,
        kind,
        kinds: [
            TransactionKind::Deposit,
            TransactionKind::Withdrawal,
            TransactionKind::Purchase,
            TransactionKind::Sale,
            TransactionKind::Refund,
            TransactionKind::TransferIn,
            TransactionKind::TransferOut,
        ],
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::config::tests::test_config;
    use crate::payments::Gateways;
    use agora_core::shipping::ShippingAddress;
    use agora_core::StoreId;
    use axum::http::Method;

    #[test]
    fn test_list_query_paging() {
        let first = ListQuery::default();
        assert_eq!(first.offset(), 0);

        let third = ListQuery {
            page: Some(3),
            filter: None,
        };
        assert_eq!(third.offset(), 2 * PAGE_SIZE);

        let zero = ListQuery {
            page: Some(0),
            filter: None,
        };
        assert_eq!(zero.offset(), 0);
    }

    #[test]
    fn test_list_query_filter() {
        let query = ListQuery {
            page: None,
            filter: Some("shipped".to_string()),
        };
        assert_eq!(query.filter::<OrderStatus>(), Some(OrderStatus::Shipped));

        let blank = ListQuery {
            page: None,
            filter: Some(" ".to_string()),
        };
        assert_eq!(blank.filter::<OrderStatus>(), None);

        let unknown = ListQuery {
            page: None,
            filter: Some("lost".to_string()),
        };
        assert_eq!(unknown.filter::<TransactionKind>(), None);
    }

    #[test]
    fn test_pager() {
        let query = ListQuery {
            page: Some(2),
            filter: None,
        };
        let pager = Pager::new(&query, PAGE_SIZE);
        assert_eq!(pager.page, 2);
        assert!(pager.has_prev);
        assert!(pager.has_next);

        assert!(pager.query.is_empty());

        let last = Pager::new(&ListQuery::default(), 3);
        assert!(!last.has_prev);
        assert!(!last.has_next);
    }

    #[test]
    fn test_pager_keeps_filter() {
        let query = ListQuery {
            page: Some(1),
            filter: Some("transfer_in".to_string()),
        };
        assert_eq!(Pager::new(&query, 0).query, "&filter=transfer_in");
    }

    async fn refund_fixture(order_status: &str) -> (FakeBackend, AppState, OrderId, String) {
        let fake = FakeBackend::new();
        let id = OrderId::generate();
        let buyer = UserId::generate().to_string();
        fake.seed(
            "orders",
            [serde_json::json!({
                "id": id, "buyer_id": buyer, "store_id": StoreId::generate(),
                "status": order_status, "currency": "NGN",
                "subtotal": "8000", "shipping_fee": "1500", "total": "9500",
                "shipping_address": ShippingAddress::default(), "payment_method": "card"
            })],
        );
        let state = AppState::from_parts(
            test_config(),
            fake.start().await,
            Gateways::from_clients(None, None),
        );
        (fake, state, id, buyer)
    }

    #[tokio::test]
    async fn test_refund_credits_buyer_before_order_moves() {
        let (fake, state, id, buyer) = refund_fixture("paid").await;
        fake.fail_next(Method::PATCH, "wallets", 1);

        assert!(admin_transition(&state, id, OrderStatus::Refunded).await.is_err());
        assert_eq!(fake.rows("orders")[0]["status"], "paid");
        assert!(fake.rows("transactions").is_empty());

        let order = admin_transition(&state, id, OrderStatus::Refunded).await.unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
        let refunds = fake.rows_where("transactions", "kind", "refund");
        assert_eq!(refunds.len(), 1);
        let wallet = &fake.rows_where("wallets", "user_id", &buyer)[0];
        assert_eq!(wallet["balance"], "9500");
    }

    #[tokio::test]
    async fn test_refund_of_unpaid_order_credits_nobody() {
        let (fake, state, id, _) = refund_fixture("pending").await;
        let result = admin_transition(&state, id, OrderStatus::Refunded).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(fake.rows("transactions").is_empty());
        assert_eq!(fake.rows("orders")[0]["status"], "pending");
    }
}

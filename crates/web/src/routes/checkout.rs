//! Checkout and the gateway return page.

use agora_core::cart::CartSummary;
use agora_core::payments::{self, PaymentMethod};
use agora_core::shipping::{ShippingAddress, ShippingQuote};
use agora_core::{Currency, Money};
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{instrument, warn};

use super::{PageContext, flash_or_fail, redirect_with_success, set_flash};
use crate::backend::Access;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{Flash, session_keys};
use crate::services::{CheckoutOutcome, CheckoutService, Settlement, SettlementService};
use crate::state::AppState;

/// Payment methods that can be routed in `currency` with the configured
/// gateways, in display order.
#[must_use]
pub fn available_methods(state: &AppState, currency: Currency) -> Vec<PaymentMethod> {
    let gateways = state.gateways().available();
    PaymentMethod::ALL
        .into_iter()
        .filter(|m| payments::route(*m, currency, &gateways).is_ok())
        .collect()
}

/// Checkout form data.
#[derive(Debug, Deserialize)]
pub struct CheckoutForm {
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    pub city: String,
    pub state: String,
    pub country: String,
    #[serde(default)]
    pub postal_code: String,
    pub method: PaymentMethod,
}

fn blank_to_none(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl CheckoutForm {
    fn address(&self) -> ShippingAddress {
        ShippingAddress {
            full_name: self.full_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            line1: self.line1.trim().to_string(),
            line2: blank_to_none(&self.line2),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            country: self.country.trim().to_ascii_uppercase(),
            postal_code: blank_to_none(&self.postal_code),
        }
    }
}

/// Query parameters gateways append when sending the buyer back.
///
/// Paystack uses `reference` (and `trxref`), Flutterwave uses `tx_ref`.
#[derive(Debug, Default, Deserialize)]
pub struct GatewayReturn {
    pub reference: Option<String>,
    pub trxref: Option<String>,
    pub tx_ref: Option<String>,
}

impl GatewayReturn {
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        [&self.reference, &self.trxref, &self.tx_ref]
            .into_iter()
            .flatten()
            .map(|r| r.trim())
            .find(|r| !r.is_empty())
    }
}

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/show.html")]
pub struct CheckoutTemplate {
    pub ctx: PageContext,
    pub summary: CartSummary,
    pub address: ShippingAddress,
    pub quote: Option<ShippingQuote>,
    pub quote_error: Option<String>,
    pub grand_total: Option<Money>,
    pub methods: Vec<PaymentMethod>,
}

/// Display checkout: cart, address form and payment choices.
///
/// The last address entered is kept in the session and quoted up front.
#[instrument(skip(state, session, user, ctx), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    ctx: PageContext,
) -> Result<Response> {
    let checkout = CheckoutService::new(&state);
    let access = Access::User(&user.access_token);
    let summary = checkout.summary(user.id, access).await?;
    if summary.is_empty() {
        set_flash(&session, Flash::error("Your cart is empty")).await;
        return Ok(Redirect::to("/cart").into_response());
    }

    let address: Option<ShippingAddress> = session
        .get(session_keys::SHIPPING_ADDRESS)
        .await
        .ok()
        .flatten();

    let (quote, quote_error) = match &address {
        Some(address) => match checkout.quote(user.id, address, access).await {
            Ok((_, quote)) => (Some(quote), None),
            Err(e) if e.is_user_facing() => (None, Some(e.user_message())),
            Err(e) => return Err(e),
        },
        None => (None, None),
    };
    let grand_total = quote
        .as_ref()
        .and_then(|q| q.grand_total(summary.subtotal).ok());
    let methods = available_methods(&state, summary.currency);

    Ok(CheckoutTemplate {
        ctx,
        address: address.unwrap_or_default(),
        quote,
        quote_error,
        grand_total,
        methods,
        summary,
    }
    .into_response())
}

/// Place the order and start payment.
#[instrument(skip(state, session, user, form), fields(user_id = %user.id, method = %form.method))]
pub async fn place(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<CheckoutForm>,
) -> Response {
    let address = form.address();
    if let Err(e) = session.insert(session_keys::SHIPPING_ADDRESS, &address).await {
        warn!(error = %e, "Failed to remember shipping address");
    }

    match CheckoutService::new(&state)
        .place_order(&user, &address, form.method)
        .await
    {
        Ok(CheckoutOutcome::Paid(_)) => {
            redirect_with_success(&session, "/orders", "Paid from your wallet. Thank you!").await
        }
        Ok(CheckoutOutcome::Redirect(url)) => Redirect::to(&url).into_response(),
        Err(e) => flash_or_fail(&session, e, "/checkout").await,
    }
}

/// Settle the reference on a gateway return and pick the notice to show.
pub(super) async fn settle_return(
    state: &AppState,
    query: &GatewayReturn,
) -> Result<Settlement> {
    let reference = query
        .reference()
        .ok_or_else(|| AppError::BadRequest("Missing payment reference".to_string()))?;
    SettlementService::new(state).settle(reference).await
}

/// Gateway return after paying for an order.
#[instrument(skip(state, session, _user))]
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(_user): RequireAuth,
    Query(query): Query<GatewayReturn>,
) -> Response {
    match settle_return(&state, &query).await {
        Ok(Settlement::Succeeded { .. }) => {
            redirect_with_success(&session, "/orders", "Payment received. Thank you!").await
        }
        Ok(Settlement::Pending) => {
            redirect_with_success(
                &session,
                "/orders",
                "Your payment is still processing. Your order will update once it clears.",
            )
            .await
        }
        Ok(Settlement::Failed) => {
            set_flash(
                &session,
                Flash::error("Payment was not completed. Your cart is still here."),
            )
            .await;
            Redirect::to("/cart").into_response()
        }
        Err(e) => flash_or_fail(&session, e, "/orders").await,
    }
}

//! Wallet page and its forms.

use agora_core::payments::PaymentMethod;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::checkout::{GatewayReturn, available_methods, settle_return};
use super::{PageContext, finish, flash_or_fail, redirect_with_success, set_flash};
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::Flash;
use crate::services::{Payout, Settlement, WalletOverview, WalletService};
use crate::state::AppState;

/// Add funds form data.
#[derive(Debug, Deserialize)]
pub struct FundForm {
    pub amount: String,
    pub method: PaymentMethod,
}

/// Withdrawal form data.
#[derive(Debug, Deserialize)]
pub struct WithdrawForm {
    pub amount: String,
    pub bank_name: String,
    pub account_number: String,
}

/// Transfer form data.
#[derive(Debug, Deserialize)]
pub struct TransferForm {
    pub recipient: String,
    pub amount: String,
}

/// Wallet page template.
#[derive(Template, WebTemplate)]
#[template(path = "wallet/show.html")]
pub struct WalletTemplate {
    pub ctx: PageContext,
    pub overview: WalletOverview,
    pub fund_methods: Vec<PaymentMethod>,
}

/// Display balance and recent movements.
#[instrument(skip(state, user, ctx), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ctx: PageContext,
) -> Result<impl IntoResponse> {
    let overview = WalletService::new(&state).overview(user.id).await?;
    let fund_methods = available_methods(&state, overview.wallet.currency)
        .into_iter()
        .filter(|m| *m != PaymentMethod::Wallet)
        .collect();
    Ok(WalletTemplate {
        ctx,
        overview,
        fund_methods,
    })
}

/// Start a top-up through a gateway.
#[instrument(skip(state, session, user, form), fields(user_id = %user.id))]
pub async fn fund(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<FundForm>,
) -> Response {
    match WalletService::new(&state)
        .fund(&user, &form.amount, form.method)
        .await
    {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => flash_or_fail(&session, e, "/wallet").await,
    }
}

/// Request a withdrawal to a bank account.
#[instrument(skip(state, session, user, form), fields(user_id = %user.id))]
pub async fn withdraw(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<WithdrawForm>,
) -> Response {
    let payout = Payout {
        bank_name: &form.bank_name,
        account_number: &form.account_number,
    };
    let result = WalletService::new(&state)
        .withdraw(user.id, &form.amount, &payout)
        .await;
    finish(
        &session,
        result,
        "Withdrawal requested. It will reach your bank once processed.",
        "/wallet",
        "/wallet",
    )
    .await
}

/// Send money to another user.
#[instrument(skip(state, session, user, form), fields(user_id = %user.id))]
pub async fn transfer(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<TransferForm>,
) -> Response {
    match WalletService::new(&state)
        .transfer(&user, &form.recipient, &form.amount)
        .await
    {
        Ok(sent) => {
            let message = format!("Sent {}", sent.amount());
            redirect_with_success(&session, "/wallet", &message).await
        }
        Err(e) => flash_or_fail(&session, e, "/wallet").await,
    }
}

/// Gateway return after a top-up.
#[instrument(skip(state, session, _user))]
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(_user): RequireAuth,
    Query(query): Query<GatewayReturn>,
) -> Response {
    let flash = match settle_return(&state, &query).await {
        Ok(Settlement::Succeeded { .. }) => Flash::success("Funds added to your wallet"),
        Ok(Settlement::Pending) => {
            Flash::success("Your top-up is still processing. Your balance will update once it clears.")
        }
        Ok(Settlement::Failed) => Flash::error("The top-up was not completed"),
        Err(e) => return flash_or_fail(&session, e, "/wallet").await,
    };
    set_flash(&session, flash).await;
    Redirect::to("/wallet").into_response()
}

//! JSON endpoints used by checkout scripts.
//!
//! Errors come back as `{"error": "..."}` with the matching status code.

use agora_core::Money;
use agora_core::shipping::{ShippingAddress, ShippingQuote};
use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;
use tracing::{instrument, warn};

use crate::backend::{Access, BackendError};
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::session_keys;
use crate::services::{CheckoutService, Settlement, SettlementService};
use crate::state::AppState;

/// [`AppError`] rendered as a JSON body.
#[derive(Debug)]
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if !self.0.is_user_facing() {
            sentry::capture_error(&self.0);
            tracing::error!(error = %self.0, "API error");
        }
        (status, Json(json!({ "error": self.0.user_message() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Shipping and totals for the session user's cart.
#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub subtotal: Money,
    pub shipping: ShippingQuote,
    pub total: Money,
}

/// Quote shipping for the cart to the posted address.
///
/// The address is remembered for the checkout form.
#[instrument(skip(state, session, user, address), fields(user_id = %user.id))]
pub async fn shipping_quote(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Json(address): Json<ShippingAddress>,
) -> ApiResult<QuoteResponse> {
    let (summary, shipping) = CheckoutService::new(&state)
        .quote(user.id, &address, Access::User(&user.access_token))
        .await?;
    let total = shipping
        .grand_total(summary.subtotal)
        .map_err(AppError::from)?;

    if let Err(e) = session.insert(session_keys::SHIPPING_ADDRESS, &address).await {
        warn!(error = %e, "Failed to remember shipping address");
    }

    Ok(Json(QuoteResponse {
        subtotal: summary.subtotal,
        shipping,
        total,
    }))
}

/// `?reference=` for [`verify_payment`].
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub reference: String,
}

/// Settlement state of one of the user's payments.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub reference: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<&'static str>,
    pub order_ids: Vec<agora_core::OrderId>,
}

impl VerifyResponse {
    fn new(reference: String, outcome: Settlement) -> Self {
        match outcome {
            Settlement::Succeeded { purpose, order_ids } => Self {
                reference,
                status: "succeeded",
                purpose: Some(purpose.as_str()),
                order_ids,
            },
            Settlement::Pending => Self {
                reference,
                status: "pending",
                purpose: None,
                order_ids: Vec::new(),
            },
            Settlement::Failed => Self {
                reference,
                status: "failed",
                purpose: None,
                order_ids: Vec::new(),
            },
        }
    }
}

/// Verify and settle a payment reference belonging to the session user.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn verify_payment(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<VerifyQuery>,
) -> ApiResult<VerifyResponse> {
    let reference = query.reference.trim().to_string();
    let not_found = || AppError::NotFound("payment".to_string());

    let payment = state
        .backend()
        .payment_by_reference(&reference)
        .await
        .map_err(|e| match e {
            BackendError::NotFound(_) => not_found(),
            other => other.into(),
        })?;
    if payment.user_id != user.id {
        return Err(not_found().into());
    }

    let outcome = SettlementService::new(&state).settle(&reference).await?;
    Ok(Json(VerifyResponse::new(reference, outcome)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use agora_core::OrderId;
    use agora_core::payments::PaymentPurpose;
    use axum::http::StatusCode;

    #[test]
    fn test_verify_response_shapes() {
        let id = OrderId::generate();
        let ok = VerifyResponse::new(
            "AGR-ORD-x".to_string(),
            Settlement::Succeeded {
                purpose: PaymentPurpose::Order,
                order_ids: vec![id],
            },
        );
        let body = serde_json::to_value(&ok).unwrap();
        assert_eq!(body["status"], "succeeded");
        assert_eq!(body["purpose"], "order");
        assert_eq!(body["order_ids"][0], id.to_string());

        let pending = serde_json::to_value(VerifyResponse::new(
            "AGR-ORD-x".to_string(),
            Settlement::Pending,
        ))
        .unwrap();
        assert_eq!(pending["status"], "pending");
        assert!(pending.get("purpose").is_none());
    }

    #[tokio::test]
    async fn test_api_error_is_json() {
        let response = ApiError::from(AppError::NotFound("payment".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Payment not found");
    }
}

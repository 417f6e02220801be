//! Gateway webhooks.
//!
//! Webhooks only say "look at this reference"; the payment is always
//! re-verified with the gateway by [`SettlementService`]. Unknown references
//! are acknowledged so the gateway stops retrying; backend failures are not,
//! so it retries later.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use tracing::{debug, info, instrument, warn};

use crate::backend::BackendError;
use crate::error::AppError;
use crate::services::SettlementService;
use crate::state::AppState;

/// Paystack event that completes a payment.
const PAYSTACK_CHARGE_SUCCESS: &str = "charge.success";

/// Flutterwave event that completes a payment.
const FLUTTERWAVE_CHARGE_COMPLETED: &str = "charge.completed";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest(format!("Missing {name} header")))
}

async fn settle(state: &AppState, reference: &str) -> Result<StatusCode, AppError> {
    match SettlementService::new(state).settle(reference).await {
        Ok(outcome) => {
            info!(reference, ?outcome, "Webhook settled payment");
            Ok(StatusCode::OK)
        }
        Err(AppError::Backend(BackendError::NotFound(_))) => {
            warn!(reference, "Webhook for unknown payment reference");
            Ok(StatusCode::OK)
        }
        Err(e) => Err(e),
    }
}

/// Handle a Paystack webhook (`x-paystack-signature`: HMAC-SHA512 of the body).
#[instrument(skip(state, headers, body))]
pub async fn paystack(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let signature = header(&headers, "x-paystack-signature")?;
    let event = state
        .gateways()
        .paystack()?
        .verify_webhook(&body, signature)?;

    if event.event != PAYSTACK_CHARGE_SUCCESS {
        debug!(event = %event.event, "Ignoring Paystack event");
        return Ok(StatusCode::OK);
    }
    settle(&state, &event.data.reference).await
}

/// Handle a Flutterwave webhook (`verif-hash`: the configured secret hash).
#[instrument(skip(state, headers, body))]
pub async fn flutterwave(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let hash = header(&headers, "verif-hash")?;
    let event = state
        .gateways()
        .flutterwave()?
        .verify_webhook(&body, hash)?;

    if event.event != FLUTTERWAVE_CHARGE_COMPLETED {
        debug!(event = %event.event, "Ignoring Flutterwave event");
        return Ok(StatusCode::OK);
    }
    settle(&state, &event.data.tx_ref).await
}

//! Settling gateway payments.
//!
//! The return redirect and the webhook both end up here, in either order and
//! possibly more than once. The gateway is always asked about the reference
//! directly; the payment row is then claimed with a conditional update, so
//! only one caller ever fulfils it. A claimed payment is marked fulfilled
//! only after its orders are paid or its deposit credited; a claim whose
//! fulfilment failed is finished by the next callback or webhook.

use agora_core::payments::PaymentPurpose;
use agora_core::{OrderId, PaymentStatus};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::models::Payment;
use crate::state::AppState;

use super::checkout::CheckoutService;
use super::wallet::WalletService;

/// Result of settling a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Paid; orders fulfilled or wallet credited (now or earlier).
    Succeeded {
        purpose: PaymentPurpose,
        order_ids: Vec<OrderId>,
    },
    /// The gateway has not finished yet.
    Pending,
    /// Declined, abandoned or not matching what was charged.
    Failed,
}

impl Settlement {
    fn succeeded(payment: &Payment) -> Self {
        Self::Succeeded {
            purpose: payment.purpose,
            order_ids: payment.order_ids.clone(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Settlement service.
pub struct SettlementService<'a> {
    state: &'a AppState,
}

impl<'a> SettlementService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Verify `reference` with its gateway and apply the outcome once.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown references and gateway or backend
    /// errors while verifying.
    #[instrument(skip(self))]
    pub async fn settle(&self, reference: &str) -> Result<Settlement> {
        let backend = self.state.backend();
        let payment = backend.payment_by_reference(reference).await?;

        match payment.status {
            PaymentStatus::Succeeded if payment.is_fulfilled() => {
                return Ok(Settlement::succeeded(&payment));
            }
            PaymentStatus::Succeeded => {
                info!("Resuming fulfilment of a claimed payment");
                self.fulfil(&payment).await?;
                return Ok(Settlement::succeeded(&payment));
            }
            PaymentStatus::Failed | PaymentStatus::Abandoned => return Ok(Settlement::Failed),
            PaymentStatus::Pending => {}
        }

        let verified = self
            .state
            .gateways()
            .verify(payment.gateway, reference)
            .await?;

        match verified.status {
            PaymentStatus::Pending => return Ok(Settlement::Pending),
            PaymentStatus::Failed | PaymentStatus::Abandoned => {
                info!(status = %verified.status, "Payment not completed");
                self.abandon(&payment).await?;
                return Ok(Settlement::Failed);
            }
            PaymentStatus::Succeeded => {}
        }

        if let Err(e) = verified.ensure_matches(reference, payment.amount()) {
            warn!(error = %e, "Verified payment does not match the charge");
            sentry::capture_error(&e);
            self.abandon(&payment).await?;
            return Ok(Settlement::Failed);
        }

        let Some(claimed) = backend.claim_payment(reference).await? else {
            // Someone else claimed it between our read and now
            return Ok(Settlement::succeeded(&payment));
        };

        self.fulfil(&claimed).await?;
        info!(purpose = claimed.purpose.as_str(), gateway = %claimed.gateway, "Payment settled");
        Ok(Settlement::succeeded(&claimed))
    }

    /// Pay the orders or credit the deposit, then mark the payment
    /// fulfilled. Safe to repeat after a partial failure.
    async fn fulfil(&self, payment: &Payment) -> Result<()> {
        match payment.purpose {
            PaymentPurpose::Order => {
                CheckoutService::new(self.state)
                    .fulfil(payment.user_id, &payment.order_ids, &payment.reference)
                    .await?;
            }
            PaymentPurpose::WalletFunding => {
                WalletService::new(self.state).deposit(payment).await?;
            }
        }
        self.state
            .backend()
            .mark_payment_fulfilled(&payment.reference)
            .await?;
        Ok(())
    }

    async fn abandon(&self, payment: &Payment) -> Result<()> {
        let backend = self.state.backend();
        backend.fail_payment(&payment.reference).await?;
        if !payment.order_ids.is_empty() {
            backend.cancel_pending_orders(&payment.order_ids).await?;
        }
        Ok(())
    }
}

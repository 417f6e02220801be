//! `payments` table: one row per hosted-checkout attempt.

use agora_core::payments::{Gateway, PaymentMethod, PaymentPurpose, PaymentReference};
use agora_core::{Money, OrderId, PaymentStatus, UserId};
use chrono::Utc;
use serde_json::json;
use tracing::instrument;

use super::{Access, BackendClient, BackendError, Query};
use crate::models::Payment;

impl BackendClient {
    /// Record a payment before redirecting to the gateway.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the reference is already in use.
    #[instrument(skip(self, order_ids), fields(reference = %reference))]
    pub async fn insert_payment(
        &self,
        reference: &PaymentReference,
        user: UserId,
        gateway: Gateway,
        method: PaymentMethod,
        amount: Money,
        order_ids: &[OrderId],
    ) -> Result<Payment, BackendError> {
        self.insert_one(
            "payments",
            &json!({
                "reference": reference.to_string(),
                "user_id": user,
                "purpose": reference.purpose(),
                "gateway": gateway,
                "method": method,
                "amount": amount.amount.to_string(),
                "currency": amount.currency,
                "status": PaymentStatus::Pending,
                "order_ids": order_ids,
            }),
            Access::Service,
        )
        .await
    }

    /// # Errors
    ///
    /// Returns `NotFound` for unknown references.
    pub async fn payment_by_reference(&self, reference: &str) -> Result<Payment, BackendError> {
        self.select_one(
            &Query::table("payments").eq("reference", reference),
            Access::Service,
        )
        .await
    }

    /// Claim a pending payment for settlement.
    ///
    /// Flips `pending` to `succeeded` in one conditional update. Only the
    /// caller that wins the flip gets the row back; a redirect and a webhook
    /// racing on the same reference settle it once. The row stays
    /// unfulfilled until [`Self::mark_payment_fulfilled`].
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn claim_payment(&self, reference: &str) -> Result<Option<Payment>, BackendError> {
        let query = Query::table("payments")
            .eq("reference", reference)
            .eq("status", PaymentStatus::Pending);
        let rows: Vec<Payment> = self
            .update(
                &query,
                &json!({ "status": PaymentStatus::Succeeded, "settled_at": Utc::now() }),
                Access::Service,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Record that a succeeded payment's orders or deposit went through.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn mark_payment_fulfilled(&self, reference: &str) -> Result<(), BackendError> {
        let query = Query::table("payments")
            .eq("reference", reference)
            .eq("status", PaymentStatus::Succeeded);
        let _: Vec<Payment> = self
            .update(&query, &json!({ "fulfilled_at": Utc::now() }), Access::Service)
            .await?;
        Ok(())
    }

    /// Mark a pending payment failed. Settled payments are left alone.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn fail_payment(&self, reference: &str) -> Result<Option<Payment>, BackendError> {
        let query = Query::table("payments")
            .eq("reference", reference)
            .eq("status", PaymentStatus::Pending);
        let rows: Vec<Payment> = self
            .update(
                &query,
                &json!({ "status": PaymentStatus::Failed, "settled_at": Utc::now() }),
                Access::Service,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Payments for the admin panel, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn list_payments(
        &self,
        purpose: Option<PaymentPurpose>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Payment>, BackendError> {
        let mut query = Query::table("payments")
            .order("created_at", false)
            .offset(offset)
            .limit(limit);
        if let Some(purpose) = purpose {
            query = query.eq("purpose", purpose.as_str());
        }
        self.select(&query, Access::Service).await
    }
}

//! Payment attempts against an invoice.

mod status;

pub use status::{PaymentChannel, PaymentStatus};

use chrono::{DateTime, Utc};
use common::{InvoiceId, Money, Msisdn, PaymentId};
use entity_store::Entity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// A single settlement attempt: either a push we initiated or a passive
/// payment the customer made against the shortcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,

    /// Kept top-level so payments for an invoice can be found with a
    /// store query.
    pub invoice_id: InvoiceId,

    pub channel: PaymentChannel,
    pub status: PaymentStatus,
    pub amount: Money,

    /// The payer's phone number.
    pub msisdn: Msisdn,

    /// Token sent to the provider so replays of the same attempt are
    /// recognizable on their side.
    pub idempotency_key: String,

    /// Number of times this attempt chain has been retried.
    pub retry_count: u32,

    /// Provider correlation id (checkout request id for pushes, the
    /// transaction ref for passive payments). Kept top-level for
    /// callback matching.
    pub correlation_id: Option<String>,

    /// Provider-side request id, informational.
    pub provider_request_id: Option<String>,

    /// Provider receipt once successful.
    pub receipt: Option<String>,

    pub failure_reason: Option<String>,

    /// Raw provider request/callback payloads kept for audit.
    pub raw_request: Option<serde_json::Value>,
    pub raw_callback: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a fresh push attempt. Persist before calling the provider.
    pub fn new_push(invoice_id: InvoiceId, amount: Money, payer: Msisdn) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::generate(),
            invoice_id,
            channel: PaymentChannel::StkPush,
            status: PaymentStatus::Initiated,
            amount,
            msisdn: payer,
            idempotency_key: Uuid::new_v4().to_string(),
            retry_count: 0,
            correlation_id: None,
            provider_request_id: None,
            receipt: None,
            failure_reason: None,
            raw_request: None,
            raw_callback: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an already-successful passive payment. The id derives from
    /// the provider transaction ref, which makes duplicate notifications
    /// collide on the same record.
    pub fn new_passive(
        trans_ref: &str,
        invoice_id: InvoiceId,
        amount: Money,
        payer: Msisdn,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::from_passive_ref(trans_ref),
            invoice_id,
            channel: PaymentChannel::Passive,
            status: PaymentStatus::Success,
            amount,
            msisdn: payer,
            idempotency_key: format!("passive-{trans_ref}"),
            retry_count: 0,
            correlation_id: Some(trans_ref.to_string()),
            provider_request_id: None,
            receipt: Some(trans_ref.to_string()),
            failure_reason: None,
            raw_request: None,
            raw_callback: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Records the provider accepting the push.
    pub fn record_provider_accept(
        &mut self,
        correlation_id: impl Into<String>,
        provider_request_id: impl Into<String>,
        raw_request: serde_json::Value,
    ) {
        self.correlation_id = Some(correlation_id.into());
        self.provider_request_id = Some(provider_request_id.into());
        self.raw_request = Some(raw_request);
        self.updated_at = Utc::now();
    }

    /// Marks the attempt successful.
    pub fn complete(
        &mut self,
        receipt: impl Into<String>,
        raw_callback: serde_json::Value,
    ) -> Result<(), DomainError> {
        if !self.status.can_complete() {
            return Err(self.invalid_transition(PaymentStatus::Success));
        }
        self.status = PaymentStatus::Success;
        self.receipt = Some(receipt.into());
        self.raw_callback = Some(raw_callback);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the attempt failed.
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        raw_callback: Option<serde_json::Value>,
    ) -> Result<(), DomainError> {
        if !self.status.can_fail() {
            return Err(self.invalid_transition(PaymentStatus::Failed));
        }
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.raw_callback = raw_callback;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Re-initiates a failed attempt for a permitted retry: same record,
    /// counter incremented, provider state cleared.
    pub fn reinitiate(&mut self) -> Result<(), DomainError> {
        if self.status != PaymentStatus::Failed {
            return Err(self.invalid_transition(PaymentStatus::Initiated));
        }
        self.status = PaymentStatus::Initiated;
        self.retry_count += 1;
        self.correlation_id = None;
        self.provider_request_id = None;
        self.receipt = None;
        self.failure_reason = None;
        self.raw_callback = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn invalid_transition(&self, to: PaymentStatus) -> DomainError {
        DomainError::InvalidTransition {
            entity: "payment",
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

impl Entity for Payment {
    const KIND: &'static str = "payment";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push() -> Payment {
        Payment::new_push(
            InvoiceId::from_string("INV-1-a"),
            Money::from_cents(150_000),
            Msisdn::parse("254712345678").unwrap(),
        )
    }

    #[test]
    fn fresh_push_is_initiated() {
        let payment = push();
        assert_eq!(payment.status, PaymentStatus::Initiated);
        assert_eq!(payment.retry_count, 0);
        assert!(payment.correlation_id.is_none());
        assert!(!payment.is_terminal());
    }

    #[test]
    fn complete_records_receipt_and_is_terminal() {
        let mut payment = push();
        payment
            .complete("RCPT1", serde_json::json!({"ResultCode": 0}))
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(payment.receipt.as_deref(), Some("RCPT1"));
        assert!(payment.is_terminal());

        // terminal status never changes
        assert!(payment.fail("late failure", None).is_err());
        assert!(payment.complete("RCPT2", serde_json::json!({})).is_err());
    }

    #[test]
    fn fail_then_reinitiate_increments_counter() {
        let mut payment = push();
        payment.record_provider_accept("chk-1", "req-1", serde_json::json!({}));
        payment.fail("Request cancelled by user", None).unwrap();

        payment.reinitiate().unwrap();
        assert_eq!(payment.status, PaymentStatus::Initiated);
        assert_eq!(payment.retry_count, 1);
        assert!(payment.correlation_id.is_none());
        assert!(payment.failure_reason.is_none());
    }

    #[test]
    fn reinitiate_requires_failed() {
        let mut payment = push();
        assert!(payment.reinitiate().is_err());
    }

    #[test]
    fn passive_payment_is_successful_and_deterministic() {
        let a = Payment::new_passive(
            "TXABC",
            InvoiceId::from_string("INV-1-a"),
            Money::from_cents(400_000),
            Msisdn::parse("254712345678").unwrap(),
        );
        assert_eq!(a.status, PaymentStatus::Success);
        assert_eq!(a.channel, PaymentChannel::Passive);
        assert_eq!(a.correlation_id.as_deref(), Some("TXABC"));
        assert_eq!(a.id, PaymentId::from_passive_ref("TXABC"));
    }
}

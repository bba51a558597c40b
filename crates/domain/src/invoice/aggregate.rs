//! The invoice aggregate.

use chrono::{DateTime, Utc};
use common::{InvoiceId, Money, Msisdn, PaymentId};
use entity_store::Entity;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::instrument::PayoutInstrument;
use crate::parse::DueDate;

use super::{InvoiceStatus, InvoiceTotals, LineItem, MIN_INVOICE_TOTAL_CENTS};

/// An invoice issued by a merchant to a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub merchant_msisdn: Msisdn,
    pub merchant_name: String,
    pub customer_msisdn: Msisdn,
    pub customer_name: String,
    pub line_items: Vec<LineItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub due: DueDate,
    pub instrument: PayoutInstrument,

    /// Account reference customers quote when paying the shortcode
    /// directly. Kept top-level so passive notifications can be matched
    /// with a store query.
    pub account_reference: String,

    /// Shortcode of the payout instrument, denormalized for matching.
    pub shortcode: String,

    /// Whether customer-initiated settlement against the shortcode is
    /// accepted for this invoice.
    pub passive_enabled: bool,

    pub status: InvoiceStatus,

    /// The push payment currently in flight, if any. Guarded by the
    /// record version: claiming it is a compare-and-swap.
    pub active_payment: Option<PaymentId>,

    /// Provider receipt or transaction ref once settled.
    pub pay_ref: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates a new pending invoice. Totals are computed from the line
    /// items; the minimum-total floor is enforced here.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        merchant_msisdn: Msisdn,
        merchant_name: impl Into<String>,
        customer_msisdn: Msisdn,
        customer_name: impl Into<String>,
        line_items: Vec<LineItem>,
        tax_elected: bool,
        due: DueDate,
        instrument: PayoutInstrument,
    ) -> Result<Self, DomainError> {
        let totals = InvoiceTotals::compute(&line_items, tax_elected);
        if totals.total.cents() < MIN_INVOICE_TOTAL_CENTS {
            return Err(DomainError::Validation(format!(
                "invoice total must be at least {}",
                Money::from_cents(MIN_INVOICE_TOTAL_CENTS)
            )));
        }

        let id = InvoiceId::generate();
        let account_reference = match &instrument {
            PayoutInstrument::Paybill { account, .. } => account.clone(),
            _ => id.as_str().chars().take(20).collect(),
        };
        let shortcode = instrument.shortcode().to_string();
        let passive_enabled = instrument.supports_passive_settlement();
        let now = Utc::now();

        Ok(Self {
            id,
            merchant_msisdn,
            merchant_name: merchant_name.into(),
            customer_msisdn,
            customer_name: customer_name.into(),
            line_items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            due,
            instrument,
            account_reference,
            shortcode,
            passive_enabled,
            status: InvoiceStatus::Pending,
            active_payment: None,
            pay_ref: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Confirms delivery to the customer. Repeat confirmations on an
    /// already-sent invoice are a no-op.
    pub fn mark_delivered(&mut self) -> Result<(), DomainError> {
        if self.status == InvoiceStatus::Sent {
            return Ok(());
        }
        if !self.status.can_send() {
            return Err(self.invalid_transition(InvoiceStatus::Sent));
        }
        self.status = InvoiceStatus::Sent;
        Ok(())
    }

    /// Marks the invoice settled.
    pub fn mark_paid(&mut self, pay_ref: impl Into<String>) -> Result<(), DomainError> {
        if !self.status.can_pay() {
            return Err(self.invalid_transition(InvoiceStatus::Paid));
        }
        self.status = InvoiceStatus::Paid;
        self.pay_ref = Some(pay_ref.into());
        Ok(())
    }

    /// Records that the in-flight payment attempt failed.
    pub fn mark_failed(&mut self) -> Result<(), DomainError> {
        if !self.status.can_fail() {
            return Err(self.invalid_transition(InvoiceStatus::Failed));
        }
        self.status = InvoiceStatus::Failed;
        Ok(())
    }

    /// Cancels the invoice.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        if !self.status.can_cancel() {
            return Err(self.invalid_transition(InvoiceStatus::Cancelled));
        }
        self.status = InvoiceStatus::Cancelled;
        Ok(())
    }

    /// Reopens a failed invoice for a permitted retry.
    pub fn reopen_for_retry(&mut self) -> Result<(), DomainError> {
        if !self.status.can_reopen_for_retry() {
            return Err(self.invalid_transition(InvoiceStatus::Pending));
        }
        self.status = InvoiceStatus::Pending;
        Ok(())
    }

    fn invalid_transition(&self, to: InvoiceStatus) -> DomainError {
        DomainError::InvalidTransition {
            entity: "invoice",
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

impl Entity for Invoice {
    const KIND: &'static str = "invoice";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::DueDate;

    fn test_invoice() -> Invoice {
        Invoice::new(
            Msisdn::parse("254700000001").unwrap(),
            "Acme Cleaning",
            Msisdn::parse("254712345678").unwrap(),
            "Jane",
            vec![LineItem::new("Deep clean", Money::from_cents(150_000), 1)],
            false,
            DueDate::OnReceipt,
            PayoutInstrument::Paybill {
                business_number: "174379".to_string(),
                account: "ACME-1".to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn new_invoice_is_pending_with_computed_totals() {
        let invoice = test_invoice();
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.total.cents(), 150_000);
        assert_eq!(invoice.account_reference, "ACME-1");
        assert_eq!(invoice.shortcode, "174379");
        assert!(invoice.passive_enabled);
        assert!(invoice.active_payment.is_none());
    }

    #[test]
    fn rejects_totals_below_minimum() {
        let result = Invoice::new(
            Msisdn::parse("254700000001").unwrap(),
            "Acme",
            Msisdn::parse("254712345678").unwrap(),
            "Jane",
            vec![LineItem::new("Sticker", Money::from_cents(50), 1)],
            false,
            DueDate::OnReceipt,
            PayoutInstrument::Till { number: "55544".to_string() },
        );
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn non_paybill_account_reference_derives_from_id() {
        let invoice = Invoice::new(
            Msisdn::parse("254700000001").unwrap(),
            "Acme",
            Msisdn::parse("254712345678").unwrap(),
            "Jane",
            vec![LineItem::new("Deep clean", Money::from_cents(150_000), 1)],
            false,
            DueDate::OnReceipt,
            PayoutInstrument::Till { number: "55544".to_string() },
        )
        .unwrap();
        assert!(invoice.account_reference.len() <= 20);
        assert!(invoice.id.as_str().starts_with(invoice.account_reference.as_str()));
    }

    #[test]
    fn delivery_confirmation_is_idempotent() {
        let mut invoice = test_invoice();
        invoice.mark_delivered().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        invoice.mark_delivered().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
    }

    #[test]
    fn paid_is_terminal() {
        let mut invoice = test_invoice();
        invoice.mark_delivered().unwrap();
        invoice.mark_paid("RCPT1").unwrap();
        assert_eq!(invoice.pay_ref.as_deref(), Some("RCPT1"));
        assert!(invoice.mark_failed().is_err());
        assert!(invoice.cancel().is_err());
        assert!(invoice.mark_delivered().is_err());
    }

    #[test]
    fn failed_reopens_only_for_retry() {
        let mut invoice = test_invoice();
        invoice.mark_delivered().unwrap();
        invoice.mark_failed().unwrap();
        assert!(invoice.cancel().is_err());
        invoice.reopen_for_retry().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert!(invoice.reopen_for_retry().is_err());
    }

    #[test]
    fn failed_invoice_can_still_be_paid() {
        // passive settlement may land while the invoice sits failed
        let mut invoice = test_invoice();
        invoice.mark_delivered().unwrap();
        invoice.mark_failed().unwrap();
        invoice.mark_paid("TX9").unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }
}

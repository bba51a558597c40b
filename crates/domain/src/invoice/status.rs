//! Invoice lifecycle state machine.

use serde::{Deserialize, Serialize};

/// The status of an invoice in its lifecycle.
///
/// Transitions:
/// ```text
/// Pending ──► Sent ──┬──► Paid
///    ▲   │      │    └──► Failed ──► (retry) ──► Pending
///    │   │      └──► Cancelled
///    │   └──► Cancelled
///    └── Failed may also go straight to Paid via passive settlement
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Created but not yet delivered to the customer.
    #[default]
    Pending,

    /// Delivered, awaiting settlement.
    Sent,

    /// Fully settled (terminal state).
    Paid,

    /// Abandoned by the merchant (terminal state).
    Cancelled,

    /// A payment attempt failed; re-openable through a permitted retry.
    Failed,
}

impl InvoiceStatus {
    /// Returns true if delivery confirmation is valid in this status.
    pub fn can_send(&self) -> bool {
        matches!(self, InvoiceStatus::Pending)
    }

    /// Returns true if a settlement can mark the invoice paid.
    pub fn can_pay(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Pending | InvoiceStatus::Sent | InvoiceStatus::Failed
        )
    }

    /// Returns true if a failed payment attempt can fail the invoice.
    pub fn can_fail(&self) -> bool {
        matches!(self, InvoiceStatus::Pending | InvoiceStatus::Sent)
    }

    /// Returns true if the merchant can cancel in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, InvoiceStatus::Pending | InvoiceStatus::Sent)
    }

    /// Returns true if a permitted retry can reopen the invoice.
    pub fn can_reopen_for_retry(&self) -> bool {
        matches!(self, InvoiceStatus::Failed)
    }

    /// Returns true if a push payment can be initiated in this status.
    pub fn can_initiate_payment(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Pending | InvoiceStatus::Sent | InvoiceStatus::Failed
        )
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    /// Returns the status name as stored and logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Cancelled => "CANCELLED",
            InvoiceStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

use entity_store::StoreError;
use domain::DomainError;
use thiserror::Error;

/// Reasons a retry of a failed invoice is refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RetryBlocked {
    #[error("Maximum payment attempts reached")]
    MaxAttempts,

    #[error("Please wait {seconds_remaining} seconds before retrying")]
    Cooldown { seconds_remaining: i64 },
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("invoice not found: {0}")]
    InvoiceNotFound(String),

    #[error("invoice {id} cannot accept a payment in status {status}")]
    InvalidInvoiceStatus { id: String, status: String },

    #[error("a payment is already in progress for invoice {0}")]
    PaymentInProgress(String),

    #[error("invoice {0} has no prior payment to retry")]
    NoPriorPayment(String),

    #[error(transparent)]
    RetryBlocked(#[from] RetryBlocked),

    #[error("provider rejected the push request: {0}")]
    Provider(String),

    #[error("provider did not respond within the deadline")]
    ProviderTimeout,

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

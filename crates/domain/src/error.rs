//! Domain error types.

use common::InvoiceId;
use entity_store::StoreError;
use thiserror::Error;

/// Errors produced when parsing merchant-entered input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A specific line in a line-item batch was malformed. The whole
    /// batch is rejected.
    #[error("Line {number}: {message}")]
    Line { number: usize, message: String },

    #[error("{0}")]
    Invalid(String),
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the entity store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A state machine rejected the transition.
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Invoice not found.
    #[error("invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// Input failed parsing.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A load-mutate-save loop kept losing version races.
    #[error("too many concurrent updates for {kind} {id}")]
    ConflictRetriesExhausted { kind: &'static str, id: String },
}

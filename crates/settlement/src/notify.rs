//! Outbound settlement notifications.
//!
//! Dispatch failures are logged and swallowed. A notification that
//! cannot be delivered must never roll back a settlement that already
//! happened.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{InvoiceId, Money};

/// Events surfaced to merchant and customer after settlement activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementEvent {
    InvoiceSent {
        invoice_id: InvoiceId,
        total: Money,
    },
    PaymentSucceeded {
        invoice_id: InvoiceId,
        receipt: String,
        amount: Money,
        outstanding: Money,
    },
    PaymentFailed {
        invoice_id: InvoiceId,
        reason: String,
    },
    RetryBlocked {
        invoice_id: InvoiceId,
        reason: String,
    },
}

/// Trait for delivering settlement events to interested parties.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, event: SettlementEvent);
}

#[derive(Debug, Default)]
struct InMemoryDispatcherState {
    events: Vec<SettlementEvent>,
}

/// In-memory dispatcher for testing. Records every event it receives.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDispatcher {
    state: Arc<RwLock<InMemoryDispatcherState>>,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SettlementEvent> {
        self.state.read().unwrap().events.clone()
    }

    pub fn event_count(&self) -> usize {
        self.state.read().unwrap().events.len()
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryDispatcher {
    async fn dispatch(&self, event: SettlementEvent) {
        self.state.write().unwrap().events.push(event);
    }
}

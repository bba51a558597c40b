//! Push-payment provider trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, Msisdn};
use uuid::Uuid;

use crate::error::SettlementError;

/// Outgoing STK push request.
///
/// `idempotency_key` is stable across retries of the same attempt, so
/// the provider can deduplicate a resubmitted push.
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub msisdn: Msisdn,
    pub amount: Money,
    pub account_reference: String,
    pub description: String,
    pub idempotency_key: String,
}

/// Provider acknowledgement that a push was accepted for processing.
///
/// Acceptance is not settlement. The outcome arrives later on the
/// callback channel, keyed by `correlation_id`.
#[derive(Debug, Clone)]
pub struct PushAccepted {
    pub correlation_id: String,
    pub provider_request_id: String,
}

/// Trait for the mobile-money push channel.
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Submits an STK push to the customer's handset.
    async fn stk_push(&self, request: PushRequest) -> Result<PushAccepted, SettlementError>;
}

#[derive(Debug, Default)]
struct InMemoryPushState {
    requests: Vec<PushRequest>,
    fail_on_push: bool,
    hang_on_push: bool,
}

/// In-memory push provider for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPushProvider {
    state: Arc<RwLock<InMemoryPushState>>,
}

impl InMemoryPushProvider {
    /// Creates a new in-memory push provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the provider to reject the next push call.
    pub fn set_fail_on_push(&self, fail: bool) {
        self.state.write().unwrap().fail_on_push = fail;
    }

    /// Configures the provider to never answer, simulating a timeout.
    pub fn set_hang_on_push(&self, hang: bool) {
        self.state.write().unwrap().hang_on_push = hang;
    }

    /// Returns the number of pushes submitted.
    pub fn push_count(&self) -> usize {
        self.state.read().unwrap().requests.len()
    }

    /// Returns the most recently submitted push request.
    pub fn last_request(&self) -> Option<PushRequest> {
        self.state.read().unwrap().requests.last().cloned()
    }
}

#[async_trait]
impl PushProvider for InMemoryPushProvider {
    async fn stk_push(&self, request: PushRequest) -> Result<PushAccepted, SettlementError> {
        let hang = self.state.read().unwrap().hang_on_push;
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.write().unwrap();

        if state.fail_on_push {
            return Err(SettlementError::Provider(
                "Request rejected by provider".to_string(),
            ));
        }

        state.requests.push(request);

        Ok(PushAccepted {
            correlation_id: format!("ws_CO_{}", Uuid::new_v4().simple()),
            provider_request_id: format!("req_{}", Uuid::new_v4().simple()),
        })
    }
}

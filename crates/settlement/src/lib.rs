//! Push-payment orchestration.
//!
//! One entry point initiates pushes (fresh attempts and permitted
//! retries alike), one reconciles asynchronous provider callbacks, and
//! one records passive customer-initiated settlements. All three are
//! idempotent under duplicate delivery and safe under concurrent calls.

pub mod callback;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod provider;
pub mod retry;

pub use callback::{Ack, PassiveNotice, StkOutcome, failure_reason};
pub use error::{RetryBlocked, SettlementError};
pub use notify::{InMemoryDispatcher, NotificationDispatcher, SettlementEvent};
pub use orchestrator::SettlementOrchestrator;
pub use provider::{InMemoryPushProvider, PushAccepted, PushProvider, PushRequest};
pub use retry::RetryPolicy;

//! Messaging transport trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::Msisdn;
use thiserror::Error;

/// The transport could not deliver the message.
#[derive(Debug, Clone, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Trait for outbound messaging operations.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Sends a plain text message.
    async fn send_text(&self, to: &Msisdn, body: &str) -> Result<(), TransportError>;

    /// Sends a message with tappable reply options.
    async fn send_choice(
        &self,
        to: &Msisdn,
        body: &str,
        options: &[&str],
    ) -> Result<(), TransportError>;
}

/// A message captured by the in-memory transport.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: Msisdn,
    pub body: String,
    pub options: Vec<String>,
}

#[derive(Debug, Default)]
struct InMemoryTransportState {
    sent: Vec<SentMessage>,
    fail_on_send: bool,
}

/// In-memory messaging transport for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<RwLock<InMemoryTransportState>>,
}

impl InMemoryTransport {
    /// Creates a new in-memory transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the transport to fail on subsequent sends.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns all captured messages.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.read().unwrap().sent.clone()
    }

    /// Returns the last captured message, if any.
    pub fn last(&self) -> Option<SentMessage> {
        self.state.read().unwrap().sent.last().cloned()
    }
}

#[async_trait]
impl MessagingTransport for InMemoryTransport {
    async fn send_text(&self, to: &Msisdn, body: &str) -> Result<(), TransportError> {
        self.send_choice(to, body, &[]).await
    }

    async fn send_choice(
        &self,
        to: &Msisdn,
        body: &str,
        options: &[&str],
    ) -> Result<(), TransportError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(TransportError("delivery failed".to_string()));
        }
        state.sent.push(SentMessage {
            to: to.clone(),
            body: body.to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
        });
        Ok(())
    }
}

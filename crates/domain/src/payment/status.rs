//! Payment attempt state machine.

use serde::{Deserialize, Serialize};

/// The status of a payment attempt.
///
/// `Success` and `Failed` are terminal for the attempt; a failed attempt
/// is only revived through the retry path, which re-initiates the same
/// record under the retry ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Persisted, provider call pending or in flight.
    #[default]
    Initiated,

    /// Settled and confirmed.
    Success,

    /// Declined, cancelled, or timed out.
    Failed,
}

impl PaymentStatus {
    pub fn can_complete(&self) -> bool {
        matches!(self, PaymentStatus::Initiated)
    }

    pub fn can_fail(&self) -> bool {
        matches!(self, PaymentStatus::Initiated)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Initiated => "INITIATED",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a payment attempt was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentChannel {
    /// Push initiated by us against the customer's phone.
    StkPush,

    /// Customer paid the shortcode directly.
    Passive,
}

impl PaymentChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentChannel::StkPush => "STK_PUSH",
            PaymentChannel::Passive => "PASSIVE",
        }
    }
}

impl std::fmt::Display for PaymentChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an invoice.
///
/// Wraps a string to provide type safety and to keep the customer-facing
/// reference format (`INV-<epoch>-<suffix>`) in one place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(String);

impl InvoiceId {
    /// Creates a new invoice ID with a timestamped, human-quotable reference.
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("INV-{}-{}", Utc::now().timestamp(), &suffix[..4]))
    }

    /// Wraps an existing reference string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InvoiceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Unique identifier for a payment attempt.
///
/// Generated payments get a UUID; passive settlements derive their ID from
/// the provider transaction reference so duplicate notifications collide on
/// the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    /// Creates a new random payment ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Derives a deterministic ID from a provider transaction reference.
    pub fn from_passive_ref(trans_ref: &str) -> Self {
        Self(format!("passive-{trans_ref}"))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a saved payment method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodId(String);

impl MethodId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_ids_are_unique_and_prefixed() {
        let a = InvoiceId::generate();
        let b = InvoiceId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("INV-"));
    }

    #[test]
    fn passive_payment_id_is_deterministic() {
        let a = PaymentId::from_passive_ref("TX123");
        let b = PaymentId::from_passive_ref("TX123");
        assert_eq!(a, b);
        assert_ne!(a, PaymentId::from_passive_ref("TX124"));
    }

    #[test]
    fn id_serialization_is_transparent() {
        let id = InvoiceId::from_string("INV-1-abcd");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"INV-1-abcd\"");
        let back: InvoiceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

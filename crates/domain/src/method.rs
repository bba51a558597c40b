//! Saved payment methods: payout instruments a merchant opted to keep.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{MethodId, Msisdn};
use entity_store::{Entity, EntityStore, EntityStoreExt, Expected};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::instrument::PayoutInstrument;

/// A payout instrument a merchant saved for reuse. Immutable apart from
/// the default flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: MethodId,

    /// Kept top-level so a merchant's methods can be found with a store
    /// query.
    pub merchant_msisdn: Msisdn,

    pub instrument: PayoutInstrument,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl PaymentMethod {
    pub fn new(merchant_msisdn: Msisdn, instrument: PayoutInstrument) -> Self {
        Self {
            id: MethodId::generate(),
            merchant_msisdn,
            instrument,
            is_default: false,
            created_at: Utc::now(),
        }
    }
}

impl Entity for PaymentMethod {
    const KIND: &'static str = "payment_method";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

/// Service for saved payment methods.
pub struct PaymentMethodService<S: EntityStore> {
    store: Arc<S>,
}

impl<S: EntityStore> PaymentMethodService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Saves the instrument unless the merchant already has an identical
    /// one. Returns the saved or existing method.
    #[tracing::instrument(skip(self, instrument), fields(merchant = %merchant))]
    pub async fn save_if_new(
        &self,
        merchant: &Msisdn,
        instrument: PayoutInstrument,
    ) -> Result<PaymentMethod, DomainError> {
        let existing = self.list_for_merchant(merchant).await?;
        if let Some(found) = existing.into_iter().find(|m| m.instrument == instrument) {
            return Ok(found);
        }

        let method = PaymentMethod::new(merchant.clone(), instrument);
        self.store.save(&method, Expected::New).await?;
        metrics::counter!("payment_methods_saved_total").increment(1);
        Ok(method)
    }

    /// Lists a merchant's saved methods, defaults first, then newest.
    pub async fn list_for_merchant(
        &self,
        merchant: &Msisdn,
    ) -> Result<Vec<PaymentMethod>, DomainError> {
        let value = serde_json::to_value(merchant)?;
        let mut methods: Vec<PaymentMethod> = self
            .store
            .find::<PaymentMethod>("merchant_msisdn", &value)
            .await?
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        methods.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(methods)
    }

    /// Marks one method as the merchant's default, clearing any other.
    #[tracing::instrument(skip(self), fields(merchant = %merchant))]
    pub async fn set_default(
        &self,
        merchant: &Msisdn,
        id: &MethodId,
    ) -> Result<(), DomainError> {
        for mut method in self.list_for_merchant(merchant).await? {
            let should_be_default = &method.id == id;
            if method.is_default != should_be_default {
                method.is_default = should_be_default;
                self.store.save(&method, Expected::Any).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_store::InMemoryStore;

    fn paybill(account: &str) -> PayoutInstrument {
        PayoutInstrument::Paybill {
            business_number: "174379".to_string(),
            account: account.to_string(),
        }
    }

    fn merchant() -> Msisdn {
        Msisdn::parse("254700000001").unwrap()
    }

    #[tokio::test]
    async fn save_if_new_deduplicates_identical_instruments() {
        let service = PaymentMethodService::new(Arc::new(InMemoryStore::new()));
        let first = service.save_if_new(&merchant(), paybill("A1")).await.unwrap();
        let second = service.save_if_new(&merchant(), paybill("A1")).await.unwrap();
        assert_eq!(first.id, second.id);

        let methods = service.list_for_merchant(&merchant()).await.unwrap();
        assert_eq!(methods.len(), 1);
    }

    #[tokio::test]
    async fn listing_is_scoped_to_merchant() {
        let service = PaymentMethodService::new(Arc::new(InMemoryStore::new()));
        service.save_if_new(&merchant(), paybill("A1")).await.unwrap();

        let other = Msisdn::parse("254700000002").unwrap();
        assert!(service.list_for_merchant(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_default_clears_previous_default() {
        let service = PaymentMethodService::new(Arc::new(InMemoryStore::new()));
        let a = service.save_if_new(&merchant(), paybill("A1")).await.unwrap();
        let b = service.save_if_new(&merchant(), paybill("A2")).await.unwrap();

        service.set_default(&merchant(), &a.id).await.unwrap();
        service.set_default(&merchant(), &b.id).await.unwrap();

        let methods = service.list_for_merchant(&merchant()).await.unwrap();
        assert_eq!(methods[0].id, b.id);
        assert!(methods[0].is_default);
        assert!(!methods.iter().find(|m| m.id == a.id).unwrap().is_default);
    }
}

//! Invoice service providing persistence-aware lifecycle operations.

use std::sync::Arc;

use common::InvoiceId;
use entity_store::{EntityStore, EntityStoreExt, Expected, Version};

use crate::error::DomainError;

use super::Invoice;

const MAX_CONFLICT_RETRIES: usize = 5;

/// Service for managing invoices.
///
/// Every mutation is a load-mutate-save loop: the save carries the
/// version the invoice was loaded at, and a conflict reloads and
/// reapplies rather than overwriting a concurrent write.
pub struct InvoiceService<S: EntityStore> {
    store: Arc<S>,
}

impl<S: EntityStore> InvoiceService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persists a freshly created invoice.
    #[tracing::instrument(skip(self, invoice), fields(invoice_id = %invoice.id))]
    pub async fn create(&self, invoice: Invoice) -> Result<Invoice, DomainError> {
        self.store.save(&invoice, Expected::New).await?;
        metrics::counter!("invoices_created_total").increment(1);
        Ok(invoice)
    }

    /// Loads an invoice, or None if it does not exist.
    pub async fn get(&self, id: &InvoiceId) -> Result<Option<Invoice>, DomainError> {
        Ok(self.store.load::<Invoice>(id.as_str()).await?.map(|(i, _)| i))
    }

    /// Loads an invoice along with its store version.
    pub async fn get_versioned(
        &self,
        id: &InvoiceId,
    ) -> Result<Option<(Invoice, Version)>, DomainError> {
        Ok(self.store.load::<Invoice>(id.as_str()).await?)
    }

    /// Confirms delivery. Safe to repeat.
    #[tracing::instrument(skip(self))]
    pub async fn mark_delivered(&self, id: &InvoiceId) -> Result<Invoice, DomainError> {
        self.update(id, |invoice| invoice.mark_delivered()).await
    }

    /// Marks the invoice paid with the settlement reference.
    #[tracing::instrument(skip(self))]
    pub async fn mark_paid(
        &self,
        id: &InvoiceId,
        pay_ref: &str,
    ) -> Result<Invoice, DomainError> {
        self.update(id, |invoice| invoice.mark_paid(pay_ref)).await
    }

    /// Marks the invoice failed after a failed payment attempt.
    #[tracing::instrument(skip(self))]
    pub async fn mark_failed(&self, id: &InvoiceId) -> Result<Invoice, DomainError> {
        self.update(id, |invoice| invoice.mark_failed()).await
    }

    /// Cancels the invoice.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: &InvoiceId) -> Result<Invoice, DomainError> {
        self.update(id, |invoice| invoice.cancel()).await
    }

    /// Applies a mutation under optimistic concurrency, retrying on
    /// version conflicts.
    pub async fn update<F>(&self, id: &InvoiceId, mutate: F) -> Result<Invoice, DomainError>
    where
        F: Fn(&mut Invoice) -> Result<(), DomainError>,
    {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let Some((mut invoice, version)) = self.store.load::<Invoice>(id.as_str()).await?
            else {
                return Err(DomainError::InvoiceNotFound(id.clone()));
            };
            mutate(&mut invoice)?;
            invoice.updated_at = chrono::Utc::now();

            match self.store.save(&invoice, Expected::Version(version)).await {
                Ok(_) => return Ok(invoice),
                Err(e) if e.is_conflict() => {
                    metrics::counter!("invoice_update_conflicts_total").increment(1);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DomainError::ConflictRetriesExhausted {
            kind: "invoice",
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::PayoutInstrument;
    use crate::invoice::{InvoiceStatus, LineItem};
    use crate::parse::DueDate;
    use common::{Money, Msisdn};
    use entity_store::InMemoryStore;

    fn service() -> InvoiceService<InMemoryStore> {
        InvoiceService::new(Arc::new(InMemoryStore::new()))
    }

    fn invoice() -> Invoice {
        Invoice::new(
            Msisdn::parse("254700000001").unwrap(),
            "Acme",
            Msisdn::parse("254712345678").unwrap(),
            "Jane",
            vec![LineItem::new("Deep clean", Money::from_cents(150_000), 1)],
            true,
            DueDate::OnReceipt,
            PayoutInstrument::Paybill {
                business_number: "174379".to_string(),
                account: "ACME-1".to_string(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let service = service();
        let created = service.create(invoice()).await.unwrap();
        let loaded = service.get(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.status, InvoiceStatus::Pending);
        assert_eq!(loaded.tax.cents(), 20_690);
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let service = service();
        let created = service.create(invoice()).await.unwrap();
        let result = service.create(created).await;
        assert!(matches!(result, Err(DomainError::Store(_))));
    }

    #[tokio::test]
    async fn lifecycle_through_service() {
        let service = service();
        let created = service.create(invoice()).await.unwrap();

        let sent = service.mark_delivered(&created.id).await.unwrap();
        assert_eq!(sent.status, InvoiceStatus::Sent);

        // repeat delivery confirmation is a no-op
        service.mark_delivered(&created.id).await.unwrap();

        let paid = service.mark_paid(&created.id, "RCPT1").await.unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.pay_ref.as_deref(), Some("RCPT1"));
    }

    #[tokio::test]
    async fn illegal_transition_surfaces_domain_error() {
        let service = service();
        let created = service.create(invoice()).await.unwrap();
        service.mark_delivered(&created.id).await.unwrap();
        service.mark_paid(&created.id, "RCPT1").await.unwrap();

        let result = service.cancel(&created.id).await;
        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn missing_invoice_is_not_found() {
        let service = service();
        let result = service.mark_delivered(&common::InvoiceId::from_string("nope")).await;
        assert!(matches!(result, Err(DomainError::InvoiceNotFound(_))));
    }
}

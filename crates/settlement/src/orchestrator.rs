//! The settlement orchestrator.
//!
//! Coordinates push initiation, callback reconciliation and passive
//! settlement against the entity store. Exactly-once effects come from
//! version guards on the payment and invoice records rather than from
//! locks: claiming the invoice's active payment slot is a
//! compare-and-swap, and duplicate callbacks lose the race on the
//! payment record and degrade to acknowledged replays.

use std::sync::Arc;

use chrono::Utc;
use common::{InvoiceId, Money, PaymentId};
use domain::{Invoice, InvoiceService, InvoiceStatus, Payment, PaymentStatus};
use entity_store::{Entity, EntityStore, EntityStoreExt, Expected};
use metrics::counter;
use serde_json::{Value, json};

use crate::callback::{Ack, PassiveNotice, StkOutcome, failure_reason};
use crate::error::SettlementError;
use crate::notify::{NotificationDispatcher, SettlementEvent};
use crate::provider::{PushProvider, PushRequest};
use crate::retry::RetryPolicy;

/// How long a provider is given to accept a push before the attempt is
/// recorded as failed.
const DEFAULT_PUSH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub struct SettlementOrchestrator<S, P, N>
where
    S: EntityStore,
    P: PushProvider,
    N: NotificationDispatcher,
{
    store: Arc<S>,
    invoices: InvoiceService<S>,
    provider: Arc<P>,
    dispatcher: Arc<N>,
    policy: RetryPolicy,
    push_timeout: std::time::Duration,
}

impl<S, P, N> SettlementOrchestrator<S, P, N>
where
    S: EntityStore,
    P: PushProvider,
    N: NotificationDispatcher,
{
    pub fn new(store: Arc<S>, provider: Arc<P>, dispatcher: Arc<N>) -> Self {
        Self {
            invoices: InvoiceService::new(store.clone()),
            store,
            provider,
            dispatcher,
            policy: RetryPolicy::default(),
            push_timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_push_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    /// Initiates a push payment for the invoice.
    ///
    /// For a pending or sent invoice this creates a fresh attempt. For a
    /// failed invoice it runs the retry gate first, then reopens the
    /// invoice and revives the failed attempt as one atomic progression.
    /// At most one attempt is ever in flight per invoice.
    #[tracing::instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn initiate(&self, invoice_id: &InvoiceId) -> Result<Payment, SettlementError> {
        let Some((invoice, version)) = self.store.load::<Invoice>(invoice_id.as_str()).await?
        else {
            return Err(SettlementError::InvoiceNotFound(invoice_id.to_string()));
        };

        if !invoice.status.can_initiate_payment() {
            return Err(SettlementError::InvalidInvoiceStatus {
                id: invoice_id.to_string(),
                status: invoice.status.to_string(),
            });
        }

        if let Some(active) = &invoice.active_payment
            && let Some((payment, _)) = self.store.load::<Payment>(active.as_str()).await?
            && payment.status == PaymentStatus::Initiated
        {
            return Err(SettlementError::PaymentInProgress(invoice_id.to_string()));
        }

        let (payment, payment_version) = if invoice.status == InvoiceStatus::Failed {
            self.revive_failed_attempt(invoice, version).await?
        } else {
            self.open_fresh_attempt(invoice, version).await?
        };

        self.submit_push(payment, payment_version).await
    }

    /// Reconciles an asynchronous push callback.
    ///
    /// Every delivery is acknowledged with the same body. Unparseable
    /// and unmatched payloads are logged and acknowledged so the
    /// provider stops retrying; replays of a settled attempt are
    /// no-ops with the identical acknowledgement.
    #[tracing::instrument(skip_all)]
    pub async fn reconcile(&self, body: &Value) -> Result<Ack, SettlementError> {
        let Some(outcome) = StkOutcome::from_body(body) else {
            tracing::warn!("discarding callback with unrecognized shape");
            counter!("callbacks_unparsed_total").increment(1);
            return Ok(Ack::accepted());
        };

        let matches = self
            .store
            .find::<Payment>("correlation_id", &json!(outcome.correlation_id))
            .await?;
        let Some((mut payment, payment_version)) = matches.into_iter().next() else {
            tracing::warn!(
                correlation_id = %outcome.correlation_id,
                result_code = outcome.result_code,
                "callback matched no payment"
            );
            counter!("callbacks_unmatched_total").increment(1);
            return Ok(Ack::accepted());
        };

        if payment.is_terminal() {
            tracing::debug!(
                payment_id = %payment.id,
                status = %payment.status,
                "replayed callback for settled attempt"
            );
            return Ok(Ack::accepted());
        }

        if outcome.is_success() {
            let receipt = outcome
                .receipt
                .clone()
                .unwrap_or_else(|| outcome.correlation_id.clone());
            payment.complete(receipt.as_str(), body.clone())?;
            if self.save_or_replay(&payment, payment_version).await? {
                return Ok(Ack::accepted());
            }

            let invoice_id = payment.invoice_id.clone();
            self.invoices
                .update(&invoice_id, |inv| {
                    // A cancelled or already-settled invoice stays as it
                    // is; the payment record keeps the receipt either way.
                    if inv.status.can_pay() {
                        inv.mark_paid(receipt.as_str())?;
                    }
                    inv.active_payment = None;
                    Ok(())
                })
                .await?;

            let outstanding = self.outstanding_for(&invoice_id).await?;
            counter!("payments_succeeded_total").increment(1);
            self.dispatcher
                .dispatch(SettlementEvent::PaymentSucceeded {
                    invoice_id,
                    receipt,
                    amount: payment.amount,
                    outstanding,
                })
                .await;
        } else {
            let reason = failure_reason(outcome.result_code);
            payment.fail(reason.as_str(), Some(body.clone()))?;
            if self.save_or_replay(&payment, payment_version).await? {
                return Ok(Ack::accepted());
            }

            let invoice_id = payment.invoice_id.clone();
            self.invoices
                .update(&invoice_id, |inv| {
                    if inv.status.can_fail() {
                        inv.mark_failed()?;
                    }
                    inv.active_payment = None;
                    Ok(())
                })
                .await?;

            counter!("payments_failed_total").increment(1);
            self.dispatcher
                .dispatch(SettlementEvent::PaymentFailed { invoice_id, reason })
                .await;
        }

        Ok(Ack::accepted())
    }

    /// Records a customer-initiated deposit against the shortcode.
    ///
    /// A notice is matched to the newest open invoice carrying the
    /// quoted account reference on the same shortcode. Partial amounts
    /// reduce the balance and leave the invoice open; the deposit that
    /// clears the balance settles it. Duplicate notices collide on the
    /// derived payment id and are acknowledged without effect.
    #[tracing::instrument(skip_all)]
    pub async fn record_passive(&self, body: &Value) -> Result<Ack, SettlementError> {
        let Some(notice) = PassiveNotice::from_body(body) else {
            tracing::warn!("discarding passive notification with unrecognized shape");
            counter!("passive_unparsed_total").increment(1);
            return Ok(Ack::accepted());
        };

        let derived = PaymentId::from_passive_ref(&notice.trans_ref);
        if self.store.load::<Payment>(derived.as_str()).await?.is_some() {
            tracing::debug!(trans_ref = %notice.trans_ref, "duplicate passive notification");
            return Ok(Ack::accepted());
        }

        let Some(invoice) = self.match_passive_invoice(&notice).await? else {
            tracing::warn!(
                account_reference = %notice.account_reference,
                shortcode = %notice.shortcode,
                amount = %notice.amount,
                "passive notification matched no open invoice"
            );
            counter!("passive_unmatched_total").increment(1);
            return Ok(Ack::accepted());
        };

        let payer = notice
            .payer_msisdn
            .clone()
            .unwrap_or_else(|| invoice.customer_msisdn.clone());
        let mut payment =
            Payment::new_passive(&notice.trans_ref, invoice.id.clone(), notice.amount, payer);
        payment.raw_callback = Some(body.clone());

        match self.store.save(&payment, Expected::New).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                tracing::debug!(trans_ref = %notice.trans_ref, "duplicate passive notification");
                return Ok(Ack::accepted());
            }
            Err(e) => return Err(e.into()),
        }

        let outstanding = self.outstanding_for(&invoice.id).await?;
        if outstanding.is_zero() {
            self.invoices
                .update(&invoice.id, |inv| {
                    if inv.status.can_pay() {
                        inv.mark_paid(notice.trans_ref.as_str())?;
                    }
                    inv.active_payment = None;
                    Ok(())
                })
                .await?;
            tracing::info!(invoice_id = %invoice.id, "invoice settled by passive payment");
        } else {
            tracing::info!(
                invoice_id = %invoice.id,
                outstanding = %outstanding,
                "partial passive payment recorded, invoice remains open"
            );
        }

        counter!("passive_payments_recorded_total").increment(1);
        self.dispatcher
            .dispatch(SettlementEvent::PaymentSucceeded {
                invoice_id: invoice.id,
                receipt: notice.trans_ref,
                amount: notice.amount,
                outstanding,
            })
            .await;

        Ok(Ack::accepted())
    }

    /// The amount still owed on the invoice after all successful
    /// payments.
    pub async fn outstanding_for(&self, invoice_id: &InvoiceId) -> Result<Money, SettlementError> {
        let Some((invoice, _)) = self.store.load::<Invoice>(invoice_id.as_str()).await? else {
            return Err(SettlementError::InvoiceNotFound(invoice_id.to_string()));
        };

        let payments = self
            .store
            .find::<Payment>("invoice_id", &json!(invoice_id.as_str()))
            .await?;
        let settled_cents = payments
            .iter()
            .filter(|(p, _)| p.status == PaymentStatus::Success)
            .fold(0i64, |acc, (p, _)| acc.saturating_add(p.amount.cents()));

        Ok(invoice.total.saturating_sub(Money::from_cents(settled_cents)))
    }

    /// Reopens a failed invoice and revives its failed attempt, gated
    /// by the retry policy. Both writes are version-guarded; if the
    /// second one loses a race the first is rolled back.
    async fn revive_failed_attempt(
        &self,
        invoice: Invoice,
        version: entity_store::Version,
    ) -> Result<(Payment, entity_store::Version), SettlementError> {
        let Some((mut payment, payment_version)) = self.latest_failed_attempt(&invoice.id).await?
        else {
            return Err(SettlementError::NoPriorPayment(invoice.id.to_string()));
        };

        if let Err(blocked) = self
            .policy
            .check(payment.retry_count, payment.updated_at, Utc::now())
        {
            counter!("retries_blocked_total").increment(1);
            self.dispatcher
                .dispatch(SettlementEvent::RetryBlocked {
                    invoice_id: invoice.id.clone(),
                    reason: blocked.to_string(),
                })
                .await;
            return Err(blocked.into());
        }

        let mut reopened = invoice.clone();
        reopened.reopen_for_retry()?;
        reopened.active_payment = Some(payment.id.clone());
        reopened.updated_at = Utc::now();
        match self.store.save(&reopened, Expected::Version(version)).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                return Err(SettlementError::PaymentInProgress(invoice.id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        payment.reinitiate()?;
        match self
            .store
            .save(&payment, Expected::Version(payment_version))
            .await
        {
            Ok(new_version) => {
                counter!("payments_retried_total").increment(1);
                Ok((payment, new_version))
            }
            Err(e) => {
                // Undo the reopen so the invoice does not sit in
                // PENDING with no live attempt.
                let rollback = self
                    .invoices
                    .update(&invoice.id, |inv| {
                        inv.status = InvoiceStatus::Failed;
                        inv.active_payment = None;
                        Ok(())
                    })
                    .await;
                if let Err(rollback_err) = rollback {
                    tracing::error!(
                        invoice_id = %invoice.id,
                        error = %rollback_err,
                        "failed to roll back invoice after retry write conflict"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Creates a fresh attempt and claims the invoice's active payment
    /// slot. The invoice write is the serialization point: concurrent
    /// initiations race on the invoice version and exactly one wins.
    async fn open_fresh_attempt(
        &self,
        invoice: Invoice,
        version: entity_store::Version,
    ) -> Result<(Payment, entity_store::Version), SettlementError> {
        let payment = Payment::new_push(
            invoice.id.clone(),
            invoice.total,
            invoice.customer_msisdn.clone(),
        );
        let payment_version = self.store.save(&payment, Expected::New).await?;

        let mut claimed = invoice.clone();
        claimed.active_payment = Some(payment.id.clone());
        claimed.updated_at = Utc::now();
        match self.store.save(&claimed, Expected::Version(version)).await {
            Ok(_) => Ok((payment, payment_version)),
            Err(e) if e.is_conflict() => {
                // Lost the claim race. Drop the orphaned attempt record.
                self.store.delete(Payment::KIND, payment.id.as_str()).await?;
                Err(SettlementError::PaymentInProgress(invoice.id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Submits the claimed attempt to the provider. Provider rejection
    /// or timeout fails the attempt and releases the slot; the invoice
    /// status itself is left alone.
    async fn submit_push(
        &self,
        mut payment: Payment,
        payment_version: entity_store::Version,
    ) -> Result<Payment, SettlementError> {
        let request = PushRequest {
            msisdn: payment.msisdn.clone(),
            amount: payment.amount,
            account_reference: payment.invoice_id.to_string(),
            description: format!("Invoice {}", payment.invoice_id),
            idempotency_key: payment.idempotency_key.clone(),
        };
        let raw_request = json!({
            "msisdn": request.msisdn.to_string(),
            "amount_cents": request.amount.cents(),
            "account_reference": request.account_reference,
            "idempotency_key": payment.idempotency_key,
        });

        let outcome =
            tokio::time::timeout(self.push_timeout, self.provider.stk_push(request)).await;

        match outcome {
            Ok(Ok(accepted)) => {
                payment.record_provider_accept(
                    accepted.correlation_id,
                    accepted.provider_request_id,
                    raw_request,
                );
                self.store
                    .save(&payment, Expected::Version(payment_version))
                    .await?;
                counter!("payments_initiated_total").increment(1);
                tracing::info!(
                    payment_id = %payment.id,
                    invoice_id = %payment.invoice_id,
                    "push accepted by provider"
                );
                Ok(payment)
            }
            Ok(Err(e)) => {
                self.fail_unsubmitted(payment, payment_version, "Request rejected by provider")
                    .await?;
                Err(e)
            }
            Err(_) => {
                self.fail_unsubmitted(payment, payment_version, "Provider request timed out")
                    .await?;
                Err(SettlementError::ProviderTimeout)
            }
        }
    }

    async fn fail_unsubmitted(
        &self,
        mut payment: Payment,
        payment_version: entity_store::Version,
        reason: &str,
    ) -> Result<(), SettlementError> {
        payment.fail(reason, None)?;
        self.store
            .save(&payment, Expected::Version(payment_version))
            .await?;
        self.invoices
            .update(&payment.invoice_id, |inv| {
                inv.active_payment = None;
                Ok(())
            })
            .await?;
        counter!("payments_failed_total").increment(1);
        tracing::warn!(
            payment_id = %payment.id,
            invoice_id = %payment.invoice_id,
            reason,
            "push not accepted by provider"
        );
        self.dispatcher
            .dispatch(SettlementEvent::PaymentFailed {
                invoice_id: payment.invoice_id.clone(),
                reason: reason.to_string(),
            })
            .await;
        Ok(())
    }

    /// Saves a reconciled payment. Returns true when the write lost a
    /// version race to a concurrent delivery of the same callback, in
    /// which case the caller treats the delivery as a replay.
    async fn save_or_replay(
        &self,
        payment: &Payment,
        version: entity_store::Version,
    ) -> Result<bool, SettlementError> {
        match self.store.save(payment, Expected::Version(version)).await {
            Ok(_) => Ok(false),
            Err(e) if e.is_conflict() => {
                tracing::debug!(payment_id = %payment.id, "concurrent callback delivery");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn latest_failed_attempt(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<(Payment, entity_store::Version)>, SettlementError> {
        let mut payments = self
            .store
            .find::<Payment>("invoice_id", &json!(invoice_id.as_str()))
            .await?;
        payments.retain(|(p, _)| p.status == PaymentStatus::Failed);
        payments.sort_by_key(|(p, _)| p.created_at);
        Ok(payments.pop())
    }

    async fn match_passive_invoice(
        &self,
        notice: &PassiveNotice,
    ) -> Result<Option<Invoice>, SettlementError> {
        let mut candidates = self
            .store
            .find::<Invoice>("account_reference", &json!(notice.account_reference))
            .await?;
        candidates.retain(|(inv, _)| {
            inv.shortcode == notice.shortcode && inv.passive_enabled && inv.status.can_pay()
        });
        candidates.sort_by_key(|(inv, _)| inv.created_at);
        Ok(candidates.pop().map(|(inv, _)| inv))
    }
}

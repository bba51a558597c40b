//! End-to-end settlement flows over the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{InvoiceId, Money, Msisdn};
use domain::{
    DueDate, Invoice, InvoiceService, InvoiceStatus, LineItem, Payment, PaymentStatus,
    PayoutInstrument,
};
use entity_store::{EntityStoreExt, Expected, InMemoryStore};
use serde_json::{Value, json};
use settlement::{
    Ack, InMemoryDispatcher, InMemoryPushProvider, RetryBlocked, SettlementError,
    SettlementEvent, SettlementOrchestrator,
};

struct Harness {
    store: Arc<InMemoryStore>,
    provider: InMemoryPushProvider,
    dispatcher: InMemoryDispatcher,
    orchestrator:
        SettlementOrchestrator<InMemoryStore, InMemoryPushProvider, InMemoryDispatcher>,
    invoices: InvoiceService<InMemoryStore>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let provider = InMemoryPushProvider::new();
    let dispatcher = InMemoryDispatcher::new();
    let orchestrator = SettlementOrchestrator::new(
        store.clone(),
        Arc::new(provider.clone()),
        Arc::new(dispatcher.clone()),
    );
    let invoices = InvoiceService::new(store.clone());
    Harness {
        store,
        provider,
        dispatcher,
        orchestrator,
        invoices,
    }
}

async fn sent_invoice(h: &Harness, total_shillings: i64) -> Invoice {
    let invoice = Invoice::new(
        Msisdn::parse("254700000001").unwrap(),
        "Acme Cleaners",
        Msisdn::parse("254712345678").unwrap(),
        "Jane",
        vec![LineItem::new(
            "Deep clean",
            Money::from_shillings(total_shillings),
            1,
        )],
        false,
        DueDate::OnReceipt,
        PayoutInstrument::Paybill {
            business_number: "174379".to_string(),
            account: "A1".to_string(),
        },
    )
    .unwrap();
    let invoice = h.invoices.create(invoice).await.unwrap();
    h.invoices.mark_delivered(&invoice.id).await.unwrap()
}

async fn reload(h: &Harness, id: &InvoiceId) -> Invoice {
    h.invoices.get(id).await.unwrap().unwrap()
}

async fn payments_for(h: &Harness, id: &InvoiceId) -> Vec<Payment> {
    h.store
        .find::<Payment>("invoice_id", &json!(id.as_str()))
        .await
        .unwrap()
        .into_iter()
        .map(|(p, _)| p)
        .collect()
}

async fn backdate_payment(h: &Harness, payment: &Payment, seconds: i64) {
    let mut aged = payment.clone();
    aged.updated_at = Utc::now() - Duration::seconds(seconds);
    h.store.save(&aged, Expected::Any).await.unwrap();
}

fn success_callback(correlation_id: &str, receipt: &str) -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "CheckoutRequestID": correlation_id,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        {"Name": "MpesaReceiptNumber", "Value": receipt}
                    ]
                }
            }
        }
    })
}

fn failure_callback(correlation_id: &str, code: i64) -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "CheckoutRequestID": correlation_id,
                "ResultCode": code,
                "ResultDesc": "Request failed"
            }
        }
    })
}

fn passive_notice(trans_ref: &str, amount: &str, account: &str) -> Value {
    json!({
        "TransID": trans_ref,
        "TransAmount": amount,
        "BillRefNumber": account,
        "BusinessShortCode": "174379",
        "MSISDN": "254712345678"
    })
}

#[tokio::test]
async fn push_settles_the_invoice_on_a_successful_callback() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;

    let payment = h.orchestrator.initiate(&invoice.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Initiated);
    let correlation = payment.correlation_id.clone().unwrap();
    assert_eq!(h.provider.push_count(), 1);
    assert_eq!(
        h.provider.last_request().unwrap().idempotency_key,
        payment.idempotency_key
    );
    assert_eq!(
        reload(&h, &invoice.id).await.active_payment,
        Some(payment.id.clone())
    );

    let ack = h
        .orchestrator
        .reconcile(&success_callback(&correlation, "RKT10AAA1B"))
        .await
        .unwrap();
    assert_eq!(ack, Ack::accepted());

    let settled = reload(&h, &invoice.id).await;
    assert_eq!(settled.status, InvoiceStatus::Paid);
    assert_eq!(settled.pay_ref.as_deref(), Some("RKT10AAA1B"));
    assert!(settled.active_payment.is_none());

    let payments = payments_for(&h, &invoice.id).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Success);
    assert!(matches!(
        h.dispatcher.events().last().unwrap(),
        SettlementEvent::PaymentSucceeded { outstanding, .. } if outstanding.is_zero()
    ));
}

#[tokio::test]
async fn duplicate_success_callback_is_a_no_op_with_the_same_ack() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;

    let payment = h.orchestrator.initiate(&invoice.id).await.unwrap();
    let correlation = payment.correlation_id.clone().unwrap();
    let body = success_callback(&correlation, "RKT10AAA1B");

    let first = h.orchestrator.reconcile(&body).await.unwrap();
    let events_after_first = h.dispatcher.event_count();
    let second = h.orchestrator.reconcile(&body).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.dispatcher.event_count(), events_after_first);
    assert_eq!(reload(&h, &invoice.id).await.status, InvoiceStatus::Paid);
    assert_eq!(payments_for(&h, &invoice.id).await.len(), 1);
}

#[tokio::test]
async fn unmatched_callback_is_acknowledged_and_changes_nothing() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;

    let ack = h
        .orchestrator
        .reconcile(&success_callback("ws_CO_unknown", "RKT10AAA1B"))
        .await
        .unwrap();

    assert_eq!(ack, Ack::accepted());
    assert_eq!(reload(&h, &invoice.id).await.status, InvoiceStatus::Sent);
    assert!(payments_for(&h, &invoice.id).await.is_empty());
    assert_eq!(h.dispatcher.event_count(), 0);
}

#[tokio::test]
async fn provider_rejection_fails_the_attempt_but_not_the_invoice() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;
    h.provider.set_fail_on_push(true);

    let err = h.orchestrator.initiate(&invoice.id).await.unwrap_err();
    assert!(matches!(err, SettlementError::Provider(_)));

    let after = reload(&h, &invoice.id).await;
    assert_eq!(after.status, InvoiceStatus::Sent);
    assert!(after.active_payment.is_none());

    let payments = payments_for(&h, &invoice.id).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Failed);
    assert!(matches!(
        h.dispatcher.events().last().unwrap(),
        SettlementEvent::PaymentFailed { .. }
    ));

    // The slot is free again, so a later attempt starts fresh.
    h.provider.set_fail_on_push(false);
    let retry = h.orchestrator.initiate(&invoice.id).await.unwrap();
    assert_eq!(retry.status, PaymentStatus::Initiated);
    assert_eq!(retry.retry_count, 0);
}

#[tokio::test]
async fn unresponsive_provider_times_out_and_frees_the_slot() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;
    h.provider.set_hang_on_push(true);

    let orchestrator = SettlementOrchestrator::new(
        h.store.clone(),
        Arc::new(h.provider.clone()),
        Arc::new(h.dispatcher.clone()),
    )
    .with_push_timeout(std::time::Duration::from_millis(50));

    let err = orchestrator.initiate(&invoice.id).await.unwrap_err();
    assert!(matches!(err, SettlementError::ProviderTimeout));

    let after = reload(&h, &invoice.id).await;
    assert_eq!(after.status, InvoiceStatus::Sent);
    assert!(after.active_payment.is_none());

    let payments = payments_for(&h, &invoice.id).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Failed);

    // With the provider responsive again the invoice is still payable.
    h.provider.set_hang_on_push(false);
    let retry = orchestrator.initiate(&invoice.id).await.unwrap();
    assert_eq!(retry.status, PaymentStatus::Initiated);
}

#[tokio::test]
async fn failed_callback_marks_the_invoice_failed_with_a_mapped_reason() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;

    let payment = h.orchestrator.initiate(&invoice.id).await.unwrap();
    let correlation = payment.correlation_id.clone().unwrap();
    h.orchestrator
        .reconcile(&failure_callback(&correlation, 1032))
        .await
        .unwrap();

    assert_eq!(reload(&h, &invoice.id).await.status, InvoiceStatus::Failed);
    let payments = payments_for(&h, &invoice.id).await;
    assert_eq!(payments[0].status, PaymentStatus::Failed);
    assert_eq!(
        payments[0].failure_reason.as_deref(),
        Some("The customer cancelled the request")
    );
    assert!(matches!(
        h.dispatcher.events().last().unwrap(),
        SettlementEvent::PaymentFailed { reason, .. }
            if reason == "The customer cancelled the request"
    ));
}

#[tokio::test]
async fn retry_is_blocked_inside_the_cooldown_window() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;

    let payment = h.orchestrator.initiate(&invoice.id).await.unwrap();
    let correlation = payment.correlation_id.clone().unwrap();
    h.orchestrator
        .reconcile(&failure_callback(&correlation, 1037))
        .await
        .unwrap();

    let failed = payments_for(&h, &invoice.id).await.pop().unwrap();
    backdate_payment(&h, &failed, 30).await;

    let err = h.orchestrator.initiate(&invoice.id).await.unwrap_err();
    match err {
        SettlementError::RetryBlocked(RetryBlocked::Cooldown { seconds_remaining }) => {
            assert!(
                (59..=61).contains(&seconds_remaining),
                "unexpected remaining seconds {seconds_remaining}"
            );
        }
        other => panic!("expected a cooldown block, got {other:?}"),
    }

    // Nothing moved, but the block was surfaced to the merchant.
    assert_eq!(reload(&h, &invoice.id).await.status, InvoiceStatus::Failed);
    assert_eq!(payments_for(&h, &invoice.id).await.len(), 1);
    assert!(matches!(
        h.dispatcher.events().last().unwrap(),
        SettlementEvent::RetryBlocked { reason, .. } if reason.contains("seconds before retrying")
    ));
}

#[tokio::test]
async fn retry_after_the_cooldown_revives_the_failed_attempt() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;

    let payment = h.orchestrator.initiate(&invoice.id).await.unwrap();
    let correlation = payment.correlation_id.clone().unwrap();
    h.orchestrator
        .reconcile(&failure_callback(&correlation, 1037))
        .await
        .unwrap();

    let failed = payments_for(&h, &invoice.id).await.pop().unwrap();
    backdate_payment(&h, &failed, 95).await;

    let revived = h.orchestrator.initiate(&invoice.id).await.unwrap();
    assert_eq!(revived.id, payment.id);
    assert_eq!(revived.status, PaymentStatus::Initiated);
    assert_eq!(revived.retry_count, 1);

    let reopened = reload(&h, &invoice.id).await;
    assert_eq!(reopened.status, InvoiceStatus::Pending);
    assert_eq!(reopened.active_payment, Some(revived.id.clone()));

    // The retried attempt can still settle the invoice.
    let correlation = revived.correlation_id.clone().unwrap();
    h.orchestrator
        .reconcile(&success_callback(&correlation, "RKT10BBB2C"))
        .await
        .unwrap();
    assert_eq!(reload(&h, &invoice.id).await.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn retry_is_blocked_once_the_attempt_ceiling_is_reached() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;

    let payment = h.orchestrator.initiate(&invoice.id).await.unwrap();
    let correlation = payment.correlation_id.clone().unwrap();
    h.orchestrator
        .reconcile(&failure_callback(&correlation, 1))
        .await
        .unwrap();

    let failed = payments_for(&h, &invoice.id).await.pop().unwrap();
    backdate_payment(&h, &failed, 120).await;

    let revived = h.orchestrator.initiate(&invoice.id).await.unwrap();
    let correlation = revived.correlation_id.clone().unwrap();
    h.orchestrator
        .reconcile(&failure_callback(&correlation, 1))
        .await
        .unwrap();

    let failed_again = payments_for(&h, &invoice.id).await.pop().unwrap();
    assert_eq!(failed_again.retry_count, 1);
    backdate_payment(&h, &failed_again, 600).await;

    let err = h.orchestrator.initiate(&invoice.id).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementError::RetryBlocked(RetryBlocked::MaxAttempts)
    ));
    assert_eq!(
        err.to_string(),
        "Maximum payment attempts reached"
    );
}

#[tokio::test]
async fn concurrent_initiations_yield_exactly_one_live_attempt() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;
    let store = h.store.clone();
    let orchestrator = Arc::new(h.orchestrator);

    let a = {
        let orchestrator = orchestrator.clone();
        let id = invoice.id.clone();
        tokio::spawn(async move { orchestrator.initiate(&id).await })
    };
    let b = {
        let orchestrator = orchestrator.clone();
        let id = invoice.id.clone();
        tokio::spawn(async move { orchestrator.initiate(&id).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    for result in &results {
        if let Err(e) = result {
            assert!(matches!(e, SettlementError::PaymentInProgress(_)));
        }
    }

    let initiated = store
        .find::<Payment>("invoice_id", &json!(invoice.id.as_str()))
        .await
        .unwrap()
        .into_iter()
        .filter(|(p, _)| p.status == PaymentStatus::Initiated)
        .count();
    assert_eq!(initiated, 1);
}

#[tokio::test]
async fn second_initiation_while_one_is_in_flight_is_rejected() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;

    h.orchestrator.initiate(&invoice.id).await.unwrap();
    let err = h.orchestrator.initiate(&invoice.id).await.unwrap_err();
    assert!(matches!(err, SettlementError::PaymentInProgress(_)));
}

#[tokio::test]
async fn partial_passive_payments_accumulate_until_the_balance_clears() {
    let h = harness();
    let invoice = sent_invoice(&h, 6000).await;

    h.orchestrator
        .record_passive(&passive_notice("RKT20AAA1B", "4000.00", "A1"))
        .await
        .unwrap();

    let open = reload(&h, &invoice.id).await;
    assert_eq!(open.status, InvoiceStatus::Sent);
    assert_eq!(
        h.orchestrator.outstanding_for(&invoice.id).await.unwrap(),
        Money::from_shillings(2000)
    );
    assert!(matches!(
        h.dispatcher.events().last().unwrap(),
        SettlementEvent::PaymentSucceeded { outstanding, .. }
            if *outstanding == Money::from_shillings(2000)
    ));

    h.orchestrator
        .record_passive(&passive_notice("RKT20BBB2C", "2000.00", "A1"))
        .await
        .unwrap();

    let settled = reload(&h, &invoice.id).await;
    assert_eq!(settled.status, InvoiceStatus::Paid);
    assert_eq!(settled.pay_ref.as_deref(), Some("RKT20BBB2C"));
    assert_eq!(payments_for(&h, &invoice.id).await.len(), 2);
}

#[tokio::test]
async fn duplicate_passive_notification_is_acknowledged_without_effect() {
    let h = harness();
    let invoice = sent_invoice(&h, 6000).await;
    let body = passive_notice("RKT20AAA1B", "4000.00", "A1");

    h.orchestrator.record_passive(&body).await.unwrap();
    let events = h.dispatcher.event_count();
    let ack = h.orchestrator.record_passive(&body).await.unwrap();

    assert_eq!(ack, Ack::accepted());
    assert_eq!(h.dispatcher.event_count(), events);
    assert_eq!(payments_for(&h, &invoice.id).await.len(), 1);
    assert_eq!(
        h.orchestrator.outstanding_for(&invoice.id).await.unwrap(),
        Money::from_shillings(2000)
    );
}

#[tokio::test]
async fn passive_notification_with_no_matching_invoice_is_acknowledged() {
    let h = harness();
    let invoice = sent_invoice(&h, 6000).await;

    let ack = h
        .orchestrator
        .record_passive(&passive_notice("RKT20CCC3D", "6000.00", "NOPE"))
        .await
        .unwrap();

    assert_eq!(ack, Ack::accepted());
    assert_eq!(reload(&h, &invoice.id).await.status, InvoiceStatus::Sent);
    assert!(payments_for(&h, &invoice.id).await.is_empty());
}

#[tokio::test]
async fn success_callback_for_a_cancelled_invoice_is_still_acknowledged() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;

    let payment = h.orchestrator.initiate(&invoice.id).await.unwrap();
    let correlation = payment.correlation_id.clone().unwrap();
    h.invoices.cancel(&invoice.id).await.unwrap();

    let ack = h
        .orchestrator
        .reconcile(&success_callback(&correlation, "RKT40AAA1B"))
        .await
        .unwrap();
    assert_eq!(ack, Ack::accepted());

    // The invoice keeps its cancelled status; the attempt keeps its
    // receipt for reconciliation.
    let after = reload(&h, &invoice.id).await;
    assert_eq!(after.status, InvoiceStatus::Cancelled);
    assert!(after.pay_ref.is_none());
    assert!(after.active_payment.is_none());

    let payments = payments_for(&h, &invoice.id).await;
    assert_eq!(payments[0].status, PaymentStatus::Success);
    assert_eq!(payments[0].receipt.as_deref(), Some("RKT40AAA1B"));
}

#[tokio::test]
async fn passive_settlement_reaches_a_failed_invoice() {
    let h = harness();
    let invoice = sent_invoice(&h, 1500).await;

    let payment = h.orchestrator.initiate(&invoice.id).await.unwrap();
    let correlation = payment.correlation_id.clone().unwrap();
    h.orchestrator
        .reconcile(&failure_callback(&correlation, 1032))
        .await
        .unwrap();
    assert_eq!(reload(&h, &invoice.id).await.status, InvoiceStatus::Failed);

    h.orchestrator
        .record_passive(&passive_notice("RKT30AAA1B", "1500.00", "A1"))
        .await
        .unwrap();

    let settled = reload(&h, &invoice.id).await;
    assert_eq!(settled.status, InvoiceStatus::Paid);
    assert_eq!(settled.pay_ref.as_deref(), Some("RKT30AAA1B"));
}

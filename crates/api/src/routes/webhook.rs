//! Inbound messaging webhook.
//!
//! One endpoint drives the whole conversational flow: merchant messages
//! advance the drafting machine, a completed draft becomes a delivered
//! invoice, and a `pay_<invoice_id>` token from the customer triggers a
//! push payment. The reply is both sent on the transport and echoed in
//! the response body.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::{InvoiceId, Msisdn};
use conversation::{CompletedDraft, MessagingTransport, Outcome};
use domain::Invoice;
use entity_store::EntityStore;
use serde::{Deserialize, Serialize};
use settlement::{NotificationDispatcher, SettlementError};

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct WebhookRequest {
    pub from: String,
    pub text: String,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub reply: String,
}

/// POST /webhook — process one inbound message.
#[tracing::instrument(skip(state, req))]
pub async fn receive<S: EntityStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<WebhookRequest>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let sender = Msisdn::parse(&req.from)
        .map_err(|e| ApiError::BadRequest(format!("Invalid sender number: {e}")))?;
    let text = req.text.trim();

    let (reply, undo) = if let Some(invoice_ref) = text.strip_prefix("pay_") {
        (pay_token_reply(&state, invoice_ref).await?, false)
    } else {
        match state.machine.advance(&sender, text).await? {
            Outcome::Prompt(reply) | Outcome::Cancelled(reply) => (reply.text, reply.undo),
            Outcome::Completed(draft) => (issue_invoice(&state, &sender, draft).await?, false),
        }
    };

    // Steps that can be undone carry a tappable Undo option.
    let delivery = if undo {
        state.transport.send_choice(&sender, &reply, &["Undo"]).await
    } else {
        state.transport.send_text(&sender, &reply).await
    };
    if let Err(e) = delivery {
        tracing::warn!(to = %sender, error = %e, "reply delivery failed");
    }

    Ok(Json(WebhookResponse { reply }))
}

/// Turns a completed draft into a delivered invoice and composes the
/// merchant confirmation.
async fn issue_invoice<S: EntityStore + 'static>(
    state: &AppState<S>,
    merchant: &Msisdn,
    draft: CompletedDraft,
) -> Result<String, ApiError> {
    let invoice = Invoice::new(
        merchant.clone(),
        draft.merchant_name,
        draft.customer_msisdn,
        draft.customer_name,
        draft.line_items,
        draft.tax_elected,
        draft.due,
        draft.instrument.clone(),
    )?;
    let invoice = state.invoices.create(invoice).await?;

    if draft.save_instrument && !draft.used_saved_method {
        state.methods.save_if_new(merchant, draft.instrument).await?;
    }

    let customer_message = compose_invoice_message(&invoice);
    match state
        .transport
        .send_text(&invoice.customer_msisdn, &customer_message)
        .await
    {
        Ok(()) => {
            state.invoices.mark_delivered(&invoice.id).await?;
            state
                .dispatcher
                .dispatch(settlement::SettlementEvent::InvoiceSent {
                    invoice_id: invoice.id.clone(),
                    total: invoice.total,
                })
                .await;
            Ok(format!(
                "Invoice {} for {} sent to {} ({}).",
                invoice.id, invoice.total, invoice.customer_name, invoice.customer_msisdn
            ))
        }
        Err(e) => {
            tracing::warn!(invoice_id = %invoice.id, error = %e, "invoice delivery failed");
            Ok(format!(
                "Invoice {} was created but could not be delivered to {}. It will stay pending; ask them to check their messages.",
                invoice.id, invoice.customer_msisdn
            ))
        }
    }
}

/// Initiates a push for a `pay_` token and maps the outcome to a reply.
async fn pay_token_reply<S: EntityStore + 'static>(
    state: &AppState<S>,
    invoice_ref: &str,
) -> Result<String, ApiError> {
    let invoice_id = InvoiceId::from_string(invoice_ref);
    match state.orchestrator.initiate(&invoice_id).await {
        Ok(payment) => Ok(format!(
            "Payment request sent. Enter your PIN on the prompt to approve {}.",
            payment.amount
        )),
        Err(SettlementError::RetryBlocked(blocked)) => Ok(blocked.to_string()),
        Err(SettlementError::PaymentInProgress(_)) => {
            Ok("A payment for this invoice is already in progress. Watch your phone for the prompt.".to_string())
        }
        Err(SettlementError::InvoiceNotFound(_)) => {
            Ok("We could not find that invoice. Check the reference and try again.".to_string())
        }
        Err(SettlementError::InvalidInvoiceStatus { .. }) => {
            Ok("This invoice is no longer open for payment.".to_string())
        }
        Err(SettlementError::Provider(_) | SettlementError::ProviderTimeout) => {
            Ok("We could not reach your phone right now. Please try again shortly.".to_string())
        }
        Err(other) => Err(other.into()),
    }
}

/// The invoice message the customer receives.
fn compose_invoice_message(invoice: &Invoice) -> String {
    let mut lines = vec![format!(
        "Hi {}, {} sent you an invoice ({}).",
        invoice.customer_name, invoice.merchant_name, invoice.id
    )];
    lines.push(String::new());

    for item in &invoice.line_items {
        lines.push(format!(
            "{} x{} @ {} = {}",
            item.name,
            item.quantity,
            item.unit_price,
            item.line_total()
        ));
    }
    lines.push(String::new());
    if invoice.tax.is_positive() {
        lines.push(format!("VAT (16% incl.): {}", invoice.tax));
    }
    lines.push(format!("Total: {}", invoice.total));
    lines.push(invoice.due.describe());
    lines.push(String::new());
    lines.push(format!("Pay to {}.", invoice.instrument.describe()));
    if invoice.passive_enabled {
        lines.push(format!(
            "Quote account {} when paying the shortcode directly.",
            invoice.account_reference
        ));
    }
    lines.push(format!(
        "Or reply pay_{} to get a payment prompt on this phone.",
        invoice.id
    ));

    lines.join("\n")
}

//! Payment initiation and provider callback endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::InvoiceId;
use entity_store::EntityStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use settlement::Ack;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct InitiateRequest {
    pub invoice_id: String,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub payment_id: String,
    pub invoice_id: String,
    pub status: String,
    pub amount_cents: i64,
    pub correlation_id: Option<String>,
    pub retry_count: u32,
}

/// POST /payments/initiate — push a payment request to the customer.
#[tracing::instrument(skip(state, req))]
pub async fn initiate<S: EntityStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<InitiateRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let invoice_id = InvoiceId::from_string(req.invoice_id.as_str());
    let payment = state.orchestrator.initiate(&invoice_id).await?;

    Ok(Json(PaymentResponse {
        payment_id: payment.id.to_string(),
        invoice_id: payment.invoice_id.to_string(),
        status: payment.status.to_string(),
        amount_cents: payment.amount.cents(),
        correlation_id: payment.correlation_id,
        retry_count: payment.retry_count,
    }))
}

/// POST /payments/callback — reconcile an asynchronous push outcome.
/// Always answers with the provider acknowledgement body.
#[tracing::instrument(skip_all)]
pub async fn callback<S: EntityStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<Value>,
) -> Result<Json<Ack>, ApiError> {
    let ack = state.orchestrator.reconcile(&body).await?;
    Ok(Json(ack))
}

/// POST /payments/passive — record a customer-initiated deposit.
/// Always answers with the provider acknowledgement body.
#[tracing::instrument(skip_all)]
pub async fn passive<S: EntityStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<Value>,
) -> Result<Json<Ack>, ApiError> {
    let ack = state.orchestrator.record_passive(&body).await?;
    Ok(Json(ack))
}

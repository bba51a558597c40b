//! Invoice lookup endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::InvoiceId;
use entity_store::EntityStore;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct InvoiceResponse {
    pub id: String,
    pub status: String,
    pub merchant_name: String,
    pub customer_name: String,
    pub customer_msisdn: String,
    pub line_items: Vec<LineItemResponse>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub due: String,
    pub account_reference: String,
    pub shortcode: String,
    pub pay_ref: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize)]
pub struct LineItemResponse {
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
}

/// GET /invoices/:id — invoice snapshot.
#[tracing::instrument(skip(state))]
pub async fn get<S: EntityStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let invoice_id = InvoiceId::from_string(id.as_str());
    let invoice = state
        .invoices
        .get(&invoice_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Invoice {id} not found")))?;

    let line_items = invoice
        .line_items
        .iter()
        .map(|item| LineItemResponse {
            name: item.name.clone(),
            unit_price_cents: item.unit_price.cents(),
            quantity: item.quantity,
        })
        .collect();

    Ok(Json(InvoiceResponse {
        id: invoice.id.to_string(),
        status: invoice.status.to_string(),
        merchant_name: invoice.merchant_name,
        customer_name: invoice.customer_name,
        customer_msisdn: invoice.customer_msisdn.to_string(),
        line_items,
        subtotal_cents: invoice.subtotal.cents(),
        tax_cents: invoice.tax.cents(),
        total_cents: invoice.total.cents(),
        due: invoice.due.describe(),
        account_reference: invoice.account_reference,
        shortcode: invoice.shortcode,
        pay_ref: invoice.pay_ref,
        created_at: invoice.created_at,
    }))
}

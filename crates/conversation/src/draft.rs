//! Conversation state and the invoice draft it accumulates.

use chrono::{DateTime, Utc};
use common::Msisdn;
use domain::parse::DueDate;
use domain::{InstrumentKind, LineItem, PayoutInstrument};
use entity_store::Entity;
use serde::{Deserialize, Serialize};

use crate::step::Step;

/// Fields collected so far. Every field is owned by exactly one step;
/// undoing a step clears only what that step owns, and the draft never
/// holds fields for steps after the current one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub merchant_name: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
    pub tax_elected: Option<bool>,
    pub due: Option<DueDate>,
    pub customer_msisdn: Option<Msisdn>,
    pub customer_name: Option<String>,
    pub instrument_kind: Option<InstrumentKind>,
    pub business_number: Option<String>,
    pub account: Option<String>,
    pub till_number: Option<String>,
    pub payout_msisdn: Option<Msisdn>,

    /// Set when the merchant picked a previously saved method instead of
    /// entering details; owned by the instrument-kind step.
    pub saved_instrument: Option<PayoutInstrument>,

    pub save_instrument: Option<bool>,
}

impl InvoiceDraft {
    /// Clears the fields owned by `step`.
    pub fn clear_step(&mut self, step: Step) {
        match step {
            Step::MerchantName => self.merchant_name = None,
            Step::LineItems => self.line_items = None,
            Step::TaxElection => self.tax_elected = None,
            Step::DueDate => self.due = None,
            Step::CustomerPhone => self.customer_msisdn = None,
            Step::CustomerName => self.customer_name = None,
            Step::InstrumentKind => {
                self.instrument_kind = None;
                self.saved_instrument = None;
            }
            Step::PaybillNumber => self.business_number = None,
            Step::PaybillAccount => self.account = None,
            Step::TillNumber => self.till_number = None,
            Step::PayoutPhone => self.payout_msisdn = None,
            Step::SaveInstrument => self.save_instrument = None,
            Step::Confirm => {}
        }
    }

    /// Assembles the payout instrument from whichever branch was taken.
    pub fn instrument(&self) -> Option<PayoutInstrument> {
        if let Some(saved) = &self.saved_instrument {
            return Some(saved.clone());
        }
        match self.instrument_kind? {
            InstrumentKind::Paybill => Some(PayoutInstrument::Paybill {
                business_number: self.business_number.clone()?,
                account: self.account.clone()?,
            }),
            InstrumentKind::Till => Some(PayoutInstrument::Till {
                number: self.till_number.clone()?,
            }),
            InstrumentKind::Phone => Some(PayoutInstrument::Phone {
                msisdn: self.payout_msisdn.clone()?,
            }),
        }
    }

    /// Finalizes the draft. None means a required field is missing, which
    /// can only happen through a corrupted session.
    pub fn complete(&self) -> Option<CompletedDraft> {
        Some(CompletedDraft {
            merchant_name: self.merchant_name.clone()?,
            line_items: self.line_items.clone()?,
            tax_elected: self.tax_elected?,
            due: self.due.clone()?,
            customer_msisdn: self.customer_msisdn.clone()?,
            customer_name: self.customer_name.clone()?,
            instrument: self.instrument()?,
            save_instrument: self.save_instrument.unwrap_or(false),
            used_saved_method: self.saved_instrument.is_some(),
        })
    }
}

/// A fully collected draft, ready to become an invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedDraft {
    pub merchant_name: String,
    pub line_items: Vec<LineItem>,
    pub tax_elected: bool,
    pub due: DueDate,
    pub customer_msisdn: Msisdn,
    pub customer_name: String,
    pub instrument: PayoutInstrument,
    pub save_instrument: bool,
    pub used_saved_method: bool,
}

/// Persisted per-merchant conversation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub owner: Msisdn,
    pub step: Step,
    pub draft: InvoiceDraft,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(owner: Msisdn) -> Self {
        Self {
            owner,
            step: Step::MerchantName,
            draft: InvoiceDraft::default(),
            updated_at: Utc::now(),
        }
    }
}

impl Entity for ConversationState {
    const KIND: &'static str = "conversation";

    fn entity_id(&self) -> String {
        self.owner.to_string()
    }
}

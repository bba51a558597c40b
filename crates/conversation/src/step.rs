//! Flow steps and the pure predecessor function behind undo.

use domain::InstrumentKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::draft::InvoiceDraft;

/// A step in the guided flow, in collection order. The instrument
/// branches (`PaybillNumber`/`PaybillAccount`, `TillNumber`,
/// `PayoutPhone`) fan out of `InstrumentKind` and rejoin at
/// `SaveInstrument`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    MerchantName,
    LineItems,
    TaxElection,
    DueDate,
    CustomerPhone,
    CustomerName,
    InstrumentKind,
    PaybillNumber,
    PaybillAccount,
    TillNumber,
    PayoutPhone,
    SaveInstrument,
    Confirm,
}

impl Step {
    /// Whether the undo affordance is offered at this step.
    pub fn allows_undo(&self) -> bool {
        !matches!(self, Step::MerchantName | Step::Confirm)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::MerchantName => "MERCHANT_NAME",
            Step::LineItems => "LINE_ITEMS",
            Step::TaxElection => "TAX_ELECTION",
            Step::DueDate => "DUE_DATE",
            Step::CustomerPhone => "CUSTOMER_PHONE",
            Step::CustomerName => "CUSTOMER_NAME",
            Step::InstrumentKind => "INSTRUMENT_KIND",
            Step::PaybillNumber => "PAYBILL_NUMBER",
            Step::PaybillAccount => "PAYBILL_ACCOUNT",
            Step::TillNumber => "TILL_NUMBER",
            Step::PayoutPhone => "PAYOUT_PHONE",
            Step::SaveInstrument => "SAVE_INSTRUMENT",
            Step::Confirm => "CONFIRM",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The predecessor could not be determined from the draft. The session
/// is corrupt and must be reset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot resolve predecessor of {step}: {reason}")]
pub struct PredecessorError {
    pub step: Step,
    pub reason: &'static str,
}

/// Computes the step undo returns to, from the current step and the
/// collected draft alone.
///
/// `None` means undo is unavailable here. The only dynamic case is the
/// step after the instrument branches: its predecessor is whichever
/// detail step the recorded instrument kind implies.
pub fn predecessor_of(
    step: Step,
    draft: &InvoiceDraft,
) -> Result<Option<Step>, PredecessorError> {
    let previous = match step {
        Step::MerchantName | Step::Confirm => None,
        Step::LineItems => Some(Step::MerchantName),
        Step::TaxElection => Some(Step::LineItems),
        Step::DueDate => Some(Step::TaxElection),
        Step::CustomerPhone => Some(Step::DueDate),
        Step::CustomerName => Some(Step::CustomerPhone),
        Step::InstrumentKind => Some(Step::CustomerName),
        Step::PaybillNumber | Step::TillNumber | Step::PayoutPhone => Some(Step::InstrumentKind),
        Step::PaybillAccount => Some(Step::PaybillNumber),
        Step::SaveInstrument => match draft.instrument_kind {
            Some(InstrumentKind::Paybill) => Some(Step::PaybillAccount),
            Some(InstrumentKind::Till) => Some(Step::TillNumber),
            Some(InstrumentKind::Phone) => Some(Step::PayoutPhone),
            None => {
                return Err(PredecessorError {
                    step,
                    reason: "no instrument kind recorded",
                });
            }
        },
    };
    Ok(previous)
}

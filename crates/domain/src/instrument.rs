//! Payout instruments: where the merchant receives money.

use common::Msisdn;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// The kind of payout instrument, used to branch the guided flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentKind {
    Paybill,
    Till,
    Phone,
}

impl InstrumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Paybill => "PAYBILL",
            InstrumentKind::Till => "TILL",
            InstrumentKind::Phone => "PHONE",
        }
    }
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A concrete payout destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutInstrument {
    /// Business paybill with a per-invoice account number.
    Paybill { business_number: String, account: String },

    /// Buy-goods till.
    Till { number: String },

    /// Personal number receiving directly.
    Phone { msisdn: Msisdn },
}

impl PayoutInstrument {
    pub fn kind(&self) -> InstrumentKind {
        match self {
            PayoutInstrument::Paybill { .. } => InstrumentKind::Paybill,
            PayoutInstrument::Till { .. } => InstrumentKind::Till,
            PayoutInstrument::Phone { .. } => InstrumentKind::Phone,
        }
    }

    /// The shortcode customers pay into (the msisdn for personal numbers).
    pub fn shortcode(&self) -> &str {
        match self {
            PayoutInstrument::Paybill { business_number, .. } => business_number,
            PayoutInstrument::Till { number } => number,
            PayoutInstrument::Phone { msisdn } => msisdn.as_str(),
        }
    }

    /// Whether customers can settle by paying the shortcode directly.
    pub fn supports_passive_settlement(&self) -> bool {
        !matches!(self, PayoutInstrument::Phone { .. })
    }

    /// Human-readable description used in previews and invoice messages.
    pub fn describe(&self) -> String {
        match self {
            PayoutInstrument::Paybill { business_number, account } => {
                format!("Paybill {business_number}, Account {account}")
            }
            PayoutInstrument::Till { number } => format!("Till {number}"),
            PayoutInstrument::Phone { msisdn } => format!("Phone {msisdn}"),
        }
    }
}

/// Validates a paybill business number (5-7 digits).
pub fn parse_business_number(input: &str) -> Result<String, ParseError> {
    parse_shortcode(input, "paybill number")
}

/// Validates a till number (5-7 digits).
pub fn parse_till_number(input: &str) -> Result<String, ParseError> {
    parse_shortcode(input, "till number")
}

fn parse_shortcode(input: &str, what: &str) -> Result<String, ParseError> {
    let trimmed = input.trim();
    if trimmed.len() < 5 || trimmed.len() > 7 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::Invalid(format!(
            "{what} must be 5-7 digits"
        )));
    }
    Ok(trimmed.to_string())
}

/// Validates a paybill account reference (1-20 alphanumeric or dash).
pub fn parse_account(input: &str) -> Result<String, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty()
        || trimmed.len() > 20
        || !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ParseError::Invalid(
            "account must be 1-20 letters, digits or dashes".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

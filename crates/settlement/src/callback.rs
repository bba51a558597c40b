//! Provider callback payloads.
//!
//! The push channel reports outcomes asynchronously with an STK result
//! envelope. The passive channel reports customer-initiated deposits
//! with a C2B confirmation. Both are acknowledged with the same fixed
//! receipt body regardless of whether we could match them.

use common::{Money, Msisdn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed acknowledgement returned for every callback delivery.
///
/// The provider retries anything that is not acknowledged, so parse
/// failures and unmatched payloads still get this body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    #[serde(rename = "ResultCode")]
    pub result_code: String,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl Ack {
    pub fn accepted() -> Self {
        Self {
            result_code: "0".to_string(),
            result_desc: "Accepted".to_string(),
        }
    }
}

/// Parsed outcome of an STK push callback.
#[derive(Debug, Clone)]
pub struct StkOutcome {
    pub correlation_id: String,
    pub result_code: i64,
    pub result_desc: String,
    /// Provider receipt number, present on success only.
    pub receipt: Option<String>,
}

impl StkOutcome {
    /// Extracts the outcome from a raw callback body.
    ///
    /// Expects the provider's `Body.stkCallback` envelope. Returns
    /// `None` when the shape does not match; the caller acknowledges
    /// anyway.
    pub fn from_body(body: &Value) -> Option<Self> {
        let callback = body.get("Body")?.get("stkCallback")?;
        let correlation_id = callback.get("CheckoutRequestID")?.as_str()?.to_string();
        let result_code = callback.get("ResultCode")?.as_i64()?;
        let result_desc = callback
            .get("ResultDesc")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let receipt = callback
            .get("CallbackMetadata")
            .and_then(|m| m.get("Item"))
            .and_then(Value::as_array)
            .and_then(|items| {
                items.iter().find(|item| {
                    item.get("Name").and_then(Value::as_str) == Some("MpesaReceiptNumber")
                })
            })
            .and_then(|item| item.get("Value"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Self {
            correlation_id,
            result_code,
            result_desc,
            receipt,
        })
    }

    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

/// Parsed C2B confirmation for a customer-initiated deposit.
#[derive(Debug, Clone)]
pub struct PassiveNotice {
    pub trans_ref: String,
    pub amount: Money,
    pub account_reference: String,
    pub shortcode: String,
    pub payer_msisdn: Option<Msisdn>,
}

impl PassiveNotice {
    /// Extracts the notice from a raw C2B confirmation body.
    pub fn from_body(body: &Value) -> Option<Self> {
        let trans_ref = body.get("TransID")?.as_str()?.to_string();
        let amount = parse_amount(body.get("TransAmount")?)?;
        let account_reference = body.get("BillRefNumber")?.as_str()?.trim().to_string();
        let shortcode = body.get("BusinessShortCode")?.as_str()?.to_string();
        let payer_msisdn = body
            .get("MSISDN")
            .and_then(Value::as_str)
            .and_then(|raw| Msisdn::parse(raw).ok());

        Some(Self {
            trans_ref,
            amount,
            account_reference,
            shortcode,
            payer_msisdn,
        })
    }
}

fn parse_amount(value: &Value) -> Option<Money> {
    let amount = match value {
        Value::String(raw) => Money::parse(raw).ok()?,
        Value::Number(n) => {
            let cents = (n.as_f64()? * 100.0).round() as i64;
            Money::from_cents(cents)
        }
        _ => return None,
    };
    amount.is_positive().then_some(amount)
}

/// Maps a provider failure code to a customer-facing reason.
pub fn failure_reason(code: i64) -> String {
    match code {
        1 => "The customer has insufficient balance".to_string(),
        1032 => "The customer cancelled the request".to_string(),
        1037 => "The request timed out waiting for the customer".to_string(),
        2001 => "The phone number is invalid".to_string(),
        other => format!("Payment failed with code {other}"),
    }
}

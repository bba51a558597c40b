//! Invoice line items and totals.

use common::Money;
use serde::{Deserialize, Serialize};

/// Minimum invoice total in cents (KES 1.00); the payment rails reject
/// smaller amounts.
pub const MIN_INVOICE_TOTAL_CENTS: i64 = 100;

/// A single billed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Human-readable item name.
    pub name: String,

    /// Price per unit in cents.
    pub unit_price: Money,

    /// Quantity billed.
    pub quantity: u32,
}

impl LineItem {
    pub fn new(name: impl Into<String>, unit_price: Money, quantity: u32) -> Self {
        Self {
            name: name.into(),
            unit_price,
            quantity,
        }
    }

    /// Returns the total for this line (quantity * unit price).
    pub fn line_total(&self) -> Money {
        self.unit_price
            .checked_multiply(self.quantity)
            .unwrap_or(Money::zero())
    }
}

/// Computed invoice totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

impl InvoiceTotals {
    /// Computes totals for a set of line items.
    ///
    /// Entered prices are treated as tax-inclusive: electing VAT extracts
    /// the 16% portion from the subtotal (`round_half_up(subtotal*16/116)`)
    /// and leaves the total unchanged.
    pub fn compute(items: &[LineItem], tax_elected: bool) -> Self {
        let subtotal = items
            .iter()
            .fold(Money::zero(), |acc, item| acc + item.line_total());

        let tax = if tax_elected {
            Money::from_cents(div_round_half_up(subtotal.cents() * 16, 116))
        } else {
            Money::zero()
        };

        Self {
            subtotal,
            tax,
            total: subtotal,
        }
    }
}

fn div_round_half_up(numerator: i64, denominator: i64) -> i64 {
    (numerator * 2 + denominator) / (denominator * 2)
}

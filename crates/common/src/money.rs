use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing a money amount from user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("invalid amount: {0}")]
    Invalid(String),

    #[error("amount must be greater than zero")]
    NotPositive,
}

/// Money amount represented in integer minor units (cents) to avoid
/// floating point issues. All amounts are Kenyan Shillings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = KES 10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole-shilling value.
    pub fn from_shillings(shillings: i64) -> Self {
        Self {
            cents: shillings * 100,
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Parses a user-entered amount with at most two decimal places.
    ///
    /// Accepts `"1500"`, `"1500.5"` and `"1500.50"`; rejects negatives,
    /// zero, and more than two fractional digits.
    pub fn parse(input: &str) -> Result<Self, MoneyError> {
        let trimmed = input.trim();
        let invalid = || MoneyError::Invalid(trimmed.to_string());

        let (whole, frac) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed, ""),
        };
        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let shillings: i64 = whole.parse().map_err(|_| invalid())?;
        let frac_cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };
        let cents = shillings
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .ok_or_else(invalid)?;

        if cents <= 0 {
            return Err(MoneyError::NotPositive);
        }
        Ok(Self { cents })
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole-shilling portion.
    pub fn shillings(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after whole shillings).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Adds another amount, erroring on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.cents.checked_add(other.cents).map(Money::from_cents)
    }

    /// Subtracts another amount, clamping at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money::from_cents((self.cents - other.cents).max(0))
    }

    /// Multiplies by a quantity, erroring on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.cents.checked_mul(quantity as i64).map(Money::from_cents)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

fn with_thousands(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(
                f,
                "-KES {}.{:02}",
                with_thousands(self.shillings().abs()),
                self.cents_part()
            )
        } else {
            write!(
                f,
                "KES {}.{:02}",
                with_thousands(self.shillings()),
                self.cents_part()
            )
        }
    }
}

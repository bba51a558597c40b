//! Parsing of merchant-entered input: line-item batches and due dates.

use chrono::{Datelike, Days, NaiveDate};
use common::Money;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::invoice::LineItem;

const MAX_RELATIVE_DAYS: u32 = 365;
const MAX_QUANTITY: u32 = 10_000;

/// A parsed due date, kept alongside its presentation form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DueDate {
    /// Payable immediately.
    OnReceipt,

    /// A relative number of days, resolved against the entry date.
    InDays { days: u32, date: NaiveDate },

    /// A literal calendar date.
    On { date: NaiveDate },
}

impl DueDate {
    /// Renders the due date the way invoices and previews show it.
    pub fn describe(&self) -> String {
        match self {
            DueDate::OnReceipt => "Due on receipt".to_string(),
            DueDate::InDays { days: 1, date } => format!("In 1 day ({})", format_date(*date)),
            DueDate::InDays { days, date } => format!("In {days} days ({})", format_date(*date)),
            DueDate::On { date } => format_date(*date),
        }
    }
}

fn format_date(date: NaiveDate) -> String {
    const MONTHS: [&str; 12] = [
        "January", "February", "March", "April", "May", "June", "July", "August", "September",
        "October", "November", "December",
    ];
    format!(
        "{} {} {}",
        date.day(),
        MONTHS[date.month0() as usize],
        date.year()
    )
}

/// Parses a due-date entry.
///
/// `0` means due on receipt; a bare integer up to 365 is relative days;
/// `dd/mm` or `dd/mm/yyyy` is a literal date, the year defaulting to the
/// current one.
pub fn parse_due_date(input: &str, today: NaiveDate) -> Result<DueDate, ParseError> {
    let trimmed = input.trim();

    if trimmed == "0" {
        return Ok(DueDate::OnReceipt);
    }

    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        let days: u32 = trimmed
            .parse()
            .map_err(|_| ParseError::Invalid("due date is out of range".to_string()))?;
        if days == 0 || days > MAX_RELATIVE_DAYS {
            return Err(ParseError::Invalid(format!(
                "relative due dates must be between 0 and {MAX_RELATIVE_DAYS} days"
            )));
        }
        let date = today
            .checked_add_days(Days::new(days as u64))
            .ok_or_else(|| ParseError::Invalid("due date is out of range".to_string()))?;
        return Ok(DueDate::InDays { days, date });
    }

    let parts: Vec<&str> = trimmed.split('/').collect();
    let (day, month, year) = match parts.as_slice() {
        [d, m] => (*d, *m, None),
        [d, m, y] => (*d, *m, Some(*y)),
        _ => {
            return Err(ParseError::Invalid(
                "enter 0, a number of days, or a date like 15/09 or 15/09/2026".to_string(),
            ));
        }
    };

    let invalid = || ParseError::Invalid(format!("'{trimmed}' is not a valid date"));
    let day: u32 = day.trim().parse().map_err(|_| invalid())?;
    let month: u32 = month.trim().parse().map_err(|_| invalid())?;
    let year: i32 = match year {
        Some(y) => y.trim().parse().map_err(|_| invalid())?,
        None => today.year(),
    };

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;
    Ok(DueDate::On { date })
}

/// Parses a line-item batch: one item per line, `name - price - quantity`.
///
/// Item names may contain dashes; the two trailing dash-separated fields
/// are always price and quantity. A malformed line rejects the whole
/// batch, naming the offending line.
pub fn parse_line_items(input: &str) -> Result<Vec<LineItem>, ParseError> {
    let mut items = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        items.push(parse_line(index + 1, line)?);
    }

    if items.is_empty() {
        return Err(ParseError::Invalid(
            "enter at least one item, like: Widget - 100 - 2".to_string(),
        ));
    }
    Ok(items)
}

fn parse_line(number: usize, line: &str) -> Result<LineItem, ParseError> {
    let err = |message: &str| ParseError::Line {
        number,
        message: message.to_string(),
    };

    // rsplitn yields quantity, price, then the rest as the name
    let mut fields = line.rsplitn(3, '-');
    let quantity_raw = fields.next().map(str::trim).unwrap_or("");
    let price_raw = fields.next().map(str::trim);
    let name_raw = fields.next().map(str::trim);

    let (Some(price_raw), Some(name)) = (price_raw, name_raw) else {
        return Err(err("expected name - price - quantity"));
    };

    if name.len() < 2 || name.len() > 100 {
        return Err(err("item name must be 2-100 characters"));
    }

    let unit_price = Money::parse(price_raw)
        .map_err(|_| err("price must be a positive amount like 100 or 99.50"))?;

    let quantity: u32 = quantity_raw
        .parse()
        .map_err(|_| err("quantity must be a whole number"))?;
    if quantity == 0 || quantity > MAX_QUANTITY {
        return Err(err("quantity must be between 1 and 10000"));
    }

    Ok(LineItem::new(name, unit_price, quantity))
}

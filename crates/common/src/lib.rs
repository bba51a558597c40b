//! Shared value types: entity identifiers, money, and phone numbers.

mod ids;
mod money;
mod phone;

pub use ids::{InvoiceId, MethodId, PaymentId};
pub use money::{Money, MoneyError};
pub use phone::{Msisdn, PhoneError};
